use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use orbit_core::domain::approval::{ApprovalRequest, ApprovalRequestId};
use orbit_core::domain::budget::{BudgetConfigId, BudgetConfiguration};
use orbit_core::workflow::{current_stage, Stage};

pub mod approval;
pub mod budget;
pub mod memory;

pub use approval::SqlApprovalRequestRepository;
pub use budget::SqlBudgetConfigurationRepository;
pub use memory::{InMemoryApprovalRequestRepository, InMemoryBudgetConfigurationRepository};

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApprovalRequestFilter {
    pub budget_config_id: Option<BudgetConfigId>,
    pub stage: Option<Stage>,
    pub requested_by: Option<String>,
    pub page: u32,
    pub per_page: u32,
}

impl Default for ApprovalRequestFilter {
    fn default() -> Self {
        Self {
            budget_config_id: None,
            stage: None,
            requested_by: None,
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl ApprovalRequestFilter {
    pub fn limit(&self) -> u32 {
        self.per_page.clamp(1, MAX_PER_PAGE)
    }

    pub fn offset(&self) -> u32 {
        self.page.max(1).saturating_sub(1).saturating_mul(self.limit())
    }

    /// Requester names compare case-insensitively.
    pub fn matches(&self, request: &ApprovalRequest) -> bool {
        let budget_ok =
            self.budget_config_id.as_ref().map_or(true, |id| *id == request.budget_config_id);
        let stage_ok = self.stage.map_or(true, |stage| stage == current_stage(request));
        let requester_ok = self
            .requested_by
            .as_deref()
            .map_or(true, |name| name.eq_ignore_ascii_case(&request.requested_by));
        budget_ok && stage_ok && requester_ok
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ApprovalRequestPage {
    pub items: Vec<ApprovalRequest>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

#[async_trait]
pub trait ApprovalRequestRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &ApprovalRequestId,
    ) -> Result<Option<ApprovalRequest>, RepositoryError>;

    /// Replaces the stored request, its ladder, and its line items.
    async fn save(&self, request: ApprovalRequest) -> Result<(), RepositoryError>;

    /// Saves a request that just completed together with the budget its
    /// amount was booked against. Either both writes land or neither does.
    async fn save_completion(
        &self,
        request: ApprovalRequest,
        budget: BudgetConfiguration,
    ) -> Result<(), RepositoryError>;

    /// Newest first.
    async fn list(
        &self,
        filter: &ApprovalRequestFilter,
    ) -> Result<ApprovalRequestPage, RepositoryError>;

    /// Oldest first, unpaginated.
    async fn list_at_stage(&self, stage: Stage) -> Result<Vec<ApprovalRequest>, RepositoryError>;
}

#[async_trait]
pub trait BudgetConfigurationRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &BudgetConfigId,
    ) -> Result<Option<BudgetConfiguration>, RepositoryError>;
    async fn save(&self, config: BudgetConfiguration) -> Result<(), RepositoryError>;
    async fn list(&self) -> Result<Vec<BudgetConfiguration>, RepositoryError>;
}
