use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use orbit_core::domain::approval::{ApprovalRequest, ApprovalRequestId};
use orbit_core::domain::budget::{BudgetConfigId, BudgetConfiguration};
use orbit_core::workflow::{current_stage, Stage};

use super::{
    ApprovalRequestFilter, ApprovalRequestPage, ApprovalRequestRepository,
    BudgetConfigurationRepository, RepositoryError,
};

type BudgetMap = Arc<RwLock<HashMap<String, BudgetConfiguration>>>;

#[derive(Default)]
pub struct InMemoryApprovalRequestRepository {
    requests: RwLock<HashMap<String, ApprovalRequest>>,
    budgets: BudgetMap,
}

impl InMemoryApprovalRequestRepository {
    /// Completions write into `budgets`, as the SQL repository writes both tables.
    pub fn sharing_budgets(budgets: &InMemoryBudgetConfigurationRepository) -> Self {
        Self { requests: RwLock::default(), budgets: Arc::clone(&budgets.configs) }
    }
}

#[async_trait::async_trait]
impl ApprovalRequestRepository for InMemoryApprovalRequestRepository {
    async fn find_by_id(
        &self,
        id: &ApprovalRequestId,
    ) -> Result<Option<ApprovalRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id.0).cloned())
    }

    async fn save(&self, request: ApprovalRequest) -> Result<(), RepositoryError> {
        let mut requests = self.requests.write().await;
        requests.insert(request.id.0.clone(), request);
        Ok(())
    }

    async fn save_completion(
        &self,
        request: ApprovalRequest,
        budget: BudgetConfiguration,
    ) -> Result<(), RepositoryError> {
        let mut requests = self.requests.write().await;
        let mut budgets = self.budgets.write().await;
        requests.insert(request.id.0.clone(), request);
        budgets.insert(budget.id.0.clone(), budget);
        Ok(())
    }

    async fn list(
        &self,
        filter: &ApprovalRequestFilter,
    ) -> Result<ApprovalRequestPage, RepositoryError> {
        let requests = self.requests.read().await;
        let mut matching: Vec<ApprovalRequest> =
            requests.values().filter(|request| filter.matches(request)).cloned().collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.0.cmp(&b.id.0)));

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.limit() as usize)
            .collect();

        Ok(ApprovalRequestPage {
            items,
            total,
            page: filter.page.max(1),
            per_page: filter.limit(),
        })
    }

    async fn list_at_stage(&self, stage: Stage) -> Result<Vec<ApprovalRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        let mut matching: Vec<ApprovalRequest> = requests
            .values()
            .filter(|request| current_stage(request) == stage)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(matching)
    }
}

#[derive(Default)]
pub struct InMemoryBudgetConfigurationRepository {
    configs: BudgetMap,
}

#[async_trait::async_trait]
impl BudgetConfigurationRepository for InMemoryBudgetConfigurationRepository {
    async fn find_by_id(
        &self,
        id: &BudgetConfigId,
    ) -> Result<Option<BudgetConfiguration>, RepositoryError> {
        let configs = self.configs.read().await;
        Ok(configs.get(&id.0).cloned())
    }

    async fn save(&self, config: BudgetConfiguration) -> Result<(), RepositoryError> {
        let mut configs = self.configs.write().await;
        configs.insert(config.id.0.clone(), config);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<BudgetConfiguration>, RepositoryError> {
        let configs = self.configs.read().await;
        let mut all: Vec<BudgetConfiguration> = configs.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(all)
    }
}
