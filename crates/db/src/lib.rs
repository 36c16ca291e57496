pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;
pub mod service;

pub use connection::{connect_with_config, connect_with_settings, DbPool};
pub use fixtures::{DemoSeedDataset, RequestSeedInfo, SeedResult, VerificationResult};
pub use repositories::{
    ApprovalRequestFilter, ApprovalRequestPage, ApprovalRequestRepository,
    BudgetConfigurationRepository, RepositoryError, SqlApprovalRequestRepository,
    SqlBudgetConfigurationRepository,
};
pub use service::{
    ApprovalWorkflow, BudgetUsageReport, DecisionOutcome, LineItemOutcome, SubmissionOutcome,
};
