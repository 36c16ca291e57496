pub mod adapter;
pub mod audit;
pub mod budget;
pub mod bulk;
pub mod config;
pub mod domain;
pub mod errors;
pub mod workflow;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use budget::{
    evaluate_submission, projected_usage, usage_color_tier, usage_summary, BudgetCheck,
    BudgetCheckOutcome, BudgetUsage, OverBudgetPolicy, ProjectedUsage, UsageTier,
};
pub use bulk::{validate_line_items, BulkSummary, EmployeeDirectory, InMemoryEmployeeDirectory};
pub use domain::approval::{
    ApprovalLevel, ApprovalRequest, ApprovalRequestId, ApproverIdentity, LevelId, LevelStatus,
    Role, StageLadder,
};
pub use domain::budget::{BudgetConfigId, BudgetConfiguration};
pub use domain::line_item::{LineItem, RowStatus};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use workflow::{current_stage, status_label, Decision, Stage};
