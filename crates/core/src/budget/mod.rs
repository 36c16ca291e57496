pub mod policy;
pub mod usage;

pub use policy::{evaluate_submission, BudgetCheck, BudgetCheckOutcome, OverBudgetPolicy};
pub use usage::{
    current_percentage, projected_usage, usage_color_tier, usage_summary, BudgetUsage,
    ProjectedUsage, UsagePercentage, UsageTier,
};
