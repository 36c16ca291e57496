use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::budget::usage::{projected_usage, ProjectedUsage};
use crate::domain::budget::BudgetConfiguration;
use crate::errors::DomainError;

/// What submission does with a request that would push usage past the
/// configured limit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverBudgetPolicy {
    #[default]
    Warn,
    Block,
}

impl OverBudgetPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warn => "warn",
            Self::Block => "block",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "warn" => Some(Self::Warn),
            "block" => Some(Self::Block),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetCheckOutcome {
    Clear,
    Warn,
    Blocked,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetCheck {
    pub projection: ProjectedUsage,
    pub outcome: BudgetCheckOutcome,
    pub reasons: Vec<String>,
}

impl BudgetCheck {
    pub fn is_blocked(&self) -> bool {
        self.outcome == BudgetCheckOutcome::Blocked
    }

    pub fn into_result(self) -> Result<Self, DomainError> {
        if self.is_blocked() {
            return Err(DomainError::Validation(self.reasons.join("; ")));
        }
        Ok(self)
    }
}

pub fn evaluate_submission(
    config: &BudgetConfiguration,
    requested_amount: Decimal,
    policy: OverBudgetPolicy,
) -> BudgetCheck {
    let projection = projected_usage(config, requested_amount);
    let mut reasons = Vec::new();

    if projection.exceeds_budget {
        reasons.push(format!(
            "request would exceed budget `{}` by {} ({}% of limit)",
            config.id.0, projection.overage_amount, projection.after_percentage
        ));
    }
    if projection.requires_review {
        reasons.push(format!("negative amount {requested_amount} requires manual review"));
    }

    let outcome = match (projection.exceeds_budget, policy) {
        (true, OverBudgetPolicy::Block) => BudgetCheckOutcome::Blocked,
        (true, OverBudgetPolicy::Warn) => BudgetCheckOutcome::Warn,
        (false, _) if projection.requires_review => BudgetCheckOutcome::Warn,
        (false, _) => BudgetCheckOutcome::Clear,
    };

    BudgetCheck { projection, outcome, reasons }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{evaluate_submission, BudgetCheckOutcome, OverBudgetPolicy};
    use crate::domain::budget::BudgetConfiguration;
    use crate::errors::DomainError;

    fn config() -> BudgetConfiguration {
        BudgetConfiguration::new(
            "BC-Q4-INCENTIVE",
            "Q4 Sales Incentives",
            Decimal::new(500_000, 0),
            Decimal::new(485_000, 0),
        )
    }

    #[test]
    fn within_budget_is_clear_under_either_policy() {
        for policy in [OverBudgetPolicy::Warn, OverBudgetPolicy::Block] {
            let check = evaluate_submission(&config(), Decimal::new(15_000, 0), policy);
            assert_eq!(check.outcome, BudgetCheckOutcome::Clear);
            assert!(check.reasons.is_empty());
        }
    }

    #[test]
    fn warn_policy_lets_over_budget_requests_through() {
        let check =
            evaluate_submission(&config(), Decimal::new(51_000, 0), OverBudgetPolicy::Warn);

        assert_eq!(check.outcome, BudgetCheckOutcome::Warn);
        assert!(check.reasons[0].contains("36000"));
        assert!(check.into_result().is_ok());
    }

    #[test]
    fn block_policy_turns_overage_into_validation_error() {
        let check =
            evaluate_submission(&config(), Decimal::new(51_000, 0), OverBudgetPolicy::Block);

        assert!(check.is_blocked());
        let error = check.into_result().expect_err("blocked");
        assert!(
            matches!(error, DomainError::Validation(ref msg) if msg.contains("BC-Q4-INCENTIVE"))
        );
    }

    #[test]
    fn deductions_warn_for_review() {
        let check =
            evaluate_submission(&config(), Decimal::new(-5_000, 0), OverBudgetPolicy::Block);

        assert_eq!(check.outcome, BudgetCheckOutcome::Warn);
        assert!(check.projection.requires_review);
    }

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!(OverBudgetPolicy::parse(" BLOCK "), Some(OverBudgetPolicy::Block));
        assert_eq!(OverBudgetPolicy::parse("warn"), Some(OverBudgetPolicy::Warn));
        assert_eq!(OverBudgetPolicy::parse("deny"), None);
        assert_eq!(OverBudgetPolicy::default(), OverBudgetPolicy::Warn);
    }
}
