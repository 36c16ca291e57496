use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::budget::{BudgetConfigId, BudgetConfiguration};

const MEDIUM_TIER_FLOOR: Decimal = Decimal::from_parts(75, 0, 0, false, 0);
const HIGH_TIER_FLOOR: Decimal = Decimal::from_parts(90, 0, 0, false, 0);
const CRITICAL_TIER_FLOOR: Decimal = Decimal::ONE_HUNDRED;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsagePercentage {
    pub percentage: Decimal,
    /// Set when the configuration has no positive limit to divide by.
    pub unlimited: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectedUsage {
    pub after_amount: Decimal,
    pub after_percentage: Decimal,
    pub exceeds_budget: bool,
    pub overage_amount: Decimal,
    /// Deductions are allowed but flagged for a manual look.
    pub requires_review: bool,
    pub unlimited: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageTier {
    Low,
    Medium,
    High,
    Critical,
}

impl UsageTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetUsage {
    pub config_id: BudgetConfigId,
    pub name: String,
    pub total_limit: Decimal,
    pub used_amount: Decimal,
    pub remaining: Decimal,
    pub percentage: Decimal,
    pub tier: UsageTier,
    pub unlimited: bool,
}

pub fn current_percentage(config: &BudgetConfiguration) -> UsagePercentage {
    match percentage_of(config.used_amount, config.total_limit) {
        Some(percentage) => UsagePercentage { percentage, unlimited: false },
        None => UsagePercentage { percentage: Decimal::ZERO, unlimited: true },
    }
}

pub fn projected_usage(config: &BudgetConfiguration, requested_amount: Decimal) -> ProjectedUsage {
    let after_amount = config.used_amount + requested_amount;
    let requires_review = requested_amount < Decimal::ZERO;

    let Some(after_percentage) = percentage_of(after_amount, config.total_limit) else {
        return ProjectedUsage {
            after_amount,
            after_percentage: Decimal::ZERO,
            exceeds_budget: false,
            overage_amount: Decimal::ZERO,
            requires_review,
            unlimited: true,
        };
    };

    ProjectedUsage {
        after_amount,
        after_percentage,
        exceeds_budget: after_amount > config.total_limit,
        overage_amount: (after_amount - config.total_limit).max(Decimal::ZERO),
        requires_review,
        unlimited: false,
    }
}

/// Each band includes its lower bound: 75 is medium, 90 is high, 100 is
/// critical.
pub fn usage_color_tier(percentage: Decimal) -> UsageTier {
    if percentage >= CRITICAL_TIER_FLOOR {
        UsageTier::Critical
    } else if percentage >= HIGH_TIER_FLOOR {
        UsageTier::High
    } else if percentage >= MEDIUM_TIER_FLOOR {
        UsageTier::Medium
    } else {
        UsageTier::Low
    }
}

/// The tier is picked from the exact ratio; only the reported percentage
/// is rounded, so 99.996% reads as 100.00 but stays high.
pub fn usage_summary(config: &BudgetConfiguration) -> BudgetUsage {
    let exact = exact_percentage(config.used_amount, config.total_limit);
    BudgetUsage {
        config_id: config.id.clone(),
        name: config.name.clone(),
        total_limit: config.total_limit,
        used_amount: config.used_amount,
        remaining: config.remaining(),
        percentage: exact.map_or(Decimal::ZERO, |percentage| percentage.round_dp(2)),
        tier: usage_color_tier(exact.unwrap_or(Decimal::ZERO)),
        unlimited: exact.is_none(),
    }
}

fn percentage_of(amount: Decimal, limit: Decimal) -> Option<Decimal> {
    exact_percentage(amount, limit).map(|percentage| percentage.round_dp(2))
}

fn exact_percentage(amount: Decimal, limit: Decimal) -> Option<Decimal> {
    if limit <= Decimal::ZERO {
        return None;
    }

    Some(amount / limit * Decimal::ONE_HUNDRED)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{current_percentage, projected_usage, usage_color_tier, usage_summary, UsageTier};
    use crate::domain::budget::BudgetConfiguration;

    fn config(total_limit: i64, used_amount: i64) -> BudgetConfiguration {
        BudgetConfiguration::new(
            "BC-Q4-INCENTIVE",
            "Q4 Sales Incentives",
            Decimal::new(total_limit, 0),
            Decimal::new(used_amount, 0),
        )
    }

    #[test]
    fn over_budget_request_scenario() {
        let projection = projected_usage(&config(500_000, 485_000), Decimal::new(51_000, 0));

        assert_eq!(projection.after_amount, Decimal::new(536_000, 0));
        assert!(projection.exceeds_budget);
        assert_eq!(projection.overage_amount, Decimal::new(36_000, 0));
        assert_eq!(projection.after_percentage, Decimal::new(1072, 1));
        assert!(!projection.requires_review);
    }

    #[test]
    fn landing_exactly_on_the_limit_does_not_exceed() {
        let projection = projected_usage(&config(500_000, 485_000), Decimal::new(15_000, 0));

        assert_eq!(projection.after_amount, Decimal::new(500_000, 0));
        assert!(!projection.exceeds_budget);
        assert_eq!(projection.overage_amount, Decimal::ZERO);
        assert_eq!(projection.after_percentage, Decimal::ONE_HUNDRED);
    }

    #[test]
    fn after_amount_is_used_plus_requested_for_any_sign() {
        let config = config(80_000, 20_000);
        for amount in [-25_000_i64, -1, 0, 1, 60_000, 1_000_000] {
            let amount = Decimal::new(amount, 0);
            let projection = projected_usage(&config, amount);
            assert_eq!(projection.after_amount, config.used_amount + amount);
            assert_eq!(projection.exceeds_budget, projection.after_amount > config.total_limit);
        }
    }

    #[test]
    fn deductions_lower_usage_and_are_flagged_for_review() {
        let projection = projected_usage(&config(100_000, 40_000), Decimal::new(-10_000, 0));

        assert_eq!(projection.after_amount, Decimal::new(30_000, 0));
        assert_eq!(projection.after_percentage, Decimal::new(30, 0));
        assert!(projection.requires_review);
        assert!(!projection.exceeds_budget);
    }

    #[test]
    fn zero_limit_is_reported_as_unlimited() {
        let current = current_percentage(&config(0, 12_000));
        assert!(current.unlimited);
        assert_eq!(current.percentage, Decimal::ZERO);

        let projection = projected_usage(&config(0, 12_000), Decimal::new(5_000, 0));
        assert!(projection.unlimited);
        assert!(!projection.exceeds_budget);
        assert_eq!(projection.overage_amount, Decimal::ZERO);
    }

    #[test]
    fn current_percentage_rounds_to_two_places() {
        let current = current_percentage(&config(300, 100));
        assert_eq!(current.percentage, Decimal::new(3333, 2));
        assert!(!current.unlimited);
    }

    #[test]
    fn tiers_include_their_lower_bound() {
        let cases = [
            (Decimal::ZERO, UsageTier::Low),
            (Decimal::new(7499, 2), UsageTier::Low),
            (Decimal::new(75, 0), UsageTier::Medium),
            (Decimal::new(8999, 2), UsageTier::Medium),
            (Decimal::new(90, 0), UsageTier::High),
            (Decimal::new(9999, 2), UsageTier::High),
            (Decimal::new(100, 0), UsageTier::Critical),
            (Decimal::new(1072, 1), UsageTier::Critical),
        ];

        for (percentage, expected) in cases {
            assert_eq!(usage_color_tier(percentage), expected, "percentage {percentage}");
        }
    }

    #[test]
    fn summary_combines_percentage_and_tier() {
        let summary = usage_summary(&config(500_000, 485_000));

        assert_eq!(summary.percentage, Decimal::new(97, 0));
        assert_eq!(summary.tier, UsageTier::High);
        assert_eq!(summary.remaining, Decimal::new(15_000, 0));
    }

    #[test]
    fn usage_just_below_a_band_keeps_the_lower_tier() {
        let cases = [
            (74_996, Decimal::new(75, 0), UsageTier::Low),
            (89_996, Decimal::new(90, 0), UsageTier::Medium),
            (99_996, Decimal::ONE_HUNDRED, UsageTier::High),
        ];

        for (used, shown, tier) in cases {
            let summary = usage_summary(&config(100_000, used));
            assert_eq!(summary.percentage, shown, "used {used}");
            assert_eq!(summary.tier, tier, "used {used}");
        }
        assert_eq!(usage_summary(&config(100_000, 100_000)).tier, UsageTier::Critical);
    }
}
