use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BudgetConfigId(pub String);

/// A spending cap that approval requests draw against. `used_amount` may
/// exceed `total_limit`; over-budget is reported, not prevented.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetConfiguration {
    pub id: BudgetConfigId,
    pub name: String,
    pub department: Option<String>,
    pub scope: Option<String>,
    pub total_limit: Decimal,
    pub used_amount: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl BudgetConfiguration {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        total_limit: Decimal,
        used_amount: Decimal,
    ) -> Self {
        Self {
            id: BudgetConfigId(id.into()),
            name: name.into(),
            department: None,
            scope: None,
            total_limit,
            used_amount,
            updated_at: Utc::now(),
        }
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    pub fn remaining(&self) -> Decimal {
        self.total_limit - self.used_amount
    }

    /// Consumes budget for a completed request. Usage only grows through
    /// this path; see `correct_usage` for administrative adjustments.
    pub fn record_usage(&mut self, amount: Decimal) -> Result<(), DomainError> {
        if amount < Decimal::ZERO {
            return Err(DomainError::InvariantViolation(format!(
                "budget usage for `{}` cannot decrease by recording {amount}",
                self.id.0
            )));
        }

        self.used_amount += amount;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn correct_usage(&mut self, used_amount: Decimal) -> Result<(), DomainError> {
        if used_amount < Decimal::ZERO {
            return Err(DomainError::Validation(format!(
                "used amount for `{}` must be >= 0",
                self.id.0
            )));
        }

        self.used_amount = used_amount;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::BudgetConfiguration;
    use crate::errors::DomainError;

    #[test]
    fn recorded_usage_accumulates_past_the_limit() {
        let mut config = BudgetConfiguration::new(
            "BC-1",
            "Q4 Sales Incentives",
            Decimal::new(500_000, 0),
            Decimal::new(485_000, 0),
        );

        config.record_usage(Decimal::new(51_000, 0)).expect("record usage");

        assert_eq!(config.used_amount, Decimal::new(536_000, 0));
        assert_eq!(config.remaining(), Decimal::new(-36_000, 0));
    }

    #[test]
    fn usage_never_decreases_outside_corrections() {
        let mut config =
            BudgetConfiguration::new("BC-2", "Overtime", Decimal::new(10_000, 0), Decimal::ZERO);

        let error = config.record_usage(Decimal::new(-5, 0)).expect_err("negative usage");
        assert!(matches!(error, DomainError::InvariantViolation(_)));

        config.correct_usage(Decimal::new(2_500, 0)).expect("admin correction");
        assert_eq!(config.used_amount, Decimal::new(2_500, 0));
        assert!(config.correct_usage(Decimal::new(-1, 0)).is_err());
    }
}
