use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    #[default]
    Valid,
    Warning,
    Invalid,
}

impl RowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Warning => "warning",
            Self::Invalid => "invalid",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "valid" => Some(Self::Valid),
            "warning" => Some(Self::Warning),
            "invalid" => Some(Self::Invalid),
            _ => None,
        }
    }
}

/// One row of a bulk upload attached to an approval request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub row_number: u32,
    pub employee_id: String,
    #[serde(default)]
    pub employee_name: Option<String>,
    pub amount: Decimal,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub status: RowStatus,
}

impl LineItem {
    pub fn new(row_number: u32, employee_id: impl Into<String>, amount: Decimal) -> Self {
        Self {
            row_number,
            employee_id: employee_id.into(),
            employee_name: None,
            amount,
            note: None,
            errors: Vec::new(),
            warnings: Vec::new(),
            status: RowStatus::Valid,
        }
    }

    pub fn has_error(&self, message: &str) -> bool {
        self.errors.iter().any(|error| error == message)
    }
}
