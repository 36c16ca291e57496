//! Classification of bulk-uploaded line items.
//!
//! Every pass is idempotent: flags a pass owns are cleared before it runs,
//! so the whole pipeline can be re-run after any edit to the rows.

use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::line_item::{LineItem, RowStatus};

pub const DUPLICATE_EMPLOYEE_ID: &str = "Duplicate Employee ID";
pub const EMPLOYEE_NOT_FOUND: &str = "Employee not found";
pub const EMPLOYEE_ID_REQUIRED: &str = "Employee ID is required";
pub const AMOUNT_MUST_BE_NON_ZERO: &str = "Amount must be non-zero";
pub const NEGATIVE_AMOUNT_REVIEW: &str = "Negative amount requires manual review";

pub trait EmployeeDirectory {
    fn employee_name(&self, employee_id: &str) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryEmployeeDirectory {
    employees: HashMap<String, String>,
}

impl InMemoryEmployeeDirectory {
    pub fn new(employees: Vec<(String, String)>) -> Self {
        Self {
            employees: employees
                .into_iter()
                .map(|(employee_id, name)| (normalize_employee_id(&employee_id), name))
                .collect(),
        }
    }
}

impl EmployeeDirectory for InMemoryEmployeeDirectory {
    fn employee_name(&self, employee_id: &str) -> Option<String> {
        self.employees.get(&normalize_employee_id(employee_id)).cloned()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkSummary {
    pub total: usize,
    pub valid: usize,
    pub warning: usize,
    pub invalid: usize,
    pub total_amount: Decimal,
}

impl BulkSummary {
    pub fn can_submit(&self) -> bool {
        self.invalid == 0
    }
}

/// Full validation pipeline: identity, directory lookup, amounts, then
/// duplicates, then row status.
pub fn validate_line_items<D>(items: &mut [LineItem], directory: &D) -> BulkSummary
where
    D: EmployeeDirectory + ?Sized,
{
    for item in items.iter_mut() {
        item.errors.clear();
        item.warnings.clear();

        if item.employee_id.trim().is_empty() {
            item.errors.push(EMPLOYEE_ID_REQUIRED.to_string());
        } else {
            match directory.employee_name(&item.employee_id) {
                Some(name) => item.employee_name = Some(name),
                None => item.errors.push(EMPLOYEE_NOT_FOUND.to_string()),
            }
        }

        if item.amount.is_zero() {
            item.errors.push(AMOUNT_MUST_BE_NON_ZERO.to_string());
        } else if item.amount < Decimal::ZERO {
            item.warnings.push(NEGATIVE_AMOUNT_REVIEW.to_string());
        }
    }

    scan_duplicates(items);
    summarize(items)
}

/// Flags every repeat of an employee id after its first occurrence.
/// Ids compare trimmed and case-insensitively; blank ids are ignored. A
/// duplicate proves the id resolved once, so its not-found error is dropped.
pub fn scan_duplicates(items: &mut [LineItem]) {
    let mut seen = HashSet::new();

    for item in items.iter_mut() {
        item.errors.retain(|error| error != DUPLICATE_EMPLOYEE_ID);

        let key = normalize_employee_id(&item.employee_id);
        if key.is_empty() {
            continue;
        }

        if !seen.insert(key) {
            item.errors.retain(|error| error != EMPLOYEE_NOT_FOUND);
            item.errors.push(DUPLICATE_EMPLOYEE_ID.to_string());
        }
    }

    for item in items.iter_mut() {
        item.status = row_status(item);
    }
}

pub fn row_status(item: &LineItem) -> RowStatus {
    if !item.errors.is_empty() {
        RowStatus::Invalid
    } else if !item.warnings.is_empty() {
        RowStatus::Warning
    } else {
        RowStatus::Valid
    }
}

pub fn summarize(items: &[LineItem]) -> BulkSummary {
    let count = |status: RowStatus| items.iter().filter(|item| item.status == status).count();
    BulkSummary {
        total: items.len(),
        valid: count(RowStatus::Valid),
        warning: count(RowStatus::Warning),
        invalid: count(RowStatus::Invalid),
        total_amount: items.iter().map(|item| item.amount).sum(),
    }
}

fn normalize_employee_id(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{
        scan_duplicates, summarize, validate_line_items, InMemoryEmployeeDirectory,
        DUPLICATE_EMPLOYEE_ID, EMPLOYEE_ID_REQUIRED, EMPLOYEE_NOT_FOUND, NEGATIVE_AMOUNT_REVIEW,
    };
    use crate::domain::line_item::{LineItem, RowStatus};

    fn item(row: u32, employee_id: &str, amount: i64) -> LineItem {
        LineItem::new(row, employee_id, Decimal::new(amount, 0))
    }

    fn directory() -> InMemoryEmployeeDirectory {
        InMemoryEmployeeDirectory::new(vec![
            ("EMP-001".to_string(), "Ana Lima".to_string()),
            ("EMP-002".to_string(), "Ben Carter".to_string()),
        ])
    }

    #[test]
    fn only_later_occurrences_are_flagged() {
        let mut items = vec![item(1, "A", 100), item(2, "a", 100), item(3, "B", 100)];

        scan_duplicates(&mut items);

        assert!(items[0].errors.is_empty());
        assert_eq!(items[1].errors, vec![DUPLICATE_EMPLOYEE_ID.to_string()]);
        assert!(items[2].errors.is_empty());
        assert_eq!(items[1].status, RowStatus::Invalid);
        assert_eq!(items[0].status, RowStatus::Valid);
    }

    #[test]
    fn comparison_trims_whitespace() {
        let mut items = vec![item(1, " EMP-7 ", 10), item(2, "emp-7", 10), item(3, "EMP-7\t", 10)];

        scan_duplicates(&mut items);

        assert!(!items[0].has_error(DUPLICATE_EMPLOYEE_ID));
        assert!(items[1].has_error(DUPLICATE_EMPLOYEE_ID));
        assert!(items[2].has_error(DUPLICATE_EMPLOYEE_ID));
    }

    #[test]
    fn duplicate_clears_not_found_on_the_repeat_only() {
        let mut items = vec![item(1, "X-9", 10), item(2, "x-9", 10)];
        for item in &mut items {
            item.errors.push(EMPLOYEE_NOT_FOUND.to_string());
        }

        scan_duplicates(&mut items);

        assert_eq!(items[0].errors, vec![EMPLOYEE_NOT_FOUND.to_string()]);
        assert_eq!(items[1].errors, vec![DUPLICATE_EMPLOYEE_ID.to_string()]);
    }

    #[test]
    fn rescanning_does_not_stack_flags() {
        let mut items = vec![item(1, "A", 1), item(2, "A", 1)];

        scan_duplicates(&mut items);
        scan_duplicates(&mut items);
        assert_eq!(items[1].errors.len(), 1);

        items[1].employee_id = "C".to_string();
        scan_duplicates(&mut items);
        assert!(items[1].errors.is_empty());
        assert_eq!(items[1].status, RowStatus::Valid);
    }

    #[test]
    fn full_validation_classifies_rows() {
        let mut items = vec![
            item(1, "EMP-001", 1_200),
            item(2, "EMP-404", 800),
            item(3, "", 300),
            item(4, "EMP-002", -150),
            item(5, "emp-001", 0),
        ];

        let summary = validate_line_items(&mut items, &directory());

        assert_eq!(items[0].status, RowStatus::Valid);
        assert_eq!(items[0].employee_name.as_deref(), Some("Ana Lima"));
        assert!(items[1].has_error(EMPLOYEE_NOT_FOUND));
        assert!(items[2].has_error(EMPLOYEE_ID_REQUIRED));
        assert_eq!(items[3].status, RowStatus::Warning);
        assert_eq!(items[3].warnings, vec![NEGATIVE_AMOUNT_REVIEW.to_string()]);
        assert!(items[4].has_error(DUPLICATE_EMPLOYEE_ID));

        assert_eq!(summary.total, 5);
        assert_eq!(summary.valid, 1);
        assert_eq!(summary.warning, 1);
        assert_eq!(summary.invalid, 3);
        assert_eq!(summary.total_amount, Decimal::new(2_150, 0));
        assert!(!summary.can_submit());
    }

    #[test]
    fn clean_upload_can_be_submitted() {
        let mut items = vec![item(1, "EMP-001", 500), item(2, "EMP-002", 700)];

        let summary = validate_line_items(&mut items, &directory());

        assert!(summary.can_submit());
        assert_eq!(summary, summarize(&items));
    }
}
