use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use orbit_core::adapter;
use orbit_core::bulk::{validate_line_items, BulkSummary, InMemoryEmployeeDirectory};
use orbit_core::domain::line_item::LineItem;

use crate::commands::{read_input_file, CommandResult};

#[derive(Debug, Deserialize)]
struct EmployeeRecord {
    #[serde(alias = "id")]
    employee_id: String,
    #[serde(alias = "employee_name")]
    name: String,
}

#[derive(Debug, Serialize)]
struct ScanReport {
    summary: BulkSummary,
    can_submit: bool,
    rows: Vec<LineItem>,
}

/// Classifies a JSON array of line items without touching the database.
pub fn run(file: &Path, employees: &Path) -> CommandResult {
    match scan(file, employees) {
        Ok(report) => {
            let message = format!(
                "{} rows: {} valid, {} warning, {} invalid",
                report.summary.total,
                report.summary.valid,
                report.summary.warning,
                report.summary.invalid
            );
            let data = serde_json::to_value(&report).ok();
            tracing::info!(
                event_name = "cli.scan.completed",
                total = report.summary.total,
                invalid = report.summary.invalid,
                "line item scan completed"
            );
            CommandResult::success_with_data("scan", message, data)
        }
        Err(error) => CommandResult::failure("scan", "input_file", format!("{error:#}"), 9),
    }
}

fn scan(file: &Path, employees: &Path) -> anyhow::Result<ScanReport> {
    let raw = read_input_file(file)?;
    let mut rows = adapter::parse_line_items(&raw)
        .with_context(|| format!("`{}` is not a line item list", file.display()))?;
    let directory = load_directory(employees)?;

    let summary = validate_line_items(&mut rows, &directory);
    Ok(ScanReport { can_submit: summary.can_submit(), summary, rows })
}

pub(crate) fn load_directory(path: &Path) -> anyhow::Result<InMemoryEmployeeDirectory> {
    let raw = read_input_file(path)?;
    let records: Vec<EmployeeRecord> = serde_json::from_str(&raw)
        .with_context(|| format!("`{}` is not an employee list", path.display()))?;

    Ok(InMemoryEmployeeDirectory::new(
        records.into_iter().map(|record| (record.employee_id, record.name)).collect(),
    ))
}
