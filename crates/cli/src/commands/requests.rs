use std::path::PathBuf;

use clap::Subcommand;
use rust_decimal::Decimal;
use serde_json::json;

use orbit_core::adapter;
use orbit_core::config::LoadOptions;
use orbit_core::domain::approval::{ApprovalRequestId, ApproverIdentity, LevelId, Role};
use orbit_core::domain::budget::BudgetConfigId;
use orbit_core::errors::ApplicationError;
use orbit_core::workflow::{status_label, Decision, LevelAssignment, NewApprovalRequest, Stage};
use orbit_db::ApprovalRequestFilter;

use crate::commands::scan::load_directory;
use crate::commands::{
    new_correlation_id, open_pool, read_input_file, to_data, workflow, CliWorkflow,
    CommandError, CommandResult, Session,
};

#[derive(Debug, Subcommand)]
pub enum RequestsCommand {
    #[command(about = "List approval requests, newest first")]
    List {
        #[arg(long, help = "Only requests against this budget configuration")]
        budget: Option<String>,
        #[arg(long, value_parser = parse_stage, help = "Status label, e.g. pending_l2")]
        stage: Option<Stage>,
        #[arg(long, help = "Only requests submitted by this person")]
        requester: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = orbit_db::repositories::DEFAULT_PER_PAGE)]
        per_page: u32,
    },
    #[command(about = "Show one request with its ladder and line items")]
    Show { id: String },
    #[command(about = "Requests the given role can act on right now")]
    Pending {
        #[arg(long, value_parser = parse_role)]
        role: Role,
    },
    #[command(about = "Create a draft request")]
    Create {
        #[arg(long)]
        budget: String,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        amount: Option<Decimal>,
        #[arg(long)]
        requester: String,
        #[arg(long, value_parser = parse_role, default_value = "employee")]
        role: Role,
        #[arg(
            long = "assign",
            value_parser = parse_assignment,
            help = "Level approvers as level:main[:backup], repeatable"
        )]
        assignments: Vec<LevelAssignment>,
    },
    #[command(about = "Import requests from a JSON export, accepting legacy field names")]
    Import { file: PathBuf },
    #[command(about = "Validate line items from a JSON file and attach them to a draft")]
    Attach {
        id: String,
        file: PathBuf,
        #[arg(long, help = "JSON array of {employee_id, name} records")]
        employees: PathBuf,
    },
    #[command(about = "Submit a draft into the approval ladder")]
    Submit { id: String },
    #[command(about = "Approve or reject the level currently awaiting a decision")]
    Decide {
        id: String,
        #[arg(long, value_parser = parse_level)]
        level: LevelId,
        #[arg(long, value_parser = parse_decision)]
        decision: Decision,
        #[arg(long)]
        approver: String,
        #[arg(long, value_parser = parse_role)]
        role: Role,
        #[arg(long)]
        title: Option<String>,
    },
    #[command(about = "Record payroll's final approval")]
    Complete {
        id: String,
        #[arg(long)]
        approver: String,
        #[arg(long)]
        title: Option<String>,
    },
}

impl RequestsCommand {
    fn name(&self) -> &'static str {
        match self {
            Self::List { .. } => "requests list",
            Self::Show { .. } => "requests show",
            Self::Pending { .. } => "requests pending",
            Self::Create { .. } => "requests create",
            Self::Import { .. } => "requests import",
            Self::Attach { .. } => "requests attach",
            Self::Submit { .. } => "requests submit",
            Self::Decide { .. } => "requests decide",
            Self::Complete { .. } => "requests complete",
        }
    }
}

pub fn run(options: &LoadOptions, command: RequestsCommand) -> CommandResult {
    let name = command.name();
    let session = match Session::open(name, options) {
        Ok(session) => session,
        Err(failure) => return failure,
    };
    let correlation_id = new_correlation_id();

    let result = session.runtime.block_on(async {
        let pool = open_pool(&session.config).await?;
        let result = execute(&workflow(&pool, &session.config), command, &correlation_id).await;
        pool.close().await;
        result
    });

    match result {
        Ok((message, data)) => CommandResult::success_with_data(name, message, Some(data)),
        Err(error) => error.into_result(name),
    }
}

async fn execute(
    workflow: &CliWorkflow,
    command: RequestsCommand,
    correlation_id: &str,
) -> Result<(String, serde_json::Value), CommandError> {
    let rejected = |error: ApplicationError| CommandError::workflow(error, correlation_id);

    match command {
        RequestsCommand::List { budget, stage, requester, page, per_page } => {
            let filter = ApprovalRequestFilter {
                budget_config_id: budget.map(BudgetConfigId),
                stage,
                requested_by: requester,
                page,
                per_page,
            };
            let listed = workflow.list(&filter).await.map_err(rejected)?;
            let message = format!(
                "{} of {} requests (page {})",
                listed.items.len(),
                listed.total,
                listed.page
            );
            Ok((message, to_data(&listed)?))
        }
        RequestsCommand::Show { id } => {
            let request = workflow.get(&ApprovalRequestId(id)).await.map_err(rejected)?;
            let message = format!("{} is {}", request.id.0, status_label(&request));
            Ok((message, to_data(&request)?))
        }
        RequestsCommand::Pending { role } => {
            let pending = workflow.pending_for(role).await.map_err(rejected)?;
            let message = format!("{} requests awaiting {}", pending.len(), role.as_str());
            Ok((message, to_data(&pending)?))
        }
        RequestsCommand::Create {
            budget,
            title,
            description,
            amount,
            requester,
            role,
            assignments,
        } => {
            let input = NewApprovalRequest {
                budget_config_id: BudgetConfigId(budget),
                title,
                description,
                requested_amount: amount,
                requested_by: requester,
                requested_by_role: role,
                assignments,
            };
            let draft = workflow.create_draft(input, correlation_id).await.map_err(rejected)?;
            Ok((format!("created draft {}", draft.id.0), to_data(&draft)?))
        }
        RequestsCommand::Import { file } => {
            let raw = read_input_file(&file)
                .map_err(|error| ("input_file", format!("{error:#}"), 9u8))?;
            let parsed = adapter::parse_requests(&raw)
                .map_err(|error| rejected(error.into()))?;

            let mut imported = Vec::with_capacity(parsed.len());
            for request in parsed {
                let saved = workflow.import(request, correlation_id).await.map_err(rejected)?;
                imported.push(json!({ "id": saved.id.0, "status": status_label(&saved) }));
            }
            Ok((format!("imported {} requests", imported.len()), json!(imported)))
        }
        RequestsCommand::Attach { id, file, employees } => {
            let raw = read_input_file(&file)
                .map_err(|error| ("input_file", format!("{error:#}"), 9u8))?;
            let items = adapter::parse_line_items(&raw)
                .map_err(|error| rejected(error.into()))?;
            let directory = load_directory(&employees)
                .map_err(|error| ("input_file", format!("{error:#}"), 9u8))?;

            let outcome = workflow
                .attach_line_items(&ApprovalRequestId(id), items, &directory, correlation_id)
                .await
                .map_err(rejected)?;
            let message = format!(
                "attached {} line items ({} invalid)",
                outcome.summary.total, outcome.summary.invalid
            );
            Ok((message, to_data(&outcome)?))
        }
        RequestsCommand::Submit { id } => {
            let outcome =
                workflow.submit(&ApprovalRequestId(id), correlation_id).await.map_err(rejected)?;
            let mut message =
                format!("{} is {}", outcome.request.id.0, status_label(&outcome.request));
            if !outcome.budget_check.reasons.is_empty() {
                let reasons = outcome.budget_check.reasons.join("; ");
                message.push_str(&format!(" (warning: {reasons})"));
            }
            Ok((message, to_data(&outcome)?))
        }
        RequestsCommand::Decide { id, level, decision, approver, role, title } => {
            let approver = identity(approver, role, title);
            let outcome = workflow
                .decide(&ApprovalRequestId(id), level, decision, &approver, correlation_id)
                .await
                .map_err(rejected)?;
            let message = format!("{} is {}", outcome.request.id.0, outcome.stage.label());
            Ok((message, to_data(&outcome)?))
        }
        RequestsCommand::Complete { id, approver, title } => {
            let approver = identity(approver, Role::Payroll, title);
            let outcome = workflow
                .complete_payment(&ApprovalRequestId(id), &approver, correlation_id)
                .await
                .map_err(rejected)?;
            let message = format!("{} is {}", outcome.request.id.0, outcome.stage.label());
            Ok((message, to_data(&outcome)?))
        }
    }
}

fn identity(name: String, role: Role, title: Option<String>) -> ApproverIdentity {
    let identity = ApproverIdentity::new(name, role);
    match title {
        Some(title) => identity.with_title(title),
        None => identity,
    }
}

fn parse_stage(value: &str) -> Result<Stage, String> {
    Stage::from_label(value).ok_or_else(|| {
        format!(
            "unknown status `{value}` (expected draft|pending_l1|pending_l2|pending_l3|\
             pending_payroll|approved|rejected)"
        )
    })
}

fn parse_role(value: &str) -> Result<Role, String> {
    Role::parse(value)
        .ok_or_else(|| format!("unknown role `{value}` (expected employee|l1|l2|l3|payroll)"))
}

fn parse_level(value: &str) -> Result<LevelId, String> {
    LevelId::parse(value)
        .ok_or_else(|| format!("unknown level `{value}` (expected l1|l2|l3|payroll)"))
}

fn parse_decision(value: &str) -> Result<Decision, String> {
    Decision::parse(value)
        .ok_or_else(|| format!("unknown decision `{value}` (expected approve|reject)"))
}

fn parse_assignment(value: &str) -> Result<LevelAssignment, String> {
    let mut parts = value.splitn(3, ':').map(str::trim);
    let level = parse_level(parts.next().unwrap_or_default())?;
    let main_approver = parts.next().filter(|name| !name.is_empty()).map(str::to_string);
    let backup_approver = parts.next().filter(|name| !name.is_empty()).map(str::to_string);
    if main_approver.is_none() && backup_approver.is_none() {
        return Err(format!("assignment `{value}` names no approver"));
    }

    Ok(LevelAssignment { level, main_approver, backup_approver })
}

#[cfg(test)]
mod tests {
    use orbit_core::domain::approval::{LevelId, Role};
    use orbit_core::workflow::Stage;

    use super::{parse_assignment, parse_role, parse_stage};

    #[test]
    fn assignment_accepts_main_and_optional_backup() {
        let both = parse_assignment("l1:Dana Reyes:Sam Okafor").expect("valid assignment");
        assert_eq!(both.level, LevelId::L1);
        assert_eq!(both.main_approver.as_deref(), Some("Dana Reyes"));
        assert_eq!(both.backup_approver.as_deref(), Some("Sam Okafor"));

        let main_only = parse_assignment("payroll:Pat Kim").expect("valid assignment");
        assert_eq!(main_only.backup_approver, None);

        assert!(parse_assignment("l2").is_err());
        assert!(parse_assignment("l9:Someone").is_err());
    }

    #[test]
    fn stage_and_role_parse_from_labels() {
        assert_eq!(parse_stage("pending_payroll"), Ok(Stage::Payroll));
        assert_eq!(parse_stage("approved"), Ok(Stage::Completed));
        assert!(parse_stage("escalated").is_err());
        assert_eq!(parse_role(" L3 "), Ok(Role::L3));
    }
}
