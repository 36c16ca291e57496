pub mod budget;
pub mod config;
pub mod migrate;
pub mod requests;
pub mod scan;
pub mod seed;

use std::path::Path;

use anyhow::Context;
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Runtime;

use orbit_core::audit::{AuditEvent, AuditSink};
use orbit_core::config::{AppConfig, LoadOptions};
use orbit_core::errors::{ApplicationError, InterfaceError};
use orbit_db::{
    connect_with_config, migrations, ApprovalWorkflow, DbPool, SqlApprovalRequestRepository,
    SqlBudgetConfigurationRepository,
};

pub type CliWorkflow = ApprovalWorkflow<
    SqlApprovalRequestRepository,
    SqlBudgetConfigurationRepository,
    TracingAuditSink,
>;

/// `(error_class, message, exit_code)`
pub(crate) type Failure = (&'static str, String, u8);

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_data(command, message, None)
    }

    pub fn success_with_data(
        command: &str,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            correlation_id: None,
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            correlation_id: None,
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    /// Workflow rejections carry the correlation id of the failed call so the
    /// audit trail can be matched to the CLI output.
    pub fn rejected(command: &str, error: &InterfaceError) -> Self {
        let (error_class, exit_code) = interface_class(error);
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: format!("{} ({error})", error.user_message()),
            correlation_id: Some(error.correlation_id().to_string()),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\
             \"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

fn interface_class(error: &InterfaceError) -> (&'static str, u8) {
    match error {
        InterfaceError::BadRequest { .. } => ("bad_request", 7),
        InterfaceError::Conflict { .. } => ("conflict", 7),
        InterfaceError::NotFound { .. } => ("not_found", 8),
        InterfaceError::ServiceUnavailable { .. } => ("service_unavailable", 4),
        InterfaceError::Internal { .. } => ("internal", 1),
    }
}

/// Errors out of a command body: either a setup failure or a workflow
/// rejection that keeps its interface mapping.
pub(crate) enum CommandError {
    Setup(Failure),
    Workflow(InterfaceError),
}

impl From<Failure> for CommandError {
    fn from(failure: Failure) -> Self {
        Self::Setup(failure)
    }
}

impl CommandError {
    pub(crate) fn workflow(error: ApplicationError, correlation_id: &str) -> Self {
        Self::Workflow(error.into_interface(correlation_id))
    }

    pub(crate) fn into_result(self, command: &str) -> CommandResult {
        match self {
            Self::Setup((error_class, message, exit_code)) => {
                CommandResult::failure(command, error_class, message, exit_code)
            }
            Self::Workflow(error) => CommandResult::rejected(command, &error),
        }
    }
}

/// Loaded configuration plus the single-threaded runtime every command
/// blocks on.
pub(crate) struct Session {
    pub config: AppConfig,
    pub runtime: Runtime,
}

impl Session {
    pub(crate) fn open(command: &str, options: &LoadOptions) -> Result<Self, CommandResult> {
        let config = AppConfig::load(options.clone()).map_err(|error| {
            CommandResult::failure(
                command,
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            )
        })?;

        let runtime =
            tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(
                |error| {
                    CommandResult::failure(
                        command,
                        "runtime_init",
                        format!("failed to initialize async runtime: {error}"),
                        3,
                    )
                },
            )?;

        Ok(Self { config, runtime })
    }
}

pub(crate) async fn open_pool(config: &AppConfig) -> Result<DbPool, Failure> {
    let pool = connect_with_config(&config.database)
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
    migrations::run_pending(&pool)
        .await
        .map_err(|error| ("migration", error.to_string(), 5u8))?;
    Ok(pool)
}

pub(crate) fn workflow(pool: &DbPool, config: &AppConfig) -> CliWorkflow {
    ApprovalWorkflow::new(
        SqlApprovalRequestRepository::new(pool.clone()),
        SqlBudgetConfigurationRepository::new(pool.clone()),
        TracingAuditSink,
        config.budget.over_budget_policy,
    )
}

pub(crate) fn new_correlation_id() -> String {
    format!("cli-{}", uuid::Uuid::new_v4().simple())
}

pub(crate) fn read_input_file(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("could not read `{}`", path.display()))
}

pub(crate) fn to_data<T: Serialize>(value: &T) -> Result<Value, Failure> {
    serde_json::to_value(value).map_err(|error| ("serialization", error.to_string(), 1u8))
}

/// Forwards audit events to the log stream.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        tracing::info!(
            event_name = "audit.event",
            audit_event = %event.event_type,
            category = event.category.as_str(),
            outcome = event.outcome.as_str(),
            correlation_id = %event.context.correlation_id,
            request_id = event.context.request_id.as_ref().map(|id| id.0.as_str()).unwrap_or("-"),
            actor = %event.context.actor,
            metadata = ?event.metadata,
            "audit event"
        );
    }
}

#[cfg(test)]
mod tests {
    use orbit_core::errors::{ApplicationError, DomainError};
    use serde_json::Value;

    use super::{CommandError, CommandResult};

    fn parse(result: &CommandResult) -> Value {
        serde_json::from_str(&result.output).expect("payload should be JSON")
    }

    #[test]
    fn failure_payload_carries_class_and_code() {
        let result = CommandResult::failure("migrate", "migration", "boom", 5);
        assert_eq!(result.exit_code, 5);

        let payload = parse(&result);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "migration");
        assert!(payload.get("data").is_none());
    }

    #[test]
    fn workflow_errors_keep_correlation_id_and_class() {
        let not_found = CommandError::workflow(
            ApplicationError::not_found("approval request", "AR-404"),
            "cli-123",
        )
        .into_result("requests show");
        assert_eq!(not_found.exit_code, 8);
        let payload = parse(&not_found);
        assert_eq!(payload["error_class"], "not_found");
        assert_eq!(payload["correlation_id"], "cli-123");

        let rejected = CommandError::workflow(
            ApplicationError::Domain(DomainError::Validation("over budget".to_string())),
            "cli-456",
        )
        .into_result("requests submit");
        assert_eq!(rejected.exit_code, 7);
        assert_eq!(parse(&rejected)["error_class"], "bad_request");
    }

    #[test]
    fn success_with_data_embeds_payload() {
        let result = CommandResult::success_with_data(
            "budget usage",
            "ok",
            Some(serde_json::json!({ "tier": "high" })),
        );
        assert_eq!(parse(&result)["data"]["tier"], "high");
    }
}
