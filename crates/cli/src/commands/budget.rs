use std::path::PathBuf;

use clap::Subcommand;
use rust_decimal::Decimal;

use orbit_core::adapter;
use orbit_core::budget::usage_summary;
use orbit_core::config::LoadOptions;
use orbit_core::domain::budget::BudgetConfigId;
use orbit_core::errors::ApplicationError;
use orbit_db::BudgetConfigurationRepository;

use crate::commands::{
    new_correlation_id, open_pool, read_input_file, to_data, workflow, CliWorkflow,
    CommandError, CommandResult, Session,
};

#[derive(Debug, Subcommand)]
pub enum BudgetCommand {
    #[command(about = "Usage of one budget, optionally projected with a requested amount")]
    Usage {
        config_id: String,
        #[arg(long, help = "Amount to project on top of current usage")]
        amount: Option<Decimal>,
    },
    #[command(about = "Usage summary of every budget configuration")]
    List,
    #[command(about = "Create or update budgets from a JSON export")]
    Import { file: PathBuf },
}

impl BudgetCommand {
    fn name(&self) -> &'static str {
        match self {
            Self::Usage { .. } => "budget usage",
            Self::List => "budget list",
            Self::Import { .. } => "budget import",
        }
    }
}

pub fn run(options: &LoadOptions, command: BudgetCommand) -> CommandResult {
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
    command: BudgetCommand,
    correlation_id: &str,
) -> Result<(String, serde_json::Value), CommandError> {
    let rejected = |error: ApplicationError| CommandError::workflow(error, correlation_id);

    match command {
        BudgetCommand::Usage { config_id, amount } => {
            let report = workflow
                .budget_usage(&BudgetConfigId(config_id), amount)
                .await
                .map_err(rejected)?;
            let usage = &report.usage;
            let mut message = if usage.unlimited {
                format!("{}: unlimited ({} used)", usage.config_id.0, usage.used_amount)
            } else {
                format!(
                    "{}: {}% used ({} tier), {} remaining",
                    usage.config_id.0,
                    usage.percentage,
                    usage.tier.as_str(),
                    usage.remaining
                )
            };
            if let Some(projection) = &report.projection {
                if projection.exceeds_budget {
                    message.push_str(&format!(
                        "; request would exceed the limit by {}",
                        projection.overage_amount
                    ));
                } else if !projection.unlimited {
                    message.push_str(&format!(
                        "; {}% after request",
                        projection.after_percentage
                    ));
                }
            }
            Ok((message, to_data(&report)?))
        }
        BudgetCommand::List => {
            let configs = workflow.budgets().list().await.map_err(|error| rejected(error.into()))?;
            let summaries: Vec<_> = configs.iter().map(usage_summary).collect();
            Ok((format!("{} budget configurations", summaries.len()), to_data(&summaries)?))
        }
        BudgetCommand::Import { file } => {
            let raw = read_input_file(&file)
                .map_err(|error| ("input_file", format!("{error:#}"), 9u8))?;
            let configs = adapter::parse_budgets(&raw).map_err(|error| rejected(error.into()))?;

            let mut ids = Vec::with_capacity(configs.len());
            for config in configs {
                ids.push(config.id.0.clone());
                workflow.budgets().save(config).await.map_err(|error| rejected(error.into()))?;
            }
            tracing::info!(
                event_name = "cli.budget.imported",
                correlation_id,
                count = ids.len(),
                "budget configurations imported"
            );
            Ok((format!("imported {} budget configurations", ids.len()), to_data(&ids)?))
        }
    }
}
