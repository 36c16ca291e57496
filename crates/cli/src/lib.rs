pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use orbit_core::budget::OverBudgetPolicy;
use orbit_core::config::{AppConfig, ConfigOverrides, LoadOptions, LogFormat};

use crate::commands::budget::BudgetCommand;
use crate::commands::requests::RequestsCommand;

#[derive(Debug, Parser)]
#[command(
    name = "orbit",
    about = "ORBIT approval workflow operator CLI",
    long_about = "Inspect and drive approval requests through the l1 > l2 > l3 > payroll ladder, \
                  check budget usage, and validate bulk line items.",
    after_help = "Examples:\n  orbit seed\n  orbit requests pending --role l1\n  \
                  orbit budget usage BC-Q4-INCENTIVE --amount 51000"
)]
pub struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Args)]
struct GlobalArgs {
    #[arg(long, global = true, help = "Config file to load (must exist)")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override database.url")]
    database_url: Option<String>,
    #[arg(long, global = true, value_parser = parse_policy, help = "Override warn|block")]
    over_budget_policy: Option<OverBudgetPolicy>,
    #[arg(long, global = true, help = "Override logging.level")]
    log_level: Option<String>,
    #[arg(long, global = true, value_parser = parse_log_format)]
    log_format: Option<LogFormat>,
}

impl GlobalArgs {
    fn load_options(self) -> LoadOptions {
        LoadOptions {
            require_file: self.config.is_some(),
            config_path: self.config,
            overrides: ConfigOverrides {
                database_url: self.database_url,
                log_level: self.log_level,
                log_format: self.log_format,
                over_budget_policy: self.over_budget_policy,
            },
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations")]
    Migrate,
    #[command(about = "Load the deterministic demo dataset and verify it")]
    Seed,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    /// Query and act on approval requests
    #[command(subcommand)]
    Requests(RequestsCommand),
    /// Budget usage and projections
    #[command(subcommand)]
    Budget(BudgetCommand),
    #[command(about = "Validate a JSON file of line items without storing it")]
    Scan {
        file: PathBuf,
        #[arg(long, help = "JSON array of {employee_id, name} records")]
        employees: PathBuf,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.global.load_options();

    if let Ok(config) = AppConfig::load(options.clone()) {
        init_logging(&config);
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(&options),
        Command::Seed => commands::seed::run(&options),
        Command::Config => commands::config::run(&options),
        Command::Requests(command) => commands::requests::run(&options, command),
        Command::Budget(command) => commands::budget::run(&options, command),
        Command::Scan { file, employees } => commands::scan::run(&file, &employees),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so stdout stays a single JSON outcome.
fn init_logging(config: &AppConfig) {
    use orbit_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    match config.logging.format {
        Compact => builder.compact().init(),
        Pretty => builder.pretty().init(),
        Json => builder.json().init(),
    }
}

fn parse_policy(value: &str) -> Result<OverBudgetPolicy, String> {
    OverBudgetPolicy::parse(value)
        .ok_or_else(|| format!("unknown over-budget policy `{value}` (expected warn|block)"))
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    value.parse::<LogFormat>().map_err(|error| error.to_string())
}
