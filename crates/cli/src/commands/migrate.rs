use orbit_core::config::LoadOptions;

use crate::commands::{open_pool, CommandResult, Session};

pub fn run(options: &LoadOptions) -> CommandResult {
    let session = match Session::open("migrate", options) {
        Ok(session) => session,
        Err(failure) => return failure,
    };

    let result = session.runtime.block_on(async {
        let pool = open_pool(&session.config).await?;
        pool.close().await;
        Ok::<(), crate::commands::Failure>(())
    });

    match result {
        Ok(()) => {
            tracing::info!(event_name = "cli.migrate.completed", "migrations applied");
            CommandResult::success("migrate", "applied pending migrations")
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}
