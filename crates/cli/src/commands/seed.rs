use orbit_core::config::LoadOptions;
use orbit_db::{DemoSeedDataset, RequestSeedInfo};

use crate::commands::{open_pool, CommandResult, Failure, Session};

pub fn run(options: &LoadOptions) -> CommandResult {
    let session = match Session::open("seed", options) {
        Ok(session) => session,
        Err(failure) => return failure,
    };

    let result = session.runtime.block_on(async {
        let pool = open_pool(&session.config).await?;

        let seed_result = DemoSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
        let verification = DemoSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let run_result: Result<SeedOutput, Failure> = if verification.all_present {
            Ok(SeedOutput {
                budgets: seed_result.budgets_seeded,
                requests: seed_result.requests_seeded,
            })
        } else {
            let failed_checks = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(*check))
                .collect::<Vec<_>>();
            Err(("seed_verification", verification_message(&failed_checks), 6u8))
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(output) => {
            let request_lines: Vec<String> = output
                .requests
                .iter()
                .map(|seed| {
                    format!("  - {}: {} ({})", seed.stage, seed.request_id, seed.description)
                })
                .collect();
            let message = format!(
                "demo dataset loaded: {} budgets, {} requests\n{}",
                output.budgets,
                output.requests.len(),
                request_lines.join("\n")
            );
            CommandResult::success("seed", message)
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

struct SeedOutput {
    budgets: usize,
    requests: Vec<RequestSeedInfo>,
}

fn verification_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "some seed data failed to load".to_string()
    } else {
        format!("seed verification failed for checks: {}", failed_checks.join(", "))
    }
}
