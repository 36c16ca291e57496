use std::env;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use rust_decimal::Decimal;
use serde_json::Value;

use orbit_cli::commands::budget::BudgetCommand;
use orbit_cli::commands::requests::RequestsCommand;
use orbit_cli::commands::{config, migrate, requests, seed};
use orbit_core::budget::OverBudgetPolicy;
use orbit_core::config::{ConfigOverrides, LoadOptions};
use orbit_core::domain::approval::{LevelId, Role};
use orbit_core::workflow::{Decision, LevelAssignment};

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(
        &[("ORBIT_DATABASE_URL", "sqlite::memory:"), ("ORBIT_DATABASE_MAX_CONNECTIONS", "1")],
        || {
            let result = migrate::run(&LoadOptions::default());
            assert_eq!(result.exit_code, 0, "expected successful migrate run");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["command"], "migrate");
            assert_eq!(payload["status"], "ok");
        },
    );
}

#[test]
fn migrate_returns_config_failure_for_invalid_policy() {
    with_env(&[("ORBIT_BUDGET_OVER_BUDGET_POLICY", "sometimes")], || {
        let result = migrate::run(&LoadOptions::default());
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_is_idempotent_across_runs() {
    with_database(|_| {
        let first = seed::run(&LoadOptions::default());
        assert_eq!(first.exit_code, 0, "{}", first.output);
        let second = seed::run(&LoadOptions::default());
        assert_eq!(second.exit_code, 0, "{}", second.output);

        let first_payload = parse_payload(&first.output);
        let second_payload = parse_payload(&second.output);
        assert_eq!(first_payload["message"], second_payload["message"]);

        let message = first_payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("  - pending_payroll: AR-SEED-004"));
        assert!(message.contains("  - draft: AR-SEED-001"));
    });
}

#[test]
fn payroll_completion_books_usage_against_the_budget() {
    with_database(|_| {
        let options = LoadOptions::default();
        assert_eq!(seed::run(&options).exit_code, 0);

        let pending = requests::run(&options, RequestsCommand::Pending { role: Role::Payroll });
        let payload = parse_payload(&pending.output);
        assert_eq!(payload["data"][0]["id"], "AR-SEED-004");

        let completed = requests::run(
            &options,
            RequestsCommand::Complete {
                id: "AR-SEED-004".to_string(),
                approver: "Pat Kim".to_string(),
                title: Some("Payroll Specialist".to_string()),
            },
        );
        assert_eq!(completed.exit_code, 0, "{}", completed.output);
        let payload = parse_payload(&completed.output);
        assert_eq!(payload["message"], "AR-SEED-004 is approved");

        let usage = budget_usage(&options, "BC-OVERTIME", None);
        assert_eq!(usage["data"]["usage"]["used_amount"], "38000");
    });
}

#[test]
fn manager_ladder_runs_from_create_to_pending_l2() {
    with_database(|_| {
        let options = LoadOptions::default();
        assert_eq!(seed::run(&options).exit_code, 0);

        let created = requests::run(
            &options,
            RequestsCommand::Create {
                budget: "BC-OVERTIME".to_string(),
                title: "Night shift premium".to_string(),
                description: "Premium for the night crew".to_string(),
                amount: Some(Decimal::new(1_500, 0)),
                requester: "Ana Lima".to_string(),
                role: Role::Employee,
                assignments: vec![LevelAssignment {
                    level: LevelId::L1,
                    main_approver: Some("Dana Reyes".to_string()),
                    backup_approver: Some("Sam Okafor".to_string()),
                }],
            },
        );
        assert_eq!(created.exit_code, 0, "{}", created.output);
        let id = parse_payload(&created.output)["data"]["id"]
            .as_str()
            .expect("draft id")
            .to_string();

        let submitted = requests::run(&options, RequestsCommand::Submit { id: id.clone() });
        assert_eq!(parse_payload(&submitted.output)["message"], format!("{id} is pending_l1"));

        let stranger = requests::run(&options, decide(&id, LevelId::L1, "Lee Park", Role::L1));
        assert_eq!(stranger.exit_code, 7);
        let payload = parse_payload(&stranger.output);
        assert_eq!(payload["error_class"], "bad_request");
        assert!(payload["correlation_id"].as_str().is_some_and(|cid| cid.starts_with("cli-")));

        let backup = requests::run(&options, decide(&id, LevelId::L1, "Sam Okafor", Role::L1));
        assert_eq!(parse_payload(&backup.output)["message"], format!("{id} is pending_l2"));
    });
}

#[test]
fn block_policy_flag_refuses_over_budget_submission() {
    with_database(|_| {
        assert_eq!(seed::run(&LoadOptions::default()).exit_code, 0);
        let blocking = LoadOptions {
            overrides: ConfigOverrides {
                over_budget_policy: Some(OverBudgetPolicy::Block),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        };

        let created = requests::run(
            &blocking,
            RequestsCommand::Create {
                budget: "BC-Q4-INCENTIVE".to_string(),
                title: "Year-end bonus".to_string(),
                description: "Bonus for the whole sales org".to_string(),
                amount: Some(Decimal::new(51_000, 0)),
                requester: "Marco Silva".to_string(),
                role: Role::Employee,
                assignments: Vec::new(),
            },
        );
        let id = parse_payload(&created.output)["data"]["id"]
            .as_str()
            .expect("draft id")
            .to_string();

        let submitted = requests::run(&blocking, RequestsCommand::Submit { id: id.clone() });
        assert_eq!(submitted.exit_code, 7, "{}", submitted.output);

        let shown = requests::run(&blocking, RequestsCommand::Show { id: id.clone() });
        assert_eq!(parse_payload(&shown.output)["message"], format!("{id} is draft"));

        let projected = budget_usage(&blocking, "BC-Q4-INCENTIVE", Some(Decimal::new(51_000, 0)));
        assert_eq!(projected["data"]["projection"]["exceeds_budget"], true);
    });
}

#[test]
fn unknown_request_maps_to_not_found() {
    with_database(|_| {
        let result =
            requests::run(&LoadOptions::default(), RequestsCommand::Show { id: "AR-404".into() });
        assert_eq!(result.exit_code, 8);
        assert_eq!(parse_payload(&result.output)["error_class"], "not_found");
    });
}

#[test]
fn import_accepts_legacy_field_names() {
    with_database(|dir| {
        let options = LoadOptions::default();
        let budgets = dir.join("budgets.json");
        let exported = dir.join("requests.json");
        fs::write(
            &budgets,
            r#"{"data": [{"budget_id": "BC-LEGACY", "budget_name": "Legacy pool",
                          "budget_limit": "10000", "budget_used": "2500"}]}"#,
        )
        .expect("write budgets");
        fs::write(
            &exported,
            r#"[{"request_id": "AR-LEGACY-1", "config_id": "BC-LEGACY",
                 "request_title": "Migrated", "description": "From the old tracker",
                 "amount": 500, "requester": "Ana Lima",
                 "approvals": {"l1": {"status": "pending"}, "l2": {}, "l3": {},
                               "payroll": {}}}]"#,
        )
        .expect("write requests");

        let imported_budgets =
            orbit_cli::commands::budget::run(&options, BudgetCommand::Import { file: budgets });
        assert_eq!(imported_budgets.exit_code, 0, "{}", imported_budgets.output);

        let imported =
            requests::run(&options, RequestsCommand::Import { file: exported.clone() });
        assert_eq!(imported.exit_code, 0, "{}", imported.output);
        assert_eq!(parse_payload(&imported.output)["data"][0]["status"], "pending_l1");

        let usage = budget_usage(&options, "BC-LEGACY", None);
        assert_eq!(usage["data"]["usage"]["tier"], "low");

        let replayed = requests::run(&options, RequestsCommand::Import { file: exported });
        assert_eq!(replayed.exit_code, 7, "{}", replayed.output);
        assert_eq!(parse_payload(&replayed.output)["error_class"], "conflict");
    });
}

#[test]
fn config_reports_env_and_default_sources() {
    with_env(&[("ORBIT_BUDGET_OVER_BUDGET_POLICY", "block")], || {
        let result = config::run(&LoadOptions::default());
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.contains(
            "- budget.over_budget_policy = block (source: env (ORBIT_BUDGET_OVER_BUDGET_POLICY))"
        ));
        assert!(message.contains("- database.timeout_secs = 30 (source: default)"));
    });
}

fn decide(id: &str, level: LevelId, approver: &str, role: Role) -> RequestsCommand {
    RequestsCommand::Decide {
        id: id.to_string(),
        level,
        decision: Decision::Approve,
        approver: approver.to_string(),
        role,
        title: None,
    }
}

fn budget_usage(options: &LoadOptions, config_id: &str, amount: Option<Decimal>) -> Value {
    let result = orbit_cli::commands::budget::run(
        options,
        BudgetCommand::Usage { config_id: config_id.to_string(), amount },
    );
    assert_eq!(result.exit_code, 0, "{}", result.output);
    parse_payload(&result.output)
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

/// Runs against a fresh on-disk database so state survives between commands.
fn with_database(test_fn: impl FnOnce(&Path)) {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("orbit.db").display());
    with_env(&[("ORBIT_DATABASE_URL", url.as_str())], || test_fn(dir.path()));
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "ORBIT_DATABASE_URL",
        "ORBIT_DATABASE_MAX_CONNECTIONS",
        "ORBIT_DATABASE_TIMEOUT_SECS",
        "ORBIT_BUDGET_OVER_BUDGET_POLICY",
        "ORBIT_LOGGING_LEVEL",
        "ORBIT_LOGGING_FORMAT",
        "ORBIT_LOG_LEVEL",
        "ORBIT_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
