use sqlx::Executor;

use orbit_core::domain::approval::ApprovalRequestId;
use orbit_core::workflow::{current_stage, Stage};

use crate::connection::DbPool;
use crate::repositories::{ApprovalRequestRepository, RepositoryError, SqlApprovalRequestRepository};

/// One seeded request and the stage the resolver must report for it.
#[derive(Debug, Clone, Copy)]
struct SeedRequestContract {
    request_id: &'static str,
    budget_config_id: &'static str,
    stage: Stage,
    line_item_count: usize,
    description: &'static str,
}

const SEED_REQUESTS: &[SeedRequestContract] = &[
    SeedRequestContract {
        request_id: "AR-SEED-001",
        budget_config_id: "BC-OVERTIME",
        stage: Stage::Draft,
        line_item_count: 2,
        description: "Unsubmitted draft with two line items",
    },
    SeedRequestContract {
        request_id: "AR-SEED-002",
        budget_config_id: "BC-Q4-INCENTIVE",
        stage: Stage::L1,
        line_item_count: 0,
        description: "Employee request waiting on its L1 approver",
    },
    SeedRequestContract {
        request_id: "AR-SEED-003",
        budget_config_id: "BC-Q4-INCENTIVE",
        stage: Stage::L2,
        line_item_count: 0,
        description: "L1 manager self-request, L1 auto-approved",
    },
    SeedRequestContract {
        request_id: "AR-SEED-004",
        budget_config_id: "BC-OVERTIME",
        stage: Stage::Payroll,
        line_item_count: 0,
        description: "Manager levels approved, ready for payroll",
    },
    SeedRequestContract {
        request_id: "AR-SEED-005",
        budget_config_id: "BC-TRAINING",
        stage: Stage::Completed,
        line_item_count: 0,
        description: "Completed against an unlimited budget",
    },
    SeedRequestContract {
        request_id: "AR-SEED-006",
        budget_config_id: "BC-Q4-INCENTIVE",
        stage: Stage::Rejected,
        line_item_count: 0,
        description: "Rejected at L2",
    },
];

const SEED_BUDGET_IDS: &[&str] = &["BC-Q4-INCENTIVE", "BC-OVERTIME", "BC-TRAINING"];

/// Deterministic demo data: three budgets (high usage, low usage, unlimited)
/// and one request at every stage of the ladder.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/orbit_seed_data.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        tracing::info!(
            event_name = "db.seed.loaded",
            budgets = SEED_BUDGET_IDS.len(),
            requests = SEED_REQUESTS.len(),
            "demo dataset loaded"
        );

        Ok(SeedResult {
            budgets_seeded: SEED_BUDGET_IDS.len(),
            requests_seeded: SEED_REQUESTS
                .iter()
                .map(|seed| RequestSeedInfo {
                    request_id: seed.request_id,
                    stage: seed.stage.label(),
                    description: seed.description,
                })
                .collect(),
        })
    }

    /// Reloads every seeded request through the repository and checks that
    /// the resolved stage matches both the contract and the stored label.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for budget_id in SEED_BUDGET_IDS {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM budget_configuration WHERE id = ?1)",
            )
            .bind(budget_id)
            .fetch_one(pool)
            .await?;
            checks.push((*budget_id, exists == 1));
        }

        let repository = SqlApprovalRequestRepository::new(pool.clone());
        for seed in SEED_REQUESTS {
            let id = ApprovalRequestId(seed.request_id.to_string());
            let stored_label: Option<String> =
                sqlx::query_scalar("SELECT status_label FROM approval_request WHERE id = ?1")
                    .bind(seed.request_id)
                    .fetch_optional(pool)
                    .await?;

            let matches = match repository.find_by_id(&id).await? {
                Some(request) => {
                    current_stage(&request) == seed.stage
                        && stored_label.as_deref() == Some(seed.stage.label())
                        && request.budget_config_id.0 == seed.budget_config_id
                        && request.line_items.len() == seed.line_item_count
                }
                None => false,
            };
            checks.push((seed.request_id, matches));
        }

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM approval_request WHERE id LIKE 'AR-SEED-%'")
            .execute(&mut *tx)
            .await?;
        for budget_id in SEED_BUDGET_IDS {
            sqlx::query(
                "DELETE FROM budget_configuration WHERE id = ?1
                 AND NOT EXISTS (SELECT 1 FROM approval_request WHERE budget_config_id = ?1)",
            )
            .bind(budget_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub budgets_seeded: usize,
    pub requests_seeded: Vec<RequestSeedInfo>,
}

#[derive(Debug)]
pub struct RequestSeedInfo {
    pub request_id: &'static str,
    pub stage: &'static str,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
