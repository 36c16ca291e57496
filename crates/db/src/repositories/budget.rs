use sqlx::sqlite::{SqliteConnection, SqliteRow};

use orbit_core::domain::budget::{BudgetConfigId, BudgetConfiguration};

use super::approval::{get, parse_decimal, parse_timestamp};
use super::{BudgetConfigurationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlBudgetConfigurationRepository {
    pool: DbPool,
}

impl SqlBudgetConfigurationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_config(row: &SqliteRow) -> Result<BudgetConfiguration, RepositoryError> {
    let total_limit: String = get(row, "total_limit")?;
    let used_amount: String = get(row, "used_amount")?;
    let updated_at: String = get(row, "updated_at")?;

    Ok(BudgetConfiguration {
        id: BudgetConfigId(get(row, "id")?),
        name: get(row, "name")?,
        department: get(row, "department")?,
        scope: get(row, "scope")?,
        total_limit: parse_decimal("total_limit", &total_limit)?,
        used_amount: parse_decimal("used_amount", &used_amount)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

pub(super) async fn write_budget(
    conn: &mut SqliteConnection,
    config: &BudgetConfiguration,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO budget_configuration (id, name, department, scope, total_limit,
                                           used_amount, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
             name = excluded.name,
             department = excluded.department,
             scope = excluded.scope,
             total_limit = excluded.total_limit,
             used_amount = excluded.used_amount,
             updated_at = excluded.updated_at",
    )
    .bind(&config.id.0)
    .bind(&config.name)
    .bind(&config.department)
    .bind(&config.scope)
    .bind(config.total_limit.to_string())
    .bind(config.used_amount.to_string())
    .bind(config.updated_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[async_trait::async_trait]
impl BudgetConfigurationRepository for SqlBudgetConfigurationRepository {
    async fn find_by_id(
        &self,
        id: &BudgetConfigId,
    ) -> Result<Option<BudgetConfiguration>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, department, scope, total_limit, used_amount, updated_at
             FROM budget_configuration WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_config).transpose()
    }

    async fn save(&self, config: BudgetConfiguration) -> Result<(), RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        write_budget(&mut conn, &config).await
    }

    async fn list(&self) -> Result<Vec<BudgetConfiguration>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, department, scope, total_limit, used_amount, updated_at
             FROM budget_configuration ORDER BY name ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_config).collect()
    }
}
