use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;

use orbit_core::domain::approval::{
    ApprovalLevel, ApprovalRequest, ApprovalRequestId, LevelId, LevelStatus, Role, StageLadder,
};
use orbit_core::domain::budget::{BudgetConfigId, BudgetConfiguration};
use orbit_core::domain::line_item::{LineItem, RowStatus};
use orbit_core::workflow::{current_stage, Stage};

use super::budget::write_budget;
use super::{
    ApprovalRequestFilter, ApprovalRequestPage, ApprovalRequestRepository, RepositoryError,
};
use crate::DbPool;

const REQUEST_COLUMNS: &str = "id, budget_config_id, title, description, requested_amount,
    requested_by, requested_by_role, submitted_at, created_at";

pub struct SqlApprovalRequestRepository {
    pool: DbPool,
}

impl SqlApprovalRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn hydrate(&self, row: &SqliteRow) -> Result<ApprovalRequest, RepositoryError> {
        let id: String = get(row, "id")?;

        let level_rows = sqlx::query(
            "SELECT level_id, status, approver_name, approver_title, decided_at,
                    main_approver, backup_approver, is_self_request
             FROM approval_level WHERE request_id = ? ORDER BY position",
        )
        .bind(&id)
        .fetch_all(&self.pool)
        .await?;
        let levels = level_rows.iter().map(row_to_level).collect::<Result<Vec<_>, _>>()?;
        let levels =
            StageLadder::from_levels(levels).map_err(|e| RepositoryError::Decode(e.to_string()))?;

        let item_rows = sqlx::query(
            "SELECT row_number, employee_id, employee_name, amount, note,
                    errors_json, warnings_json, status
             FROM approval_line_item WHERE request_id = ? ORDER BY row_number",
        )
        .bind(&id)
        .fetch_all(&self.pool)
        .await?;
        let line_items = item_rows.iter().map(row_to_line_item).collect::<Result<Vec<_>, _>>()?;

        let role: String = get(row, "requested_by_role")?;
        let amount: String = get(row, "requested_amount")?;
        let submitted_at: Option<String> = get(row, "submitted_at")?;
        let created_at: String = get(row, "created_at")?;

        Ok(ApprovalRequest {
            id: ApprovalRequestId(id),
            budget_config_id: BudgetConfigId(get(row, "budget_config_id")?),
            title: get(row, "title")?,
            description: get(row, "description")?,
            requested_amount: parse_decimal("requested_amount", &amount)?,
            requested_by: get(row, "requested_by")?,
            requested_by_role: Role::parse(&role)
                .ok_or_else(|| RepositoryError::Decode(format!("unknown role `{role}`")))?,
            submitted_at: submitted_at.as_deref().map(parse_timestamp).transpose()?,
            created_at: parse_timestamp(&created_at)?,
            levels,
            line_items,
        })
    }

    async fn hydrate_all(
        &self,
        rows: Vec<SqliteRow>,
    ) -> Result<Vec<ApprovalRequest>, RepositoryError> {
        let mut requests = Vec::with_capacity(rows.len());
        for row in &rows {
            requests.push(self.hydrate(row).await?);
        }
        Ok(requests)
    }
}

pub(crate) fn get<T>(row: &SqliteRow, column: &str) -> Result<T, RepositoryError>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))
}

pub(crate) fn parse_decimal(column: &str, raw: &str) -> Result<Decimal, RepositoryError> {
    raw.parse::<Decimal>()
        .map_err(|e| RepositoryError::Decode(format!("{column} `{raw}` is not a decimal: {e}")))
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("timestamp `{raw}`: {e}")))
}

fn row_to_level(row: &SqliteRow) -> Result<ApprovalLevel, RepositoryError> {
    let level_id: String = get(row, "level_id")?;
    let status: String = get(row, "status")?;
    let decided_at: Option<String> = get(row, "decided_at")?;

    Ok(ApprovalLevel {
        level_id: LevelId::parse(&level_id)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown level `{level_id}`")))?,
        status: LevelStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown level status `{status}`")))?,
        approver_name: get(row, "approver_name")?,
        approver_title: get(row, "approver_title")?,
        decided_at: decided_at.as_deref().map(parse_timestamp).transpose()?,
        main_approver: get(row, "main_approver")?,
        backup_approver: get(row, "backup_approver")?,
        is_self_request: get::<i64>(row, "is_self_request")? != 0,
    })
}

fn row_to_line_item(row: &SqliteRow) -> Result<LineItem, RepositoryError> {
    let row_number: i64 = get(row, "row_number")?;
    let status: String = get(row, "status")?;
    let errors: String = get(row, "errors_json")?;
    let warnings: String = get(row, "warnings_json")?;

    Ok(LineItem {
        row_number: u32::try_from(row_number).map_err(|_| {
            RepositoryError::Decode(format!("row number {row_number} out of range"))
        })?,
        employee_id: get(row, "employee_id")?,
        employee_name: get(row, "employee_name")?,
        amount: parse_decimal("amount", &get::<String>(row, "amount")?)?,
        note: get(row, "note")?,
        errors: serde_json::from_str(&errors).map_err(|e| RepositoryError::Decode(e.to_string()))?,
        warnings: serde_json::from_str(&warnings)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        status: RowStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown row status `{status}`")))?,
    })
}

fn encode_messages(messages: &[String]) -> Result<String, RepositoryError> {
    serde_json::to_string(messages).map_err(|e| RepositoryError::Decode(e.to_string()))
}

/// Request row plus its ladder and line items, replaced wholesale.
async fn write_request(
    conn: &mut SqliteConnection,
    request: &ApprovalRequest,
) -> Result<(), RepositoryError> {
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO approval_request (id, budget_config_id, title, description,
                                       requested_amount, requested_by, requested_by_role,
                                       status_label, submitted_at, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
             budget_config_id = excluded.budget_config_id,
             title = excluded.title,
             description = excluded.description,
             requested_amount = excluded.requested_amount,
             requested_by = excluded.requested_by,
             requested_by_role = excluded.requested_by_role,
             status_label = excluded.status_label,
             submitted_at = excluded.submitted_at,
             updated_at = excluded.updated_at",
    )
    .bind(&request.id.0)
    .bind(&request.budget_config_id.0)
    .bind(&request.title)
    .bind(&request.description)
    .bind(request.requested_amount.to_string())
    .bind(&request.requested_by)
    .bind(request.requested_by_role.as_str())
    .bind(current_stage(request).label())
    .bind(request.submitted_at.map(|dt| dt.to_rfc3339()))
    .bind(request.created_at.to_rfc3339())
    .bind(&now)
    .execute(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM approval_level WHERE request_id = ?")
        .bind(&request.id.0)
        .execute(&mut *conn)
        .await?;
    for level in request.levels.iter() {
        sqlx::query(
            "INSERT INTO approval_level (request_id, level_id, position, status,
                                         approver_name, approver_title, decided_at,
                                         main_approver, backup_approver, is_self_request)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(level.level_id.as_str())
        .bind(level.level_id.position() as i64)
        .bind(level.status.as_str())
        .bind(&level.approver_name)
        .bind(&level.approver_title)
        .bind(level.decided_at.map(|dt| dt.to_rfc3339()))
        .bind(&level.main_approver)
        .bind(&level.backup_approver)
        .bind(i64::from(level.is_self_request))
        .execute(&mut *conn)
        .await?;
    }

    sqlx::query("DELETE FROM approval_line_item WHERE request_id = ?")
        .bind(&request.id.0)
        .execute(&mut *conn)
        .await?;
    for item in &request.line_items {
        sqlx::query(
            "INSERT INTO approval_line_item (request_id, row_number, employee_id,
                                             employee_name, amount, note, errors_json,
                                             warnings_json, status)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(i64::from(item.row_number))
        .bind(&item.employee_id)
        .bind(&item.employee_name)
        .bind(item.amount.to_string())
        .bind(&item.note)
        .bind(encode_messages(&item.errors)?)
        .bind(encode_messages(&item.warnings)?)
        .bind(item.status.as_str())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[async_trait::async_trait]
impl ApprovalRequestRepository for SqlApprovalRequestRepository {
    async fn find_by_id(
        &self,
        id: &ApprovalRequestId,
    ) -> Result<Option<ApprovalRequest>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {REQUEST_COLUMNS} FROM approval_request WHERE id = ?"))
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(ref r) => Ok(Some(self.hydrate(r).await?)),
            None => Ok(None),
        }
    }

    async fn save(&self, request: ApprovalRequest) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        write_request(&mut tx, &request).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn save_completion(
        &self,
        request: ApprovalRequest,
        budget: BudgetConfiguration,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        write_request(&mut tx, &request).await?;
        write_budget(&mut tx, &budget).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list(
        &self,
        filter: &ApprovalRequestFilter,
    ) -> Result<ApprovalRequestPage, RepositoryError> {
        let budget_id = filter.budget_config_id.as_ref().map(|id| id.0.clone());
        let status_label = filter.stage.map(Stage::label);
        let requested_by = filter.requested_by.clone();
        let conditions = "(? IS NULL OR budget_config_id = ?)
             AND (? IS NULL OR status_label = ?)
             AND (? IS NULL OR LOWER(requested_by) = LOWER(?))";

        let total: i64 = sqlx::query(&format!(
            "SELECT COUNT(*) AS count FROM approval_request WHERE {conditions}"
        ))
        .bind(&budget_id)
        .bind(&budget_id)
        .bind(status_label)
        .bind(status_label)
        .bind(&requested_by)
        .bind(&requested_by)
        .fetch_one(&self.pool)
        .await?
        .try_get("count")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM approval_request WHERE {conditions}
             ORDER BY created_at DESC, id ASC
             LIMIT ? OFFSET ?"
        ))
        .bind(&budget_id)
        .bind(&budget_id)
        .bind(status_label)
        .bind(status_label)
        .bind(&requested_by)
        .bind(&requested_by)
        .bind(i64::from(filter.limit()))
        .bind(i64::from(filter.offset()))
        .fetch_all(&self.pool)
        .await?;

        Ok(ApprovalRequestPage {
            items: self.hydrate_all(rows).await?,
            total: u64::try_from(total).unwrap_or_default(),
            page: filter.page.max(1),
            per_page: filter.limit(),
        })
    }

    async fn list_at_stage(&self, stage: Stage) -> Result<Vec<ApprovalRequest>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM approval_request
             WHERE status_label = ?
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(stage.label())
        .fetch_all(&self.pool)
        .await?;

        self.hydrate_all(rows).await
    }
}
