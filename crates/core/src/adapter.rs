//! The one place external record shapes are translated into canonical
//! domain values. Legacy field names are accepted here as serde aliases and
//! nowhere else.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::domain::approval::{
    ApprovalLevel, ApprovalRequest, ApprovalRequestId, LevelId, LevelStatus, Role, StageLadder,
};
use crate::domain::budget::{BudgetConfigId, BudgetConfiguration};
use crate::domain::line_item::LineItem;
use crate::errors::DomainError;

#[derive(Debug, Deserialize)]
pub struct RawApprovalRequest {
    #[serde(alias = "approval_request_id", alias = "request_id")]
    pub id: String,
    #[serde(alias = "budget_id", alias = "config_id")]
    pub budget_config_id: String,
    #[serde(default, alias = "request_title")]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(alias = "total_request_amount", alias = "amount", alias = "total_amount")]
    pub requested_amount: Decimal,
    #[serde(default, alias = "submitted_by", alias = "requester")]
    pub requested_by: String,
    #[serde(default, alias = "requester_role", alias = "role")]
    pub requested_by_role: Option<String>,
    #[serde(default, alias = "submitted_date")]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "approval_levels", alias = "approvals")]
    pub levels: RawLevels,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

/// Levels arrive either as a list or keyed by level id.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawLevels {
    List(Vec<RawLevel>),
    Keyed(BTreeMap<String, RawLevel>),
}

impl Default for RawLevels {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

#[derive(Debug, Deserialize)]
pub struct RawLevel {
    #[serde(default, alias = "level", alias = "id")]
    pub level_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "approver", alias = "approved_by")]
    pub approver_name: Option<String>,
    #[serde(default, alias = "title")]
    pub approver_title: Option<String>,
    #[serde(default, alias = "approved_at", alias = "approved_date", alias = "date")]
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub main_approver: Option<String>,
    #[serde(default)]
    pub backup_approver: Option<String>,
    #[serde(default, alias = "self_request")]
    pub is_self_request: bool,
}

#[derive(Debug, Deserialize)]
pub struct RawBudgetConfiguration {
    #[serde(alias = "budget_id", alias = "config_id")]
    pub id: String,
    #[serde(alias = "budget_name", alias = "config_name")]
    pub name: String,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default, alias = "budget_scope")]
    pub scope: Option<String>,
    #[serde(alias = "budget_limit", alias = "max_amount", alias = "limit")]
    pub total_limit: Decimal,
    #[serde(default, alias = "budget_used", alias = "spent", alias = "used")]
    pub used_amount: Decimal,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// List responses come bare or wrapped in a `data`/`items`/`results` field.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawList<T> {
    Bare(Vec<T>),
    Wrapped {
        #[serde(alias = "items", alias = "results")]
        data: Vec<T>,
    },
}

pub fn normalize_request(raw: RawApprovalRequest) -> Result<ApprovalRequest, DomainError> {
    let requested_by_role = match raw.requested_by_role.as_deref() {
        None => Role::Employee,
        Some(value) => Role::parse(value).ok_or_else(|| {
            DomainError::Validation(format!("unknown requester role `{value}`"))
        })?,
    };

    Ok(ApprovalRequest {
        id: ApprovalRequestId(raw.id),
        budget_config_id: BudgetConfigId(raw.budget_config_id),
        title: raw.title,
        description: raw.description,
        requested_amount: raw.requested_amount,
        requested_by: raw.requested_by,
        requested_by_role,
        submitted_at: raw.submitted_at,
        created_at: raw.created_at.or(raw.submitted_at).unwrap_or_else(Utc::now),
        levels: normalize_levels(raw.levels)?,
        line_items: raw.line_items,
    })
}

/// Limits and usage are never negative; exports that say otherwise are
/// refused rather than clamped.
pub fn normalize_budget(raw: RawBudgetConfiguration) -> Result<BudgetConfiguration, DomainError> {
    for (field, value) in [("total_limit", raw.total_limit), ("used_amount", raw.used_amount)] {
        if value < Decimal::ZERO {
            return Err(DomainError::Validation(format!(
                "budget `{}` has a negative {field} ({value})",
                raw.id
            )));
        }
    }

    Ok(BudgetConfiguration {
        id: BudgetConfigId(raw.id),
        name: raw.name,
        department: raw.department,
        scope: raw.scope,
        total_limit: raw.total_limit,
        used_amount: raw.used_amount,
        updated_at: raw.updated_at.unwrap_or_else(Utc::now),
    })
}

pub fn parse_request(json: &str) -> Result<ApprovalRequest, DomainError> {
    normalize_request(decode(json)?)
}

pub fn parse_requests(json: &str) -> Result<Vec<ApprovalRequest>, DomainError> {
    decode_list::<RawApprovalRequest>(json)?.into_iter().map(normalize_request).collect()
}

pub fn parse_budget(json: &str) -> Result<BudgetConfiguration, DomainError> {
    normalize_budget(decode(json)?)
}

pub fn parse_budgets(json: &str) -> Result<Vec<BudgetConfiguration>, DomainError> {
    decode_list::<RawBudgetConfiguration>(json)?.into_iter().map(normalize_budget).collect()
}

pub fn parse_line_items(json: &str) -> Result<Vec<LineItem>, DomainError> {
    decode_list(json)
}

fn normalize_levels(raw: RawLevels) -> Result<StageLadder, DomainError> {
    let entries: Vec<(Option<String>, RawLevel)> = match raw {
        RawLevels::List(levels) if levels.is_empty() => return Ok(StageLadder::default()),
        RawLevels::List(levels) => levels.into_iter().map(|level| (None, level)).collect(),
        RawLevels::Keyed(levels) => {
            levels.into_iter().map(|(key, level)| (Some(key), level)).collect()
        }
    };

    let levels = entries
        .into_iter()
        .map(|(key, raw)| normalize_level(key, raw))
        .collect::<Result<Vec<_>, _>>()?;
    let ladder = StageLadder::from_levels(levels)?;
    ladder.check_progression()?;
    Ok(ladder)
}

fn normalize_level(key: Option<String>, raw: RawLevel) -> Result<ApprovalLevel, DomainError> {
    let id_source = raw.level_id.or(key).unwrap_or_default();
    let level_id = LevelId::parse(&id_source)
        .ok_or_else(|| DomainError::Validation(format!("unknown approval level `{id_source}`")))?;

    let status = match raw.status.as_deref().map(str::trim) {
        None | Some("") => LevelStatus::NotReached,
        Some(value) => LevelStatus::parse(&value.replace(['-', ' '], "_")).ok_or_else(|| {
            DomainError::Validation(format!(
                "unknown status `{value}` for level `{}`",
                level_id.as_str()
            ))
        })?,
    };

    Ok(ApprovalLevel {
        level_id,
        status,
        approver_name: raw.approver_name,
        approver_title: raw.approver_title,
        decided_at: raw.decided_at,
        main_approver: raw.main_approver,
        backup_approver: raw.backup_approver,
        is_self_request: raw.is_self_request,
    })
}

fn decode<T>(json: &str) -> Result<T, DomainError>
where
    T: DeserializeOwned,
{
    serde_json::from_str(json)
        .map_err(|error| DomainError::Validation(format!("malformed record: {error}")))
}

fn decode_list<T>(json: &str) -> Result<Vec<T>, DomainError>
where
    T: DeserializeOwned,
{
    match decode::<RawList<T>>(json)? {
        RawList::Bare(items) | RawList::Wrapped { data: items } => Ok(items),
    }
}
