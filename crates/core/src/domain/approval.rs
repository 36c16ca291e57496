use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::budget::BudgetConfigId;
use crate::domain::line_item::LineItem;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalRequestId(pub String);

/// One rung of the fixed approval ladder, in precedence order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelId {
    L1,
    L2,
    L3,
    Payroll,
}

impl LevelId {
    pub const ORDER: [LevelId; 4] = [LevelId::L1, LevelId::L2, LevelId::L3, LevelId::Payroll];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::L1 => "l1",
            Self::L2 => "l2",
            Self::L3 => "l3",
            Self::Payroll => "payroll",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "l1" => Some(Self::L1),
            "l2" => Some(Self::L2),
            "l3" => Some(Self::L3),
            "payroll" => Some(Self::Payroll),
            _ => None,
        }
    }

    pub fn position(self) -> usize {
        match self {
            Self::L1 => 0,
            Self::L2 => 1,
            Self::L3 => 2,
            Self::Payroll => 3,
        }
    }

    pub fn approver_role(self) -> Role {
        match self {
            Self::L1 => Role::L1,
            Self::L2 => Role::L2,
            Self::L3 => Role::L3,
            Self::Payroll => Role::Payroll,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelStatus {
    NotReached,
    Pending,
    Approved,
    Rejected,
}

impl LevelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotReached => "not_reached",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "not_reached" => Some(Self::NotReached),
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Employee,
    L1,
    L2,
    L3,
    Payroll,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Employee => "employee",
            Self::L1 => "l1",
            Self::L2 => "l2",
            Self::L3 => "l3",
            Self::Payroll => "payroll",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "employee" => Some(Self::Employee),
            "l1" => Some(Self::L1),
            "l2" => Some(Self::L2),
            "l3" => Some(Self::L3),
            "payroll" => Some(Self::Payroll),
            _ => None,
        }
    }

    /// The ladder level this role approves, if any.
    pub fn level(self) -> Option<LevelId> {
        match self {
            Self::Employee => None,
            Self::L1 => Some(LevelId::L1),
            Self::L2 => Some(LevelId::L2),
            Self::L3 => Some(LevelId::L3),
            Self::Payroll => Some(LevelId::Payroll),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproverIdentity {
    pub name: String,
    pub title: Option<String>,
    pub role: Role,
}

impl ApproverIdentity {
    pub fn new(name: impl Into<String>, role: Role) -> Self {
        Self { name: name.into(), title: None, role }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalLevel {
    pub level_id: LevelId,
    pub status: LevelStatus,
    pub approver_name: Option<String>,
    pub approver_title: Option<String>,
    /// When the level was approved or rejected.
    #[serde(default, alias = "approved_at")]
    pub decided_at: Option<DateTime<Utc>>,
    pub main_approver: Option<String>,
    pub backup_approver: Option<String>,
    #[serde(default)]
    pub is_self_request: bool,
}

impl ApprovalLevel {
    pub fn new(level_id: LevelId) -> Self {
        Self {
            level_id,
            status: LevelStatus::NotReached,
            approver_name: None,
            approver_title: None,
            decided_at: None,
            main_approver: None,
            backup_approver: None,
            is_self_request: false,
        }
    }

    pub fn with_approvers(mut self, main: Option<String>, backup: Option<String>) -> Self {
        self.main_approver = main;
        self.backup_approver = backup;
        self
    }

    /// Main and backup approvers carry equal authority. An unassigned level
    /// accepts anyone holding the level's role.
    pub fn is_assigned_to(&self, name: &str) -> bool {
        if self.main_approver.is_none() && self.backup_approver.is_none() {
            return true;
        }

        let name = name.trim();
        [&self.main_approver, &self.backup_approver]
            .into_iter()
            .flatten()
            .any(|assigned| assigned.trim().eq_ignore_ascii_case(name))
    }

    pub(crate) fn stamp(&mut self, approver: &ApproverIdentity, at: DateTime<Utc>) {
        self.approver_name = Some(approver.name.clone());
        self.approver_title = approver.title.clone();
        self.decided_at = Some(at);
    }
}

/// The four ladder levels, each present exactly once and stored in
/// precedence order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ApprovalLevel>", into = "Vec<ApprovalLevel>")]
pub struct StageLadder {
    levels: [ApprovalLevel; 4],
}

impl Default for StageLadder {
    fn default() -> Self {
        Self { levels: LevelId::ORDER.map(ApprovalLevel::new) }
    }
}

impl StageLadder {
    pub fn get(&self, level: LevelId) -> &ApprovalLevel {
        &self.levels[level.position()]
    }

    pub fn get_mut(&mut self, level: LevelId) -> &mut ApprovalLevel {
        &mut self.levels[level.position()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &ApprovalLevel> {
        self.levels.iter()
    }

    pub fn status(&self, level: LevelId) -> LevelStatus {
        self.get(level).status
    }

    pub fn with_status(mut self, level: LevelId, status: LevelStatus) -> Self {
        self.get_mut(level).status = status;
        self
    }

    /// Checks that statuses follow precedence order. Once a level is still
    /// waiting (not reached, pending or rejected), every later level must be
    /// unreached or self-approved at submission.
    pub fn check_progression(&self) -> Result<(), DomainError> {
        let mut waiting: Option<&ApprovalLevel> = None;

        for level in self.iter() {
            let Some(blocker) = waiting else {
                if level.status != LevelStatus::Approved {
                    waiting = Some(level);
                }
                continue;
            };

            let out_of_order = match level.status {
                LevelStatus::NotReached => false,
                LevelStatus::Approved => !level.is_self_request,
                LevelStatus::Pending | LevelStatus::Rejected => true,
            };
            if out_of_order {
                return Err(DomainError::InvariantViolation(format!(
                    "level `{}` is {} while earlier level `{}` is {}",
                    level.level_id.as_str(),
                    level.status.as_str(),
                    blocker.level_id.as_str(),
                    blocker.status.as_str()
                )));
            }
        }
        Ok(())
    }

    pub fn from_levels(levels: Vec<ApprovalLevel>) -> Result<Self, DomainError> {
        let mut slots: [Option<ApprovalLevel>; 4] = [None, None, None, None];

        for level in levels {
            let slot = &mut slots[level.level_id.position()];
            if slot.is_some() {
                return Err(DomainError::InvariantViolation(format!(
                    "approval level `{}` appears more than once",
                    level.level_id.as_str()
                )));
            }
            *slot = Some(level);
        }

        let missing: Vec<&str> = LevelId::ORDER
            .iter()
            .filter(|level| slots[level.position()].is_none())
            .map(|level| level.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(DomainError::InvariantViolation(format!(
                "approval ladder is missing levels: {}",
                missing.join(", ")
            )));
        }

        let [Some(l1), Some(l2), Some(l3), Some(payroll)] = slots else {
            return Err(DomainError::InvariantViolation(
                "approval ladder is incomplete".to_string(),
            ));
        };

        Ok(Self { levels: [l1, l2, l3, payroll] })
    }
}

impl TryFrom<Vec<ApprovalLevel>> for StageLadder {
    type Error = DomainError;

    fn try_from(levels: Vec<ApprovalLevel>) -> Result<Self, Self::Error> {
        Self::from_levels(levels)
    }
}

impl From<StageLadder> for Vec<ApprovalLevel> {
    fn from(ladder: StageLadder) -> Self {
        ladder.levels.into()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: ApprovalRequestId,
    pub budget_config_id: BudgetConfigId,
    pub title: String,
    pub description: String,
    pub requested_amount: Decimal,
    pub requested_by: String,
    pub requested_by_role: Role,
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub levels: StageLadder,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

#[cfg(test)]
mod tests {
    use super::{ApprovalLevel, LevelId, LevelStatus, Role, StageLadder};
    use crate::errors::DomainError;

    #[test]
    fn default_ladder_holds_all_levels_in_precedence_order() {
        let ladder = StageLadder::default();
        let order: Vec<LevelId> = ladder.iter().map(|level| level.level_id).collect();

        assert_eq!(order, LevelId::ORDER.to_vec());
        assert!(ladder.iter().all(|level| level.status == LevelStatus::NotReached));
    }

    #[test]
    fn ladder_from_unordered_levels_is_reordered() {
        let ladder = StageLadder::from_levels(vec![
            ApprovalLevel::new(LevelId::Payroll),
            ApprovalLevel::new(LevelId::L2),
            ApprovalLevel::new(LevelId::L1),
            ApprovalLevel::new(LevelId::L3),
        ])
        .expect("complete ladder");

        assert_eq!(ladder.iter().next().map(|level| level.level_id), Some(LevelId::L1));
        assert_eq!(ladder.get(LevelId::Payroll).level_id, LevelId::Payroll);
    }

    #[test]
    fn ladder_rejects_duplicate_and_missing_levels() {
        let duplicate = StageLadder::from_levels(vec![
            ApprovalLevel::new(LevelId::L1),
            ApprovalLevel::new(LevelId::L1),
            ApprovalLevel::new(LevelId::L3),
            ApprovalLevel::new(LevelId::Payroll),
        ])
        .expect_err("duplicate l1");
        assert!(
            matches!(duplicate, DomainError::InvariantViolation(ref msg) if msg.contains("l1"))
        );

        let missing = StageLadder::from_levels(vec![ApprovalLevel::new(LevelId::L1)])
            .expect_err("missing levels");
        assert!(
            matches!(
                missing,
                DomainError::InvariantViolation(ref msg) if msg.contains("l2, l3, payroll")
            )
        );
    }

    #[test]
    fn progression_allows_self_approval_past_the_waiting_level() {
        use LevelStatus::{Approved, NotReached, Pending, Rejected};

        let mut self_request = StageLadder::default()
            .with_status(LevelId::L1, Pending)
            .with_status(LevelId::L3, Approved);
        self_request.get_mut(LevelId::L3).is_self_request = true;
        assert_eq!(self_request.check_progression(), Ok(()));

        let rejected_at_l2 = StageLadder::default()
            .with_status(LevelId::L1, Approved)
            .with_status(LevelId::L2, Rejected);
        assert_eq!(rejected_at_l2.check_progression(), Ok(()));
        assert_eq!(StageLadder::default().check_progression(), Ok(()));

        for (l2, l3) in [(Pending, Pending), (Rejected, Approved), (NotReached, Pending)] {
            let ladder = StageLadder::default()
                .with_status(LevelId::L1, Approved)
                .with_status(LevelId::L2, l2)
                .with_status(LevelId::L3, l3);
            let error = ladder.check_progression().expect_err("out of order");
            assert!(
                matches!(error, DomainError::InvariantViolation(ref msg) if msg.contains("`l3`")),
                "{l2:?} then {l3:?}"
            );
        }
    }

    #[test]
    fn ladder_serializes_as_level_list() {
        let ladder = StageLadder::default().with_status(LevelId::L1, LevelStatus::Pending);
        let json = serde_json::to_value(&ladder).expect("serialize");

        assert_eq!(json[0]["level_id"], "l1");
        assert_eq!(json[0]["status"], "pending");
        assert_eq!(json[3]["level_id"], "payroll");

        let decoded: StageLadder = serde_json::from_value(json).expect("deserialize");
        assert_eq!(decoded, ladder);
    }

    #[test]
    fn backup_approver_is_equally_assigned() {
        let level = ApprovalLevel::new(LevelId::L2)
            .with_approvers(Some("Dana Reyes".to_string()), Some("Sam Okafor".to_string()));

        assert!(level.is_assigned_to("dana reyes"));
        assert!(level.is_assigned_to("Sam Okafor"));
        assert!(!level.is_assigned_to("Lee Park"));
        assert!(ApprovalLevel::new(LevelId::L3).is_assigned_to("anyone"));
    }

    #[test]
    fn roles_map_to_their_own_level() {
        assert_eq!(Role::Employee.level(), None);
        for level in LevelId::ORDER {
            assert_eq!(level.approver_role().level(), Some(level));
            assert_eq!(LevelId::parse(level.as_str()), Some(level));
        }
        assert_eq!(Role::parse(" Payroll "), Some(Role::Payroll));
    }
}
