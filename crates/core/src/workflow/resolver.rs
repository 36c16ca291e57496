use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::approval::{
    ApprovalRequest, ApproverIdentity, LevelId, LevelStatus, Role, StageLadder,
};
use crate::errors::DomainError;

/// Where a request sits on the approval ladder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Draft,
    L1,
    L2,
    L3,
    Payroll,
    Completed,
    Rejected,
}

impl Stage {
    pub fn level(self) -> Option<LevelId> {
        match self {
            Self::L1 => Some(LevelId::L1),
            Self::L2 => Some(LevelId::L2),
            Self::L3 => Some(LevelId::L3),
            Self::Payroll => Some(LevelId::Payroll),
            Self::Draft | Self::Completed | Self::Rejected => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Rejected)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::L1 => "pending_l1",
            Self::L2 => "pending_l2",
            Self::L3 => "pending_l3",
            Self::Payroll => "pending_payroll",
            Self::Completed => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "pending_l1" => Some(Self::L1),
            "pending_l2" => Some(Self::L2),
            "pending_l3" => Some(Self::L3),
            "pending_payroll" => Some(Self::Payroll),
            "approved" | "completed" => Some(Self::Completed),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl From<LevelId> for Stage {
    fn from(level: LevelId) -> Self {
        match level {
            LevelId::L1 => Self::L1,
            LevelId::L2 => Self::L2,
            LevelId::L3 => Self::L3,
            LevelId::Payroll => Self::Payroll,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approve" | "approved" => Some(Self::Approve),
            "reject" | "rejected" => Some(Self::Reject),
            _ => None,
        }
    }
}

pub fn current_stage(request: &ApprovalRequest) -> Stage {
    stage_of(&request.levels)
}

/// A rejection anywhere ends the workflow, whatever the other levels say.
pub fn stage_of(ladder: &StageLadder) -> Stage {
    if ladder.iter().any(|level| level.status == LevelStatus::Rejected) {
        return Stage::Rejected;
    }

    if let Some(pending) = ladder.iter().find(|level| level.status == LevelStatus::Pending) {
        return Stage::from(pending.level_id);
    }

    if ladder.status(LevelId::Payroll) == LevelStatus::Approved {
        Stage::Completed
    } else {
        Stage::Draft
    }
}

pub fn status_label(request: &ApprovalRequest) -> &'static str {
    current_stage(request).label()
}

pub fn is_ready_for_payroll_completion(request: &ApprovalRequest) -> bool {
    let l1 = request.levels.status(LevelId::L1) == LevelStatus::Approved;
    let l2 = request.levels.status(LevelId::L2) == LevelStatus::Approved;
    let l3 = request.levels.status(LevelId::L3) == LevelStatus::Approved;
    l1 & l2 & l3
}

pub fn can_act_on(request: &ApprovalRequest, role: Role) -> bool {
    let Some(level) = role.level() else {
        return false;
    };

    if current_stage(request) != Stage::from(level) {
        return false;
    }

    level != LevelId::Payroll || is_ready_for_payroll_completion(request)
}

/// Applies one approver's decision to the level currently awaiting it and
/// returns the updated request. Approving a level hands the request to the
/// next level that has not been reached yet.
pub fn apply_decision(
    request: &ApprovalRequest,
    level: LevelId,
    decision: Decision,
    approver: &ApproverIdentity,
    decided_at: DateTime<Utc>,
) -> Result<ApprovalRequest, DomainError> {
    let stage = current_stage(request);
    let status = request.levels.status(level);

    if stage.level() != Some(level) || status != LevelStatus::Pending {
        return Err(DomainError::InvalidTransition { level, status, stage });
    }

    if level == LevelId::Payroll && !is_ready_for_payroll_completion(request) {
        return Err(DomainError::InvalidTransition { level, status, stage });
    }

    let mut updated = request.clone();
    let target = updated.levels.get_mut(level);
    match decision {
        Decision::Approve => {
            target.status = LevelStatus::Approved;
            target.stamp(approver, decided_at);
            activate_next_level(&mut updated.levels, level);
        }
        Decision::Reject => {
            target.status = LevelStatus::Rejected;
            target.stamp(approver, decided_at);
        }
    }

    Ok(updated)
}

pub fn apply_decision_with_audit<S>(
    request: &ApprovalRequest,
    level: LevelId,
    decision: Decision,
    approver: &ApproverIdentity,
    decided_at: DateTime<Utc>,
    sink: &S,
    audit: &AuditContext,
) -> Result<ApprovalRequest, DomainError>
where
    S: AuditSink + ?Sized,
{
    let result = apply_decision(request, level, decision, approver, decided_at);
    let event = match &result {
        Ok(updated) => AuditEvent::from_context(
            audit,
            "approval.decision_applied",
            AuditCategory::Decision,
            AuditOutcome::Success,
        )
        .with_metadata("to_stage", current_stage(updated).label()),
        Err(error) => AuditEvent::from_context(
            audit,
            "approval.decision_rejected",
            AuditCategory::Decision,
            AuditOutcome::Rejected,
        )
        .with_metadata("error", error.to_string()),
    };

    sink.emit(
        event
            .with_metadata("level", level.as_str())
            .with_metadata("decision", decision.as_str())
            .with_metadata("from_stage", current_stage(request).label()),
    );
    result
}

/// Moves the first unreached level after `from` into `pending`. Levels
/// that were approved at submission (self-requests) are skipped.
pub(crate) fn activate_next_level(ladder: &mut StageLadder, from: LevelId) {
    let next = LevelId::ORDER
        .into_iter()
        .skip(from.position() + 1)
        .find(|level| ladder.status(*level) != LevelStatus::Approved);

    if let Some(next) = next {
        let level = ladder.get_mut(next);
        if level.status == LevelStatus::NotReached {
            level.status = LevelStatus::Pending;
        }
    }
}
