use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::approval::{
    ApprovalRequest, ApprovalRequestId, LevelId, LevelStatus, Role, StageLadder,
};
use crate::domain::budget::BudgetConfigId;
use crate::errors::DomainError;
use crate::workflow::resolver::{current_stage, Stage};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelAssignment {
    pub level: LevelId,
    pub main_approver: Option<String>,
    pub backup_approver: Option<String>,
}

/// Form input for a new approval request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewApprovalRequest {
    pub budget_config_id: BudgetConfigId,
    pub title: String,
    pub description: String,
    pub requested_amount: Option<Decimal>,
    pub requested_by: String,
    pub requested_by_role: Role,
    #[serde(default)]
    pub assignments: Vec<LevelAssignment>,
}

pub fn create_draft(
    input: NewApprovalRequest,
    id: ApprovalRequestId,
    created_at: DateTime<Utc>,
) -> Result<ApprovalRequest, DomainError> {
    let Some(requested_amount) = input.requested_amount else {
        return Err(DomainError::MissingRequiredFields {
            missing_fields: vec!["requested_amount".to_string()],
        });
    };
    if requested_amount < Decimal::ZERO {
        return Err(DomainError::Validation("requested_amount must be >= 0".to_string()));
    }
    if input.requested_by.trim().is_empty() {
        return Err(DomainError::MissingRequiredFields {
            missing_fields: vec!["requested_by".to_string()],
        });
    }

    let mut levels = StageLadder::default();
    for assignment in input.assignments {
        let level = levels.get_mut(assignment.level);
        level.main_approver = assignment.main_approver;
        level.backup_approver = assignment.backup_approver;
    }

    Ok(ApprovalRequest {
        id,
        budget_config_id: input.budget_config_id,
        title: input.title,
        description: input.description,
        requested_amount,
        requested_by: input.requested_by,
        requested_by_role: input.requested_by_role,
        submitted_at: None,
        created_at,
        levels,
        line_items: Vec::new(),
    })
}

pub fn missing_required_fields(request: &ApprovalRequest) -> Vec<String> {
    let mut missing = Vec::new();
    if request.title.trim().is_empty() {
        missing.push("title".to_string());
    }
    if request.description.trim().is_empty() {
        missing.push("description".to_string());
    }
    if request.requested_amount.is_zero() {
        missing.push("requested_amount".to_string());
    }
    missing
}

/// Moves a draft onto the ladder. A requester who holds the approver role
/// for a level has that level approved in their own name, once, here; the
/// first level still needing a decision becomes pending.
pub fn submit(
    request: &ApprovalRequest,
    submitted_at: DateTime<Utc>,
) -> Result<ApprovalRequest, DomainError> {
    let stage = current_stage(request);
    if stage != Stage::Draft || request.submitted_at.is_some() {
        return Err(DomainError::NotDraft { stage });
    }

    let missing_fields = missing_required_fields(request);
    if !missing_fields.is_empty() {
        return Err(DomainError::MissingRequiredFields { missing_fields });
    }

    let mut submitted = request.clone();
    if let Some(own_level) = submitted.requested_by_role.level() {
        let level = submitted.levels.get_mut(own_level);
        level.status = LevelStatus::Approved;
        level.is_self_request = true;
        level.approver_name = Some(submitted.requested_by.clone());
        level.approver_title = None;
        level.decided_at = Some(submitted_at);
    }

    if let Some(first_open) = LevelId::ORDER
        .into_iter()
        .find(|level| submitted.levels.status(*level) == LevelStatus::NotReached)
    {
        submitted.levels.get_mut(first_open).status = LevelStatus::Pending;
    }

    submitted.submitted_at = Some(submitted_at);
    Ok(submitted)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{create_draft, submit, LevelAssignment, NewApprovalRequest};
    use crate::domain::approval::{ApprovalRequestId, LevelId, LevelStatus, Role};
    use crate::domain::budget::BudgetConfigId;
    use crate::errors::DomainError;
    use crate::workflow::resolver::{current_stage, status_label, Stage};

    fn input(role: Role) -> NewApprovalRequest {
        NewApprovalRequest {
            budget_config_id: BudgetConfigId("BC-OVERTIME".to_string()),
            title: "Holiday overtime".to_string(),
            description: "Overtime for the December peak".to_string(),
            requested_amount: Some(Decimal::new(12_500, 0)),
            requested_by: "Marco Silva".to_string(),
            requested_by_role: role,
            assignments: vec![LevelAssignment {
                level: LevelId::L1,
                main_approver: Some("Dana Reyes".to_string()),
                backup_approver: Some("Sam Okafor".to_string()),
            }],
        }
    }

    fn draft(role: Role) -> crate::domain::approval::ApprovalRequest {
        create_draft(input(role), ApprovalRequestId("AR-1".to_string()), Utc::now())
            .expect("draft")
    }

    #[test]
    fn drafts_start_off_the_ladder_with_assignments() {
        let draft = draft(Role::Employee);

        assert_eq!(current_stage(&draft), Stage::Draft);
        assert_eq!(draft.submitted_at, None);
        assert_eq!(draft.levels.get(LevelId::L1).backup_approver.as_deref(), Some("Sam Okafor"));
    }

    #[test]
    fn draft_requires_a_non_negative_amount() {
        let mut missing = input(Role::Employee);
        missing.requested_amount = None;
        let error = create_draft(missing, ApprovalRequestId("AR-2".to_string()), Utc::now())
            .expect_err("amount required");
        assert_eq!(
            error,
            DomainError::MissingRequiredFields {
                missing_fields: vec!["requested_amount".to_string()]
            }
        );

        let mut negative = input(Role::Employee);
        negative.requested_amount = Some(Decimal::new(-1, 0));
        assert!(matches!(
            create_draft(negative, ApprovalRequestId("AR-3".to_string()), Utc::now()),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn employee_submission_lands_at_l1() {
        let submitted = submit(&draft(Role::Employee), Utc::now()).expect("submit");

        assert_eq!(status_label(&submitted), "pending_l1");
        assert!(submitted.submitted_at.is_some());
        assert!(submitted.levels.iter().all(|level| !level.is_self_request));
    }

    #[test]
    fn l1_self_request_is_auto_approved_and_lands_at_l2() {
        let submitted_at = Utc::now();
        let submitted = submit(&draft(Role::L1), submitted_at).expect("submit");

        let l1 = submitted.levels.get(LevelId::L1);
        assert_eq!(l1.status, LevelStatus::Approved);
        assert!(l1.is_self_request);
        assert_eq!(l1.approver_name.as_deref(), Some("Marco Silva"));
        assert_eq!(l1.decided_at, Some(submitted_at));
        assert_eq!(current_stage(&submitted), Stage::L2);
    }

    #[test]
    fn l3_self_request_keeps_l1_first() {
        let submitted = submit(&draft(Role::L3), Utc::now()).expect("submit");

        assert_eq!(current_stage(&submitted), Stage::L1);
        assert_eq!(submitted.levels.status(LevelId::L3), LevelStatus::Approved);
        assert_eq!(submitted.levels.status(LevelId::L2), LevelStatus::NotReached);
    }

    #[test]
    fn submission_validates_required_fields() {
        let mut draft = draft(Role::Employee);
        draft.title = "  ".to_string();
        draft.description = String::new();

        let error = submit(&draft, Utc::now()).expect_err("missing fields");
        assert_eq!(
            error,
            DomainError::MissingRequiredFields {
                missing_fields: vec!["title".to_string(), "description".to_string()]
            }
        );
    }

    #[test]
    fn resubmitting_is_rejected() {
        let submitted = submit(&draft(Role::Employee), Utc::now()).expect("submit");

        let error = submit(&submitted, Utc::now()).expect_err("already submitted");
        assert_eq!(error, DomainError::NotDraft { stage: Stage::L1 });
    }
}
