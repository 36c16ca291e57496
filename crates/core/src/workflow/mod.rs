//! Stage ladder evaluation: where a request sits, who may act on it, and
//! how decisions and submissions move it along.

pub mod resolver;
pub mod submission;

pub use resolver::{
    apply_decision, apply_decision_with_audit, can_act_on, current_stage,
    is_ready_for_payroll_completion, stage_of, status_label, Decision, Stage,
};
pub use submission::{
    create_draft, missing_required_fields, submit, LevelAssignment, NewApprovalRequest,
};
