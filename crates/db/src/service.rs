//! Persistence-backed approval workflow. Every operation loads the current
//! record, runs the pure evaluators from `orbit_core`, saves, and records an
//! audit event.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use orbit_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use orbit_core::budget::{
    evaluate_submission, projected_usage, usage_summary, BudgetCheck, BudgetUsage,
    OverBudgetPolicy, ProjectedUsage,
};
use orbit_core::bulk::{validate_line_items, BulkSummary, EmployeeDirectory};
use orbit_core::domain::approval::{
    ApprovalRequest, ApprovalRequestId, ApproverIdentity, LevelId, Role,
};
use orbit_core::domain::budget::{BudgetConfigId, BudgetConfiguration};
use orbit_core::domain::line_item::LineItem;
use orbit_core::errors::{ApplicationError, DomainError};
use orbit_core::workflow::{
    self, apply_decision_with_audit, can_act_on, current_stage, Decision, NewApprovalRequest,
    Stage,
};

use crate::repositories::{
    ApprovalRequestFilter, ApprovalRequestPage, ApprovalRequestRepository,
    BudgetConfigurationRepository, RepositoryError,
};

/// Failing to reach the database at all (pool timeout, socket errors) is a
/// transport fault; everything else the store reports is persistence.
impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        match &error {
            RepositoryError::Database(sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)) => {
                Self::Network(error.to_string())
            }
            _ => Self::Persistence(error.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SubmissionOutcome {
    pub request: ApprovalRequest,
    pub budget_check: BudgetCheck,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DecisionOutcome {
    pub request: ApprovalRequest,
    pub stage: Stage,
    /// Present when the decision completed the request and usage was booked.
    pub budget: Option<BudgetConfiguration>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LineItemOutcome {
    pub request: ApprovalRequest,
    pub summary: BulkSummary,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BudgetUsageReport {
    pub usage: BudgetUsage,
    pub projection: Option<ProjectedUsage>,
}

pub struct ApprovalWorkflow<R, B, S> {
    requests: R,
    budgets: B,
    audit: S,
    policy: OverBudgetPolicy,
}

impl<R, B, S> ApprovalWorkflow<R, B, S>
where
    R: ApprovalRequestRepository,
    B: BudgetConfigurationRepository,
    S: AuditSink,
{
    pub fn new(requests: R, budgets: B, audit: S, policy: OverBudgetPolicy) -> Self {
        Self { requests, budgets, audit, policy }
    }

    pub fn requests(&self) -> &R {
        &self.requests
    }

    pub fn budgets(&self) -> &B {
        &self.budgets
    }

    pub async fn create_draft(
        &self,
        input: NewApprovalRequest,
        correlation_id: &str,
    ) -> Result<ApprovalRequest, ApplicationError> {
        self.load_budget(&input.budget_config_id).await?;

        let id = ApprovalRequestId(format!("AR-{}", Uuid::new_v4().simple()));
        let draft = workflow::create_draft(input, id, Utc::now())?;
        self.requests.save(draft.clone()).await?;

        tracing::info!(
            event_name = "workflow.request.drafted",
            correlation_id,
            request_id = %draft.id.0,
            budget_config_id = %draft.budget_config_id.0,
            "approval request drafted"
        );
        self.audit.emit(
            AuditEvent::from_context(
                &self.context(&draft.id, correlation_id, &draft.requested_by),
                "approval.draft_created",
                AuditCategory::Submission,
                AuditOutcome::Success,
            )
            .with_metadata("requested_amount", draft.requested_amount.to_string()),
        );
        Ok(draft)
    }

    /// Stores a request normalized from an external export as-is, ladder
    /// included. The referenced budget must already exist and the id must
    /// be new; an import never replaces a stored request.
    pub async fn import(
        &self,
        request: ApprovalRequest,
        correlation_id: &str,
    ) -> Result<ApprovalRequest, ApplicationError> {
        request.levels.check_progression()?;
        self.load_budget(&request.budget_config_id).await?;
        if self.requests.find_by_id(&request.id).await?.is_some() {
            tracing::warn!(
                event_name = "workflow.request.import_conflict",
                correlation_id,
                request_id = %request.id.0,
                "approval request already exists"
            );
            return Err(DomainError::DuplicateRequest(request.id.0.clone()).into());
        }
        self.requests.save(request.clone()).await?;

        let stage = current_stage(&request);
        tracing::info!(
            event_name = "workflow.request.imported",
            correlation_id,
            request_id = %request.id.0,
            stage = stage.label(),
            "approval request imported"
        );
        self.audit.emit(
            AuditEvent::from_context(
                &self.context(&request.id, correlation_id, &request.requested_by),
                "approval.imported",
                AuditCategory::Persistence,
                AuditOutcome::Success,
            )
            .with_metadata("stage", stage.label()),
        );
        Ok(request)
    }

    pub async fn get(&self, id: &ApprovalRequestId) -> Result<ApprovalRequest, ApplicationError> {
        self.requests
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("approval request", id.0.clone()))
    }

    /// Runs the over-budget policy before moving the draft onto the ladder,
    /// so a blocked request stays a draft.
    pub async fn submit(
        &self,
        id: &ApprovalRequestId,
        correlation_id: &str,
    ) -> Result<SubmissionOutcome, ApplicationError> {
        let request = self.get(id).await?;
        let budget = self.load_budget(&request.budget_config_id).await?;
        let context = self.context(id, correlation_id, &request.requested_by);

        let budget_check = evaluate_submission(&budget, request.requested_amount, self.policy);
        let submitted = budget_check
            .clone()
            .into_result()
            .and_then(|_| workflow::submit(&request, Utc::now()));

        let submitted = match submitted {
            Ok(submitted) => submitted,
            Err(error) => {
                tracing::warn!(
                    event_name = "workflow.request.submit_rejected",
                    correlation_id,
                    request_id = %id.0,
                    error = %error,
                    "approval request submission rejected"
                );
                self.audit.emit(
                    AuditEvent::from_context(
                        &context,
                        "approval.submit_rejected",
                        AuditCategory::Submission,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
                return Err(error.into());
            }
        };

        self.requests.save(submitted.clone()).await?;

        let stage = current_stage(&submitted);
        tracing::info!(
            event_name = "workflow.request.submitted",
            correlation_id,
            request_id = %id.0,
            stage = stage.label(),
            budget_outcome = ?budget_check.outcome,
            "approval request submitted"
        );
        self.audit.emit(
            AuditEvent::from_context(
                &context,
                "approval.submitted",
                AuditCategory::Submission,
                AuditOutcome::Success,
            )
            .with_metadata("stage", stage.label())
            .with_metadata("after_percentage", budget_check.projection.after_percentage.to_string())
            .with_metadata("exceeds_budget", budget_check.projection.exceeds_budget.to_string()),
        );

        Ok(SubmissionOutcome { request: submitted, budget_check })
    }

    /// The approver must hold the level's role and, when the level has
    /// named approvers, be the main or the backup.
    pub async fn decide(
        &self,
        id: &ApprovalRequestId,
        level: LevelId,
        decision: Decision,
        approver: &ApproverIdentity,
        correlation_id: &str,
    ) -> Result<DecisionOutcome, ApplicationError> {
        let request = self.get(id).await?;
        let context = self.context(id, correlation_id, &approver.name);

        if let Err(error) = authorize(&request, level, approver) {
            tracing::warn!(
                event_name = "workflow.decision.unauthorized",
                correlation_id,
                request_id = %id.0,
                level = level.as_str(),
                actor = %approver.name,
                "approver is not authorized for this level"
            );
            self.audit.emit(
                AuditEvent::from_context(
                    &context,
                    "approval.decision_unauthorized",
                    AuditCategory::Decision,
                    AuditOutcome::Rejected,
                )
                .with_metadata("level", level.as_str())
                .with_metadata("role", approver.role.as_str()),
            );
            return Err(error.into());
        }

        let updated = apply_decision_with_audit(
            &request,
            level,
            decision,
            approver,
            Utc::now(),
            &self.audit,
            &context,
        )?;
        let stage = current_stage(&updated);

        let budget = if stage == Stage::Completed {
            let mut budget = self.load_budget(&updated.budget_config_id).await?;
            budget.record_usage(updated.requested_amount.max(Decimal::ZERO))?;
            self.requests.save_completion(updated.clone(), budget.clone()).await?;
            self.audit.emit(
                AuditEvent::from_context(
                    &context,
                    "budget.usage_recorded",
                    AuditCategory::Budget,
                    AuditOutcome::Success,
                )
                .with_metadata("budget_config_id", budget.id.0.clone())
                .with_metadata("used_amount", budget.used_amount.to_string()),
            );
            Some(budget)
        } else {
            self.requests.save(updated.clone()).await?;
            None
        };

        tracing::info!(
            event_name = "workflow.decision.applied",
            correlation_id,
            request_id = %id.0,
            level = level.as_str(),
            decision = decision.as_str(),
            stage = stage.label(),
            "approval decision applied"
        );
        Ok(DecisionOutcome { request: updated, stage, budget })
    }

    /// Payroll's final approval. Only valid once l1, l2, and l3 are all
    /// approved.
    pub async fn complete_payment(
        &self,
        id: &ApprovalRequestId,
        approver: &ApproverIdentity,
        correlation_id: &str,
    ) -> Result<DecisionOutcome, ApplicationError> {
        self.decide(id, LevelId::Payroll, Decision::Approve, approver, correlation_id).await
    }

    pub async fn attach_line_items<D>(
        &self,
        id: &ApprovalRequestId,
        mut items: Vec<LineItem>,
        directory: &D,
        correlation_id: &str,
    ) -> Result<LineItemOutcome, ApplicationError>
    where
        D: EmployeeDirectory + Sync + ?Sized,
    {
        let mut request = self.get(id).await?;
        let stage = current_stage(&request);
        if stage != Stage::Draft {
            return Err(DomainError::NotDraft { stage }.into());
        }

        let summary = validate_line_items(&mut items, directory);
        request.line_items = items;
        self.requests.save(request.clone()).await?;

        tracing::info!(
            event_name = "workflow.line_items.attached",
            correlation_id,
            request_id = %id.0,
            total = summary.total,
            invalid = summary.invalid,
            "line items validated and attached"
        );
        self.audit.emit(
            AuditEvent::from_context(
                &self.context(id, correlation_id, &request.requested_by),
                "bulk.line_items_attached",
                AuditCategory::BulkUpload,
                if summary.can_submit() { AuditOutcome::Success } else { AuditOutcome::Rejected },
            )
            .with_metadata("total", summary.total.to_string())
            .with_metadata("invalid", summary.invalid.to_string()),
        );

        Ok(LineItemOutcome { request, summary })
    }

    pub async fn list(
        &self,
        filter: &ApprovalRequestFilter,
    ) -> Result<ApprovalRequestPage, ApplicationError> {
        Ok(self.requests.list(filter).await?)
    }

    /// Requests waiting on `role` right now. Payroll only sees requests whose
    /// three manager levels are all approved.
    pub async fn pending_for(&self, role: Role) -> Result<Vec<ApprovalRequest>, ApplicationError> {
        let Some(level) = role.level() else {
            return Ok(Vec::new());
        };

        let at_stage = self.requests.list_at_stage(Stage::from(level)).await?;
        Ok(at_stage.into_iter().filter(|request| can_act_on(request, role)).collect())
    }

    pub async fn budget_usage(
        &self,
        config_id: &BudgetConfigId,
        requested_amount: Option<Decimal>,
    ) -> Result<BudgetUsageReport, ApplicationError> {
        let config = self.load_budget(config_id).await?;
        Ok(BudgetUsageReport {
            usage: usage_summary(&config),
            projection: requested_amount.map(|amount| projected_usage(&config, amount)),
        })
    }

    async fn load_budget(
        &self,
        id: &BudgetConfigId,
    ) -> Result<BudgetConfiguration, ApplicationError> {
        self.budgets
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("budget configuration", id.0.clone()))
    }

    fn context(&self, id: &ApprovalRequestId, correlation_id: &str, actor: &str) -> AuditContext {
        AuditContext::new(Some(id.clone()), correlation_id, actor)
    }
}

fn authorize(
    request: &ApprovalRequest,
    level: LevelId,
    approver: &ApproverIdentity,
) -> Result<(), DomainError> {
    let holds_role = approver.role.level() == Some(level);
    let assigned = request.levels.get(level).is_assigned_to(&approver.name);
    if holds_role && assigned {
        return Ok(());
    }

    Err(DomainError::NotAuthorized { actor: approver.name.clone(), role: approver.role, level })
}
