use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::approval::ApprovalRequestId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Submission,
    Decision,
    Budget,
    BulkUpload,
    Persistence,
}

impl AuditCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submission => "submission",
            Self::Decision => "decision",
            Self::Budget => "budget",
            Self::BulkUpload => "bulk_upload",
            Self::Persistence => "persistence",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Rejected,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Rejected => "rejected",
        }
    }
}

/// Who acted, on which request, under which correlation id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub request_id: Option<ApprovalRequestId>,
    pub correlation_id: String,
    pub actor: String,
}

impl AuditContext {
    pub fn new(
        request_id: Option<ApprovalRequestId>,
        correlation_id: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self { request_id, correlation_id: correlation_id.into(), actor: actor.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    #[serde(flatten)]
    pub context: AuditContext,
    pub event_type: String,
    pub category: AuditCategory,
    pub outcome: AuditOutcome,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn from_context(
        context: &AuditContext,
        event_type: impl Into<String>,
        category: AuditCategory,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            context: context.clone(),
            event_type: event_type.into(),
            category,
            outcome,
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

/// Keeps every event in memory; clones share the same buffer.
#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.with_events(|events| events.clone())
    }

    pub fn event_types(&self) -> Vec<String> {
        self.with_events(|events| events.iter().map(|event| event.event_type.clone()).collect())
    }

    fn with_events<T>(&self, read: impl FnOnce(&mut Vec<AuditEvent>) -> T) -> T {
        let mut guard = match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        read(&mut guard)
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        self.with_events(|events| events.push(event));
    }
}

#[cfg(test)]
mod tests {
    use super::{
        AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink,
    };
    use crate::domain::approval::ApprovalRequestId;

    fn context() -> AuditContext {
        AuditContext::new(Some(ApprovalRequestId("AR-2026-0042".to_owned())), "req-123", "Dana")
    }

    #[test]
    fn cloned_sinks_share_one_buffer() {
        let sink = InMemoryAuditSink::default();
        let handle = sink.clone();
        handle.emit(
            AuditEvent::from_context(
                &context(),
                "approval.decision_applied",
                AuditCategory::Decision,
                AuditOutcome::Success,
            )
            .with_metadata("level", "l2"),
        );

        let events = sink.events();
        assert_eq!(sink.event_types(), vec!["approval.decision_applied".to_string()]);
        assert_eq!(events[0].context, context());
        assert_eq!(events[0].metadata.get("level").map(String::as_str), Some("l2"));
    }

    #[test]
    fn serialized_event_flattens_the_context() {
        let event = AuditEvent::from_context(
            &context(),
            "approval.submit_rejected",
            AuditCategory::BulkUpload,
            AuditOutcome::Rejected,
        );

        let value = serde_json::to_value(&event).expect("event serializes");
        assert_eq!(value["correlation_id"], "req-123");
        assert_eq!(value["actor"], "Dana");
        assert_eq!(value["category"], AuditCategory::BulkUpload.as_str());
        assert_eq!(value["outcome"], "rejected");
        assert!(!event.event_id.is_empty());
    }
}
