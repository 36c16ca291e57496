use thiserror::Error;

use crate::domain::approval::{LevelId, LevelStatus, Role};
use crate::workflow::Stage;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("validation failed: missing required fields {missing_fields:?}")]
    MissingRequiredFields { missing_fields: Vec<String> },
    #[error(
        "invalid transition: cannot decide level {level:?} (status {status:?}) \
         while request is at stage {stage:?}"
    )]
    InvalidTransition { level: LevelId, status: LevelStatus, stage: Stage },
    #[error("request cannot be submitted from stage {stage:?}")]
    NotDraft { stage: Stage },
    #[error("`{actor}` ({role:?}) is not authorized to act on level {level:?}")]
    NotAuthorized { actor: String, role: Role, level: LevelId },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
    #[error("approval request `{0}` already exists")]
    DuplicateRequest(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("network failure: {0}")]
    Network(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested record does not exist.",
            Self::Conflict { .. } => {
                "The approval request changed since it was loaded. Refresh and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    /// Stale ladder states surface as conflicts; other domain failures are
    /// the caller's input.
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let message = match &self {
            Self::Persistence(message) | Self::Network(message) | Self::Configuration(message) => {
                message.clone()
            }
            other => other.to_string(),
        };

        match self {
            Self::Domain(
                DomainError::InvalidTransition { .. }
                | DomainError::NotDraft { .. }
                | DomainError::DuplicateRequest(_),
            ) => InterfaceError::Conflict { message, correlation_id },
            Self::Domain(_) => InterfaceError::BadRequest { message, correlation_id },
            Self::NotFound { .. } => InterfaceError::NotFound { message, correlation_id },
            Self::Persistence(_) | Self::Network(_) => {
                InterfaceError::ServiceUnavailable { message, correlation_id }
            }
            Self::Configuration(_) => InterfaceError::Internal { message, correlation_id },
        }
    }
}
