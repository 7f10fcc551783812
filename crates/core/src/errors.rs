use thiserror::Error;

use crate::dialogue::{ConfirmationError, ResponseError};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Confirmation(#[from] ConfirmationError),
    #[error(transparent)]
    Response(#[from] ResponseError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Failure surfaced at the turn boundary. The turn loop turns every variant
/// into a spoken fallback reply; only configuration problems stop a session
/// before it starts.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure ({collaborator}): {message}")]
    Integration { collaborator: &'static str, message: String },
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    pub fn integration(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self::Integration { collaborator, message: message.into() }
    }

    /// Stable label used in structured logs.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Domain(DomainError::Confirmation(_)) => "invalid_confirmation_state",
            Self::Domain(DomainError::Response(_)) => "response_catalog",
            Self::Domain(DomainError::InvariantViolation(_)) => "invariant_violation",
            Self::Persistence(_) => "persistence",
            Self::Integration { .. } => "integration",
            Self::Configuration(_) => "configuration",
        }
    }

    /// Whether the conversation can carry on after this error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Configuration(_))
    }
}

impl From<ConfirmationError> for ApplicationError {
    fn from(value: ConfirmationError) -> Self {
        Self::Domain(DomainError::Confirmation(value))
    }
}

impl From<ResponseError> for ApplicationError {
    fn from(value: ResponseError) -> Self {
        Self::Domain(DomainError::Response(value))
    }
}
