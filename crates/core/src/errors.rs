use thiserror::Error;

use crate::conversation::ConversationTransitionError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    ConversationTransition(#[from] ConversationTransitionError),
    #[error("invalid input: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

/// Coarse class of an interface failure; each edge maps it to its own status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterfaceErrorKind {
    BadRequest,
    NotFound,
    Unavailable,
    Internal,
}

/// Failure as shown to callers. `detail` is for logs only; callers get
/// [`InterfaceError::user_message`] plus the correlation id.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{kind:?} ({correlation_id}): {detail}")]
pub struct InterfaceError {
    pub kind: InterfaceErrorKind,
    pub detail: String,
    pub correlation_id: String,
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self.kind {
            InterfaceErrorKind::BadRequest => "The request is invalid. Check the fields and retry.",
            InterfaceErrorKind::NotFound => "The requested ticket or resource does not exist.",
            InterfaceErrorKind::Unavailable => {
                "Storage or an upstream service is unavailable. Retry shortly."
            }
            InterfaceErrorKind::Internal => "Deskpilot hit an internal error.",
        }
    }
}

impl ApplicationError {
    pub fn kind(&self) -> InterfaceErrorKind {
        match self {
            Self::Domain(_) => InterfaceErrorKind::BadRequest,
            Self::NotFound(_) => InterfaceErrorKind::NotFound,
            Self::Persistence(_) | Self::Integration(_) => InterfaceErrorKind::Unavailable,
            Self::Configuration(_) => InterfaceErrorKind::Internal,
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        InterfaceError {
            kind: self.kind(),
            detail: self.to_string(),
            correlation_id: correlation_id.into(),
        }
    }
}
