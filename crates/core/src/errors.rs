use thiserror::Error;

use crate::{domain::guardrail::ViolationCategory, flows::FlowTransitionError};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    FlowTransition(#[from] FlowTransitionError),
    #[error("session state corruption: {0}")]
    SessionStateCorruption(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Failures reported by an external collaborator (model, embedding index, ledger, verifier,
/// session store).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("{collaborator} unavailable: {message}")]
    Unavailable { collaborator: &'static str, message: String },
    #[error("{collaborator} timed out after {after_ms}ms")]
    Timeout { collaborator: &'static str, after_ms: u64 },
    #[error("{collaborator} returned an invalid response: {message}")]
    InvalidResponse { collaborator: &'static str, message: String },
    #[error("{collaborator} rejected the request: {message}")]
    Rejected { collaborator: &'static str, message: String },
}

impl CollaboratorError {
    pub fn collaborator(&self) -> &'static str {
        match self {
            Self::Unavailable { collaborator, .. }
            | Self::Timeout { collaborator, .. }
            | Self::InvalidResponse { collaborator, .. }
            | Self::Rejected { collaborator, .. } => collaborator,
        }
    }

    /// Rejections are answers, not outages; everything else may succeed on a second try.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }
}

/// Outcome taxonomy of one conversational turn.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TurnError {
    #[error("safety rejection ({})", category.as_str())]
    SafetyRejection { category: ViolationCategory },
    #[error("no grounding available for knowledge query")]
    NoGroundingAvailable,
    #[error("utterance does not fit expected slot `{expected}`")]
    FlowSlotMismatch { expected: &'static str },
    #[error("collaborator `{collaborator}` failed: {message}")]
    CollaboratorFailure { collaborator: &'static str, message: String },
    #[error("session state corruption: {0}")]
    SessionStateCorruption(String),
    #[error("turn timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
    #[error("another turn is in progress for this session")]
    SessionBusy,
}

impl TurnError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CollaboratorFailure { .. } | Self::Timeout { .. } | Self::SessionBusy)
    }

    pub fn failure_category(&self) -> &'static str {
        match self {
            Self::SafetyRejection { category } => category.as_str(),
            Self::NoGroundingAvailable => "no_grounding",
            Self::FlowSlotMismatch { .. } => "flow_slot_mismatch",
            Self::CollaboratorFailure { .. } => "collaborator_failure",
            Self::SessionStateCorruption(_) => "session_state_corruption",
            Self::Timeout { .. } => "timeout",
            Self::SessionBusy => "session_busy",
        }
    }
}

impl From<CollaboratorError> for TurnError {
    fn from(value: CollaboratorError) -> Self {
        match value {
            CollaboratorError::Timeout { after_ms, .. } => Self::Timeout { after_ms },
            other => Self::CollaboratorFailure {
                collaborator: other.collaborator(),
                message: other.to_string(),
            },
        }
    }
}

impl From<DomainError> for TurnError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::SessionStateCorruption(message) => Self::SessionStateCorruption(message),
            other => Self::SessionStateCorruption(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Turn(#[from] TurnError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("too many requests: {message}")]
    TooManyRequests { message: String, correlation_id: String },
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
            Self::TooManyRequests { .. } => {
                "Your previous message is still being handled. Please wait a moment."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TooManyRequests { .. } | Self::ServiceUnavailable { .. })
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::TooManyRequests { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::TooManyRequests { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = || "unassigned".to_owned();
        match value {
            ApplicationError::Domain(_) => Self::BadRequest {
                message: "domain validation failed".to_owned(),
                correlation_id: unassigned(),
            },
            ApplicationError::Turn(TurnError::SessionBusy) => Self::TooManyRequests {
                message: "session busy".to_owned(),
                correlation_id: unassigned(),
            },
            ApplicationError::Turn(error) if error.is_retryable() => Self::ServiceUnavailable {
                message: error.to_string(),
                correlation_id: unassigned(),
            },
            ApplicationError::Turn(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: unassigned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::guardrail::ViolationCategory;
    use crate::errors::{
        ApplicationError, CollaboratorError, DomainError, InterfaceError, TurnError,
    };

    #[test]
    fn domain_error_maps_to_bad_request_interface_error() {
        let interface = ApplicationError::from(DomainError::InvariantViolation(
            "non-positive amount".to_owned(),
        ))
        .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn session_busy_maps_to_too_many_requests() {
        let interface = ApplicationError::from(TurnError::SessionBusy).into_interface("req-2");
        assert!(matches!(interface, InterfaceError::TooManyRequests { .. }));
        assert!(interface.is_retryable());
        assert_eq!(interface.correlation_id(), "req-2");
    }

    #[test]
    fn persistence_error_maps_to_service_unavailable() {
        let interface = ApplicationError::Persistence("database lock timeout".to_owned())
            .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn user_messages_never_contain_internal_details() {
        let interface = ApplicationError::Configuration("invalid api key sk-123".to_owned())
            .into_interface("req-4");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert!(!interface.user_message().contains("sk-123"));
    }

    #[test]
    fn collaborator_timeouts_become_turn_timeouts() {
        let timeout: TurnError =
            CollaboratorError::Timeout { collaborator: "llm", after_ms: 500 }.into();
        assert_eq!(timeout, TurnError::Timeout { after_ms: 500 });
        assert!(timeout.is_retryable());

        let unavailable: TurnError = CollaboratorError::Unavailable {
            collaborator: "ledger",
            message: "connection refused".to_owned(),
        }
        .into();
        assert!(matches!(
            unavailable,
            TurnError::CollaboratorFailure { collaborator: "ledger", .. }
        ));
        assert!(!CollaboratorError::Rejected { collaborator: "ledger", message: String::new() }
            .is_transient());
    }

    #[test]
    fn safety_rejection_is_not_retryable() {
        let error = TurnError::SafetyRejection { category: ViolationCategory::Injection };
        assert!(!error.is_retryable());
        assert_eq!(error.failure_category(), "injection");
    }
}
