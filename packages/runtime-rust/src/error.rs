//! Error taxonomy surfaced to callers of the runtime.
//!
//! Transports map [`ErrorKind`] to their own status codes; the runtime never
//! encodes errors itself.

use courier_core::ValidationErrors;

/// Errors returned by pipeline runs and the capture store.
#[derive(Debug, thiserror::Error)]
pub enum CourierError {
    #[error("no handler registered for request {request}")]
    NoHandler { request: &'static str },
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("request requires an authenticated principal")]
    Unauthenticated,
    #[error("forbidden: {reason}")]
    Forbidden { reason: String },
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("too many concurrent requests, try again later")]
    Overloaded,
    #[error("request cancelled")]
    Cancelled,
    #[error("event raised outside of an active capture slot")]
    CaptureInactive,
    #[error("component {component} is not registered in the execution scope")]
    Unresolved { component: &'static str },
    #[error("execution scope already closed")]
    ScopeClosed,
    #[error(transparent)]
    Handler(#[from] anyhow::Error),
}

/// Stable discriminant of [`CourierError`] for transport-level mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Invalid,
    Unauthenticated,
    Forbidden,
    Timeout,
    Unavailable,
    Cancelled,
    Internal,
}

impl ErrorKind {
    /// Lowercase label used in logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Invalid => "invalid",
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden => "forbidden",
            Self::Timeout => "timeout",
            Self::Unavailable => "unavailable",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }
}

impl CourierError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoHandler { .. } => ErrorKind::NotFound,
            Self::Validation(_) => ErrorKind::Invalid,
            Self::Unauthenticated => ErrorKind::Unauthenticated,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Overloaded => ErrorKind::Unavailable,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::CaptureInactive
            | Self::Unresolved { .. }
            | Self::ScopeClosed
            | Self::Handler(_) => ErrorKind::Internal,
        }
    }
}

impl From<ValidationErrors> for CourierError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}
