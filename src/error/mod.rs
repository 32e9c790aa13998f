use crate::outcome::Retryable;
use http::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Result type for setup and configuration operations
pub type Result<T> = std::result::Result<T, BulwarkError>;

/// Errors raised while building or configuring pipelines
#[derive(Error, Debug)]
pub enum BulwarkError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error surfaced to callers of a protected operation.
///
/// `Transient` and `Permanent` carry the operation's own error unchanged;
/// every other variant is produced by the pipeline itself.
#[derive(Error, Debug)]
pub enum CallError<E> {
    #[error("Transient failure: {0}")]
    Transient(E),

    #[error("Permanent failure: {0}")]
    Permanent(E),

    #[error("Attempt timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Circuit breaker is open")]
    CircuitOpen,

    #[error("Concurrency limit reached, request rejected")]
    ConcurrencyRejected,

    #[error("Operation cancelled by caller")]
    Cancelled,
}

impl<E> CallError<E> {
    /// True for errors callers should present as "temporarily unavailable"
    /// rather than a hard failure.
    pub fn is_temporarily_unavailable(&self) -> bool {
        matches!(self, CallError::CircuitOpen | CallError::ConcurrencyRejected)
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            CallError::Transient(_) => StatusCode::BAD_GATEWAY,
            CallError::Permanent(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CallError::TimedOut(_) => StatusCode::GATEWAY_TIMEOUT,
            CallError::CircuitOpen => StatusCode::SERVICE_UNAVAILABLE,
            CallError::ConcurrencyRejected => StatusCode::SERVICE_UNAVAILABLE,
            CallError::Cancelled => StatusCode::REQUEST_TIMEOUT,
        }
    }

    /// The operation's own error, if this failure came from the operation
    pub fn inner(&self) -> Option<&E> {
        match self {
            CallError::Transient(e) | CallError::Permanent(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            CallError::Transient(e) | CallError::Permanent(e) => Some(e),
            _ => None,
        }
    }
}

impl<E> Retryable for CallError<E> {
    fn is_retryable(&self) -> bool {
        matches!(self, CallError::Transient(_) | CallError::TimedOut(_))
    }
}

/// Classified failure of a downstream dependency (database, RPC, HTTP).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DependencyError {
    #[error("Dependency unavailable: {0}")]
    Unavailable(String),

    #[error("Downstream deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("Connection reset: {0}")]
    ConnectionReset(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl Retryable for DependencyError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            DependencyError::Unavailable(_)
                | DependencyError::DeadlineExceeded(_)
                | DependencyError::ConnectionReset(_)
        )
    }
}
