use crate::error::CallError;
use std::time::Duration;

/// Classification of an operation error as retryable or permanent
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for std::io::Error {
    fn is_retryable(&self) -> bool {
        use std::io::ErrorKind;

        matches!(
            self.kind(),
            ErrorKind::ConnectionReset
                | ErrorKind::ConnectionRefused
                | ErrorKind::ConnectionAborted
                | ErrorKind::NotConnected
                | ErrorKind::BrokenPipe
                | ErrorKind::TimedOut
                | ErrorKind::Interrupted
                | ErrorKind::WouldBlock
                | ErrorKind::UnexpectedEof
        )
    }
}

impl Retryable for http::StatusCode {
    fn is_retryable(&self) -> bool {
        self.is_server_error()
            || *self == http::StatusCode::TOO_MANY_REQUESTS
            || *self == http::StatusCode::REQUEST_TIMEOUT
    }
}

impl Retryable for reqwest::Error {
    fn is_retryable(&self) -> bool {
        if let Some(status) = self.status() {
            return status.is_retryable();
        }
        self.is_timeout() || self.is_connect()
    }
}

/// Result of a single attempt
#[derive(Debug)]
pub enum Outcome<T, E> {
    Success(T),
    TransientFailure(E),
    PermanentFailure(E),
    TimedOut(Duration),
    CircuitOpen,
    ConcurrencyRejected,
    Cancelled,
}

impl<T, E> Outcome<T, E> {
    /// Classify an operation result with a caller-supplied predicate
    pub fn classify<P>(result: Result<T, E>, is_retryable: P) -> Self
    where
        P: Fn(&E) -> bool,
    {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(e) => Self::from_error(e, is_retryable),
        }
    }

    pub fn from_error<P>(error: E, is_retryable: P) -> Self
    where
        P: Fn(&E) -> bool,
    {
        if is_retryable(&error) {
            Outcome::TransientFailure(error)
        } else {
            Outcome::PermanentFailure(error)
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Whether the retry loop may make another attempt after this outcome.
    /// Only transient failures and timeouts qualify.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Outcome::TransientFailure(_) | Outcome::TimedOut(_))
    }

    /// Short label used for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Success(_) => "success",
            Outcome::TransientFailure(_) => "transient_failure",
            Outcome::PermanentFailure(_) => "permanent_failure",
            Outcome::TimedOut(_) => "timed_out",
            Outcome::CircuitOpen => "circuit_open",
            Outcome::ConcurrencyRejected => "concurrency_rejected",
            Outcome::Cancelled => "cancelled",
        }
    }

    /// Convert to the caller-facing result at the outer boundary
    pub fn into_result(self) -> Result<T, CallError<E>> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::TransientFailure(e) => Err(CallError::Transient(e)),
            Outcome::PermanentFailure(e) => Err(CallError::Permanent(e)),
            Outcome::TimedOut(timeout) => Err(CallError::TimedOut(timeout)),
            Outcome::CircuitOpen => Err(CallError::CircuitOpen),
            Outcome::ConcurrencyRejected => Err(CallError::ConcurrencyRejected),
            Outcome::Cancelled => Err(CallError::Cancelled),
        }
    }
}
