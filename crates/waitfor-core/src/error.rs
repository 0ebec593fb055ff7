//! Error types for wait operations.

use thiserror::Error;

/// Result type alias for wait operations.
pub type WaitResult<T> = Result<T, WaitError>;

/// Errors that can terminate a wait operation or a single attempt.
#[derive(Debug, Error)]
pub enum WaitError {
    /// The address is empty, unparsable, or has a shape the host/port
    /// parser cannot handle (IPv6 literals among them).
    #[error("malformed address: {0}")]
    MalformedAddress(String),

    /// No waiter is registered for the URI scheme.
    #[error("invalid scheme: {0}")]
    InvalidScheme(String),

    /// The configuration fails validation before any attempt runs.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A single attempt did not complete within the per-attempt deadline.
    #[error("attempt timed out")]
    Timeout,

    /// The retry budget is consumed; carries the last attempt's error.
    #[error("retries exhausted, last error: {0}")]
    RetriesExhausted(Box<WaitError>),

    /// Releasing an attempt's resources failed. Terminal for the wait;
    /// the caller decides whether the process should die.
    #[error("cancel failed: {0}")]
    CancelFailed(String),

    /// Whatever the protocol waiter itself reports: a non-2xx status,
    /// a failed AUTH, a missing table or key, a refused connection.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl WaitError {
    /// Whether this error (or, for exhausted retries, its payload) is a
    /// per-attempt timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            WaitError::Timeout => true,
            WaitError::RetriesExhausted(inner) => inner.is_timeout(),
            _ => false,
        }
    }
}
