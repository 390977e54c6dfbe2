//! Transport error types.

use thiserror::Error;

/// Errors raised by [`BatchTransport`](super::BatchTransport).
///
/// Per-request network failures are not errors at this level; they are
/// reported inside each [`Response`](super::Response). These variants cover
/// setup failures and misuse of the async protocol, which are programming
/// errors and must not be retried.
#[derive(Debug, Error)]
pub enum BatchError {
    /// `start_async` called while a batch is already in flight.
    #[error("an async batch of {pending} request(s) is already in flight")]
    AlreadyInFlight { pending: usize },

    /// `finish_async` called with no batch in flight.
    #[error("no async batch is in flight")]
    NotInFlight,

    /// The I/O runtime could not be created.
    #[error("failed to create I/O runtime: {0}")]
    Runtime(#[from] std::io::Error),

    /// The HTTP client could not be created.
    #[error("failed to create HTTP client: {0}")]
    Client(String),

    /// The background batch task died before producing responses.
    #[error("batch task failed: {0}")]
    TaskFailed(String),
}

impl BatchError {
    /// True for async protocol misuse.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, BatchError::AlreadyInFlight { .. } | BatchError::NotInFlight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_violation_classification() {
        assert!(BatchError::NotInFlight.is_protocol_violation());
        assert!(BatchError::AlreadyInFlight { pending: 2 }.is_protocol_violation());
        assert!(!BatchError::Client("tls".into()).is_protocol_violation());
    }

    #[test]
    fn test_display() {
        let err = BatchError::AlreadyInFlight { pending: 3 };
        assert!(err.to_string().contains("3 request(s)"));
    }
}
