//! Relaycast error types.

use thiserror::Error;

/// Errors shared across all Relaycast crates.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Record store unavailable or a query failed.
    #[error("Store error: {0}")]
    Store(String),

    /// Intake queue unavailable or a query failed.
    #[error("Queue error: {0}")]
    Queue(String),

    /// Verdict provider failed (timeout, transport, non-2xx, malformed body).
    #[error("Provider error: {0}")]
    Provider(String),

    /// Chat transport failed to deliver or receive.
    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Config error: {0}")]
    Config(String),

    /// A status change the lifecycle does not allow.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RelayError {
    /// Infrastructure errors the caller may retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RelayError::Store(_) | RelayError::Queue(_) | RelayError::Channel(_) | RelayError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(RelayError::Store("locked".into()).is_transient());
        assert!(RelayError::Queue("down".into()).is_transient());
        assert!(!RelayError::Config("bad".into()).is_transient());
        assert!(!RelayError::InvalidTransition("pending".into()).is_transient());
    }
}
