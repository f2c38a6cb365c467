//! Error types for state backends

use thiserror::Error;

/// State backend error types
#[derive(Error, Debug)]
pub enum StateError {
    #[error("{backend} connection error: {reason}")]
    Connection { backend: String, reason: String },

    #[error("{backend} operation `{operation}` failed: {reason}")]
    Operation {
        backend: String,
        operation: String,
        reason: String,
    },

    #[error("{backend} operation `{operation}` timed out after {timeout_ms}ms")]
    Timeout {
        backend: String,
        operation: String,
        timeout_ms: u64,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for state operations
pub type Result<T> = std::result::Result<T, StateError>;
