//! Error types for the ticket store.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Fewer unreserved active tickets than requested.
    #[error("insufficient tickets: requested {requested}, available {available}")]
    InsufficientTickets { requested: usize, available: usize },

    /// The request itself is invalid (e.g. reserving zero tickets).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The exclusive lock could not be acquired in time.
    #[error("timed out acquiring lock {0}")]
    LockTimeout(String),

    /// IO error (file system).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failure reported by a key-value backend.
    #[error("storage backend error: {0}")]
    Backend(String),
}
