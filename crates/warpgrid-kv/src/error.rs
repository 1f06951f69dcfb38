//! Error types for the WarpGrid key-value layer.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for key-value operations.
pub type KvResult<T> = Result<T, KvError>;

/// Errors that can occur while talking to a key-value backend.
///
/// Payloads are rendered strings so that per-command results inside a batch
/// can be cloned and compared.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KvError {
    #[error("connection error: {0}")]
    Io(String),

    #[error("round trip timed out after {0:?}")]
    Timeout(Duration),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("invalid ttl {0:?}: must be at least one second")]
    InvalidTtl(Duration),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("batch failed: {0}")]
    BatchFailed(String),
}

impl From<std::io::Error> for KvError {
    fn from(e: std::io::Error) -> Self {
        KvError::Io(e.to_string())
    }
}
