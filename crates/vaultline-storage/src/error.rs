//! Storage error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("storage lock poisoned: {0}")]
    Lock(String),

    #[error("invalid storage file: {0}")]
    InvalidFile(String),
}
