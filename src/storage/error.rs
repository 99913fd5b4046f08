//! Storage error types

use thiserror::Error;

/// Storage layer errors
///
/// Public router operations fold these into typed results
/// (`UploadResult`/`DeleteResult`); they never escape as panics.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend not configured: {0}")]
    NotConfigured(String),

    #[error("{op} failed: {message}")]
    OperationFailed { op: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("both storage systems failed: old: {old}; new: {new}")]
    BothSystemsFailed { old: String, new: String },
}

impl StorageError {
    pub fn operation(op: impl Into<String>, message: impl ToString) -> Self {
        StorageError::OperationFailed {
            op: op.into(),
            message: message.to_string(),
        }
    }
}
