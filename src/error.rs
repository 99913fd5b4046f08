// Error types module

use std::fmt;

/// Centralized error type for the library
///
/// Categorizes errors into 4 main types for better debugging,
/// monitoring, and appropriate surfacing to callers.
#[derive(Debug, Clone)]
pub enum SuzakuError {
    /// Configuration errors (invalid YAML, missing env vars, etc.)
    Config(String),

    /// Cache-layer errors (backend unavailable, serialization, etc.)
    Cache(String),

    /// Storage-layer errors (upload failed, backend unreachable, etc.)
    Storage(String),

    /// Internal errors (unexpected state, exhaustion, etc.)
    Internal(String),
}

impl fmt::Display for SuzakuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuzakuError::Config(msg) => write!(f, "Configuration error: {}", msg),
            SuzakuError::Cache(msg) => write!(f, "Cache error: {}", msg),
            SuzakuError::Storage(msg) => write!(f, "Storage error: {}", msg),
            SuzakuError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for SuzakuError {}

impl From<crate::cache::CacheError> for SuzakuError {
    fn from(err: crate::cache::CacheError) -> Self {
        SuzakuError::Cache(err.to_string())
    }
}

impl From<crate::storage::StorageError> for SuzakuError {
    fn from(err: crate::storage::StorageError) -> Self {
        SuzakuError::Storage(err.to_string())
    }
}
