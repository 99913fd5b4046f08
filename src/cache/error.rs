//! Cache error types

/// Cache error types
#[derive(Debug)]
pub enum CacheError {
    /// Cache entry not found
    NotFound,
    /// Backend is unavailable or misbehaving
    BackendUnavailable(String),
    /// Fetcher failed while computing a value
    FetchFailed(String),
    /// Configuration error
    ConfigurationError(String),
    /// Serialization/deserialization error
    SerializationError(String),
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheError::NotFound => write!(f, "Cache entry not found"),
            CacheError::BackendUnavailable(msg) => write!(f, "Cache backend unavailable: {}", msg),
            CacheError::FetchFailed(msg) => write!(f, "Fetcher failed: {}", msg),
            CacheError::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),
            CacheError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for CacheError {}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_create_cache_error_variants() {
        let _err1 = CacheError::NotFound;
        let _err2 = CacheError::BackendUnavailable("connection refused".to_string());
        let _err3 = CacheError::FetchFailed("upstream 500".to_string());
    }

    #[test]
    fn test_cache_error_implements_display() {
        let err = CacheError::NotFound;
        assert!(format!("{}", err).contains("not found"));

        let err = CacheError::BackendUnavailable("timeout".to_string());
        assert!(format!("{}", err).contains("timeout"));
    }

    #[test]
    fn test_cache_error_implements_error_trait() {
        fn assert_error<T: std::error::Error>() {}
        assert_error::<CacheError>();
    }

    #[test]
    fn test_cache_error_converts_from_serde_error() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{bad json}").unwrap_err();
        let cache_err: CacheError = serde_err.into();
        assert!(matches!(cache_err, CacheError::SerializationError(_)));
    }
}
