//! Storage backend trait and result types
//!
//! Both the real object-storage client and the mock filesystem client
//! implement `StorageBackend`; the router composes them behind one
//! contract. Result types carry the `mode` that actually served a call,
//! which stays accurate even after a fallback.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::error::StorageError;

/// Which backend implementation served an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    Real,
    Mock,
}

impl std::fmt::Display for StorageMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageMode::Real => write!(f, "real"),
            StorageMode::Mock => write!(f, "mock"),
        }
    }
}

/// A file handed to the upload path
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

/// Successful upload details produced by a backend
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub url: String,
    pub path: String,
    pub size: u64,
    pub etag: Option<String>,
}

/// Typed result of a routed upload; never a panic or raw error
#[derive(Debug, Clone, Serialize)]
pub struct UploadResult {
    pub success: bool,
    pub url: Option<String>,
    pub path: Option<String>,
    pub size: Option<u64>,
    pub provider: String,
    pub mode: StorageMode,
    pub error: Option<String>,
    pub etag: Option<String>,
}

impl UploadResult {
    pub fn ok(outcome: UploadOutcome, provider: &str, mode: StorageMode) -> Self {
        Self {
            success: true,
            url: Some(outcome.url),
            path: Some(outcome.path),
            size: Some(outcome.size),
            provider: provider.to_string(),
            mode,
            error: None,
            etag: outcome.etag,
        }
    }

    pub fn failed(error: &StorageError, provider: &str, mode: StorageMode) -> Self {
        Self {
            success: false,
            url: None,
            path: None,
            size: None,
            provider: provider.to_string(),
            mode,
            error: Some(error.to_string()),
            etag: None,
        }
    }
}

/// Typed result of a routed delete
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResult {
    pub success: bool,
    pub mode: StorageMode,
    pub error: Option<String>,
}

/// Contract implemented by both the real and the mock storage client
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short provider name used in results and logs
    fn provider(&self) -> &'static str;

    /// Upload raw bytes to a path
    async fn upload_buffer(
        &self,
        data: Bytes,
        path: &str,
        content_type: &str,
    ) -> Result<UploadOutcome, StorageError>;

    /// Delete a file; deleting a missing path is not an error
    async fn delete_file(&self, path: &str) -> Result<(), StorageError>;

    /// Public URL for a path. Synchronous and pure: no I/O.
    fn file_url(&self, path: &str) -> String;

    /// List stored paths, optionally under a prefix
    async fn list_files(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError>;

    /// Probe backend health
    async fn health_check(&self) -> bool;
}

/// In-memory backend with failure switches, for exercising fallback paths
///
/// Stores uploads in a map and can be told to fail every operation or
/// report itself unhealthy.
#[derive(Clone)]
pub struct MemoryStorageBackend {
    name: &'static str,
    url_prefix: String,
    files: Arc<RwLock<HashMap<String, Bytes>>>,
    fail_operations: Arc<RwLock<bool>>,
    healthy: Arc<RwLock<bool>>,
    operations: Arc<RwLock<u64>>,
}

impl MemoryStorageBackend {
    pub fn new(name: &'static str, url_prefix: impl Into<String>) -> Self {
        Self {
            name,
            url_prefix: url_prefix.into(),
            files: Arc::new(RwLock::new(HashMap::new())),
            fail_operations: Arc::new(RwLock::new(false)),
            healthy: Arc::new(RwLock::new(true)),
            operations: Arc::new(RwLock::new(0)),
        }
    }

    /// Make every operation return an error
    pub fn set_fail_operations(&self, enabled: bool) {
        *self.fail_operations.write() = enabled;
    }

    /// Control what `health_check` reports
    pub fn set_healthy(&self, healthy: bool) {
        *self.healthy.write() = healthy;
    }

    pub fn file_count(&self) -> usize {
        self.files.read().len()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.read().contains_key(path)
    }

    /// Total upload/delete/list attempts, including failed ones
    pub fn operation_count(&self) -> u64 {
        *self.operations.read()
    }

    fn record_operation(&self) {
        *self.operations.write() += 1;
    }
}

#[async_trait]
impl StorageBackend for MemoryStorageBackend {
    fn provider(&self) -> &'static str {
        self.name
    }

    async fn upload_buffer(
        &self,
        data: Bytes,
        path: &str,
        _content_type: &str,
    ) -> Result<UploadOutcome, StorageError> {
        self.record_operation();
        if *self.fail_operations.read() {
            return Err(StorageError::operation(
                "upload",
                format!("{} simulated failure", self.name),
            ));
        }
        let size = data.len() as u64;
        self.files.write().insert(path.to_string(), data);
        Ok(UploadOutcome {
            url: self.file_url(path),
            path: path.to_string(),
            size,
            etag: Some(format!("{}-{}", self.name, size)),
        })
    }

    async fn delete_file(&self, path: &str) -> Result<(), StorageError> {
        self.record_operation();
        if *self.fail_operations.read() {
            return Err(StorageError::operation(
                "delete",
                format!("{} simulated failure", self.name),
            ));
        }
        self.files.write().remove(path);
        Ok(())
    }

    fn file_url(&self, path: &str) -> String {
        format!("{}/{}", self.url_prefix, path)
    }

    async fn list_files(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError> {
        self.record_operation();
        if *self.fail_operations.read() {
            return Err(StorageError::operation(
                "list",
                format!("{} simulated failure", self.name),
            ));
        }
        let mut paths: Vec<String> = self
            .files
            .read()
            .keys()
            .filter(|p| prefix.map(|pre| p.starts_with(pre)).unwrap_or(true))
            .cloned()
            .collect();
        paths.sort();
        Ok(paths)
    }

    async fn health_check(&self) -> bool {
        *self.healthy.read()
    }
}
