//! Mock storage client
//!
//! Filesystem-backed stand-in for the real object store, used in local
//! development and as the fallback floor for the router. Always reports
//! healthy: if the local disk is gone there is nothing left to fall back
//! to anyway.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use super::backend::{StorageBackend, UploadOutcome};
use super::error::StorageError;

/// Local-filesystem storage backend
pub struct MockStorageClient {
    root: PathBuf,
    url_prefix: String,
}

impl MockStorageClient {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            url_prefix: "/mock-storage".to_string(),
        }
    }

    pub fn with_url_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.url_prefix = prefix.into();
        self
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        // Reject traversal out of the root
        if path.split('/').any(|seg| seg == "..") || path.starts_with('/') {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(path))
    }
}

#[async_trait]
impl StorageBackend for MockStorageClient {
    fn provider(&self) -> &'static str {
        "mock-fs"
    }

    async fn upload_buffer(
        &self,
        data: Bytes,
        path: &str,
        _content_type: &str,
    ) -> Result<UploadOutcome, StorageError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let size = data.len() as u64;
        tokio::fs::write(&target, &data).await?;

        Ok(UploadOutcome {
            url: self.file_url(path),
            path: path.to_string(),
            size,
            etag: Some(format!("mock-{:x}", size)),
        })
    }

    async fn delete_file(&self, path: &str) -> Result<(), StorageError> {
        let target = self.resolve(path)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            // Idempotent delete, matching object-store semantics
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn file_url(&self, path: &str) -> String {
        format!("{}/{}", self.url_prefix, path)
    }

    async fn list_files(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError> {
        let mut results = Vec::new();
        if !self.root.exists() {
            return Ok(results);
        }

        // Iterative walk; async recursion would need boxing
        let mut pending: Vec<PathBuf> = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let entry_path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(entry_path);
                } else if let Some(rel) = relative_key(&self.root, &entry_path) {
                    if prefix.map(|p| rel.starts_with(p)).unwrap_or(true) {
                        results.push(rel);
                    }
                }
            }
        }

        results.sort();
        Ok(results)
    }

    async fn health_check(&self) -> bool {
        true
    }
}

fn relative_key(root: &Path, path: &Path) -> Option<String> {
    path.strip_prefix(root)
        .ok()
        .map(|rel| rel.to_string_lossy().replace('\\', "/"))
}
