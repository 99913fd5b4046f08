//! Cache manager
//!
//! Wraps an optional `CacheBackend` with a get-or-compute pattern,
//! strategy-driven TTLs and a tag reverse index for bulk invalidation.
//!
//! Failure policy: a missing or failing backend never breaks the caller.
//! Without a backend, `get_or_set` degrades to calling the fetcher every
//! time; backend read errors are treated as misses and write errors are
//! logged and swallowed. The fetcher's result is always returned.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::analytics::{AccessKind, CacheAccess, CacheAnalytics};
use super::backend::CacheBackend;
use super::error::CacheError;
use super::strategy::StrategyRegistry;

/// TTL applied to tag-index entries themselves
const TAG_INDEX_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default entry TTL when neither an override nor a strategy supplies one
const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Per-call cache options
#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    /// Explicit TTL; overrides the strategy's TTL
    pub ttl: Option<Duration>,
    /// Named strategy providing TTL and base tags
    pub strategy: Option<String>,
    /// Tags recorded in the reverse index for bulk invalidation
    pub tags: Vec<String>,
}

impl CacheOptions {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Default::default()
        }
    }

    pub fn with_strategy(strategy: impl Into<String>) -> Self {
        Self {
            strategy: Some(strategy.into()),
            ..Default::default()
        }
    }

    pub fn tagged(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// Get-or-compute cache front over an optional backend
pub struct CacheManager {
    backend: Option<Arc<dyn CacheBackend>>,
    analytics: Option<Arc<CacheAnalytics>>,
    strategies: StrategyRegistry,
}

impl CacheManager {
    pub fn new(backend: Option<Arc<dyn CacheBackend>>) -> Self {
        Self {
            backend,
            analytics: None,
            strategies: StrategyRegistry::builtin(),
        }
    }

    /// Attach an analytics recorder; every access is reported to it
    pub fn with_analytics(mut self, analytics: Arc<CacheAnalytics>) -> Self {
        self.analytics = Some(analytics);
        self
    }

    pub fn with_strategies(mut self, strategies: StrategyRegistry) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn strategies(&self) -> &StrategyRegistry {
        &self.strategies
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// Get a cached value or compute it via `fetcher`
    ///
    /// Returns `Err` only when the fetcher itself fails on a miss; backend
    /// failures degrade to miss/no-op.
    pub async fn get_or_set<T, F, Fut>(
        &self,
        key: &str,
        fetcher: F,
        options: CacheOptions,
    ) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CacheError>>,
    {
        let started = Instant::now();

        let backend = match &self.backend {
            Some(backend) => backend.clone(),
            None => {
                // No backend configured: deliberate degrade to uncached
                let value = fetcher().await?;
                self.record(key, AccessKind::Miss, started, None, &options);
                return Ok(value);
            }
        };

        match backend.get(key).await {
            Ok(Some(raw)) => match serde_json::from_value::<T>(raw.clone()) {
                Ok(value) => {
                    self.record(key, AccessKind::Hit, started, payload_size(&raw), &options);
                    return Ok(value);
                }
                Err(e) => {
                    // Shape drift between writer and reader; refetch
                    tracing::warn!(key = %key, error = %e, "Cached payload failed to deserialize, refetching");
                }
            },
            Ok(None) => {}
            Err(e) => {
                // Availability over cache correctness: errors fall through to the fetcher
                tracing::warn!(key = %key, error = %e, "Cache backend get failed, treating as miss");
                let value = fetcher().await?;
                self.record(key, AccessKind::Error, started, None, &options);
                self.store(&backend, key, &value, &options).await;
                return Ok(value);
            }
        }

        let value = fetcher().await?;
        let size = serde_json::to_value(&value).ok().as_ref().and_then(payload_size);
        self.record(key, AccessKind::Miss, started, size, &options);
        self.store(&backend, key, &value, &options).await;
        Ok(value)
    }

    /// Read a value directly, degrading backend errors to None
    ///
    /// Used by domain layers that need the value before they can decide how
    /// to cache it (strategy selection depends on content shape).
    pub async fn get_value<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let backend = self.backend.as_ref()?;
        match backend.get(key).await {
            Ok(Some(raw)) => serde_json::from_value(raw).ok(),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache backend get failed, treating as miss");
                None
            }
        }
    }

    /// Store a value directly with the given options, updating tag indexes
    ///
    /// Best-effort like every other write path; failures are logged.
    pub async fn set_value<T: Serialize>(&self, key: &str, value: &T, options: &CacheOptions) {
        if let Some(backend) = self.backend.clone() {
            self.store(&backend, key, value, options).await;
        }
    }

    /// Delete a single key
    pub async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        if let Some(backend) = &self.backend {
            backend.delete(key).await?;
        }
        Ok(())
    }

    /// Delete every key carrying any of the given tags, then the tag
    /// entries themselves
    ///
    /// Best-effort: a backend failure mid-loop leaves remaining keys in
    /// place. Errors are logged and the loop continues.
    pub async fn invalidate_by_tags(&self, tags: &[String]) -> usize {
        let backend = match &self.backend {
            Some(backend) => backend.clone(),
            None => return 0,
        };

        let mut keys_to_delete: HashSet<String> = HashSet::new();
        for tag in tags {
            match backend.get(&tag_index_key(tag)).await {
                Ok(Some(raw)) => {
                    if let Ok(keys) = serde_json::from_value::<Vec<String>>(raw) {
                        keys_to_delete.extend(keys);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(tag = %tag, error = %e, "Failed to read tag index");
                }
            }
        }

        let mut deleted = 0;
        for key in &keys_to_delete {
            match backend.delete(key).await {
                Ok(()) => deleted += 1,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Failed to delete tagged key");
                }
            }
        }

        for tag in tags {
            if let Err(e) = backend.delete(&tag_index_key(tag)).await {
                tracing::warn!(tag = %tag, error = %e, "Failed to delete tag index entry");
            }
        }

        tracing::debug!(tags = ?tags, deleted = deleted, "Invalidated keys by tags");
        deleted
    }

    /// List keys currently in the backend
    pub async fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>, CacheError> {
        match &self.backend {
            Some(backend) => backend.list(prefix).await,
            None => Ok(Vec::new()),
        }
    }

    async fn store<T: Serialize>(
        &self,
        backend: &Arc<dyn CacheBackend>,
        key: &str,
        value: &T,
        options: &CacheOptions,
    ) {
        let raw = match serde_json::to_value(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Value not JSON-serializable, skipping cache store");
                return;
            }
        };

        let ttl = self.resolve_ttl(options);
        if let Err(e) = backend.set(key, raw, Some(ttl)).await {
            tracing::warn!(key = %key, error = %e, "Cache backend set failed");
            return;
        }

        for tag in self.resolve_tags(options) {
            self.append_to_tag_index(backend, &tag, key).await;
        }
    }

    /// Record `key` under `tag` in the reverse index
    ///
    /// Read-modify-write with last-write-wins; two concurrent writers can
    /// drop each other's append. Accepted weak consistency, kept behind
    /// this single function so a CAS-backed backend can replace it without
    /// touching call sites.
    async fn append_to_tag_index(&self, backend: &Arc<dyn CacheBackend>, tag: &str, key: &str) {
        let index_key = tag_index_key(tag);

        let mut keys: Vec<String> = match backend.get(&index_key).await {
            Ok(Some(raw)) => serde_json::from_value(raw).unwrap_or_default(),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(tag = %tag, error = %e, "Failed to read tag index for append");
                return;
            }
        };

        if !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
        }

        match serde_json::to_value(&keys) {
            Ok(raw) => {
                if let Err(e) = backend.set(&index_key, raw, Some(TAG_INDEX_TTL)).await {
                    tracing::warn!(tag = %tag, error = %e, "Failed to write tag index");
                }
            }
            Err(e) => {
                tracing::warn!(tag = %tag, error = %e, "Failed to serialize tag index");
            }
        }
    }

    fn resolve_ttl(&self, options: &CacheOptions) -> Duration {
        if let Some(ttl) = options.ttl {
            return ttl;
        }
        if let Some(name) = &options.strategy {
            return self.strategies.get(name).ttl();
        }
        DEFAULT_TTL
    }

    fn resolve_tags(&self, options: &CacheOptions) -> Vec<String> {
        let mut tags = options.tags.clone();
        if let Some(name) = &options.strategy {
            for tag in &self.strategies.get(name).tags {
                if !tags.contains(tag) {
                    tags.push(tag.clone());
                }
            }
        }
        tags
    }

    fn record(
        &self,
        key: &str,
        kind: AccessKind,
        started: Instant,
        size: Option<u64>,
        options: &CacheOptions,
    ) {
        let Some(analytics) = &self.analytics else {
            return;
        };
        let mut access =
            CacheAccess::now(key, kind, started.elapsed().as_secs_f64() * 1000.0);
        access.size_bytes = size;
        access.strategy = options.strategy.clone();
        if !options.tags.is_empty() {
            access.tags = Some(options.tags.clone());
        }
        analytics.record_access(access);
    }
}

fn tag_index_key(tag: &str) -> String {
    format!("tag:{}", tag)
}

/// Approximate serialized size of a payload in bytes
fn payload_size(value: &Value) -> Option<u64> {
    serde_json::to_vec(value).ok().map(|v| v.len() as u64)
}
