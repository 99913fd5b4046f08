//! Cache backend trait and implementations
//!
//! The backend is the durable side of the cache layer: a key-value store
//! with optional per-entry TTL. Production deployments plug in a remote KV
//! store; this module ships an in-process moka-backed implementation, a
//! no-op backend for disabled caching, and a failure-injecting backend for
//! exercising degrade paths in tests.

use async_trait::async_trait;
use moka::Expiry;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::error::CacheError;

/// Key-value backend contract consumed by `CacheManager`
///
/// All call sites must tolerate backend failure: an `Err` from `get` is
/// treated as a miss, an `Err` from `set`/`delete` is logged and ignored.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get a value by key. Returns None if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    /// Set a value with an optional TTL. Overwrites existing entries.
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>)
        -> Result<(), CacheError>;

    /// Delete a value by key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// List keys, optionally filtered by prefix.
    async fn list(&self, prefix: Option<&str>) -> Result<Vec<String>, CacheError>;
}

/// Stored value plus the TTL it was written with
#[derive(Clone)]
struct StoredValue {
    value: Value,
    ttl: Option<Duration>,
}

/// Per-entry expiration policy driven by the TTL supplied at write time
struct TtlExpiry;

impl Expiry<String, StoredValue> for TtlExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.ttl
    }
}

/// In-process cache backend built on moka with per-entry TTL support
pub struct MemoryCacheBackend {
    cache: moka::future::Cache<String, StoredValue>,
}

impl MemoryCacheBackend {
    /// Create a backend holding at most `max_entries` values
    pub fn new(max_entries: u64) -> Self {
        let cache = moka::future::Cache::builder()
            .max_capacity(max_entries)
            .expire_after(TtlExpiry)
            .build();
        Self { cache }
    }

    /// Current entry count (approximate due to eventual consistency)
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Force pending moka maintenance (expirations, invalidations)
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }
}

impl Default for MemoryCacheBackend {
    fn default() -> Self {
        Self::new(100_000)
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        Ok(self.cache.get(key).await.map(|stored| stored.value))
    }

    async fn set(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        self.cache
            .insert(key.to_string(), StoredValue { value, ttl })
            .await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn list(&self, prefix: Option<&str>) -> Result<Vec<String>, CacheError> {
        let keys = self
            .cache
            .iter()
            .map(|(k, _)| (*k).clone())
            .filter(|k| prefix.map(|p| k.starts_with(p)).unwrap_or(true))
            .collect();
        Ok(keys)
    }
}

/// No-op backend used when caching is disabled
pub struct NullBackend;

#[async_trait]
impl CacheBackend for NullBackend {
    async fn get(&self, _key: &str) -> Result<Option<Value>, CacheError> {
        Ok(None)
    }

    async fn set(
        &self,
        _key: &str,
        _value: Value,
        _ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Ok(())
    }

    async fn list(&self, _prefix: Option<&str>) -> Result<Vec<String>, CacheError> {
        Ok(Vec::new())
    }
}

/// Backend that stores values in a plain map and can simulate failures
///
/// Used to exercise the degrade-to-miss paths: flipping `fail_reads` or
/// `fail_writes` makes every corresponding call return an error.
#[derive(Clone, Default)]
pub struct MockCacheBackend {
    entries: Arc<RwLock<HashMap<String, Value>>>,
    fail_reads: Arc<RwLock<bool>>,
    fail_writes: Arc<RwLock<bool>>,
}

impl MockCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `get`/`list` return an error
    pub fn set_fail_reads(&self, enabled: bool) {
        *self.fail_reads.write() = enabled;
    }

    /// Make every `set`/`delete` return an error
    pub fn set_fail_writes(&self, enabled: bool) {
        *self.fail_writes.write() = enabled;
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Peek at a stored value without going through the trait
    pub fn peek(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }
}

#[async_trait]
impl CacheBackend for MockCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        if *self.fail_reads.read() {
            return Err(CacheError::BackendUnavailable(
                "simulated read failure".to_string(),
            ));
        }
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(
        &self,
        key: &str,
        value: Value,
        _ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        if *self.fail_writes.read() {
            return Err(CacheError::BackendUnavailable(
                "simulated write failure".to_string(),
            ));
        }
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        if *self.fail_writes.read() {
            return Err(CacheError::BackendUnavailable(
                "simulated write failure".to_string(),
            ));
        }
        self.entries.write().remove(key);
        Ok(())
    }

    async fn list(&self, prefix: Option<&str>) -> Result<Vec<String>, CacheError> {
        if *self.fail_reads.read() {
            return Err(CacheError::BackendUnavailable(
                "simulated read failure".to_string(),
            ));
        }
        Ok(self
            .entries
            .read()
            .keys()
            .filter(|k| prefix.map(|p| k.starts_with(p)).unwrap_or(true))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_backends_satisfy_send_sync_bounds() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MemoryCacheBackend>();
        assert_send_sync::<NullBackend>();
        assert_send_sync::<MockCacheBackend>();
    }

    #[tokio::test]
    async fn test_memory_backend_set_and_get() {
        let backend = MemoryCacheBackend::new(100);
        backend
            .set("cache:page:1", json!({"title": "Home"}), None)
            .await
            .unwrap();

        let value = backend.get("cache:page:1").await.unwrap();
        assert_eq!(value, Some(json!({"title": "Home"})));
    }

    #[tokio::test]
    async fn test_memory_backend_get_returns_none_for_missing_key() {
        let backend = MemoryCacheBackend::new(100);
        let value = backend.get("cache:page:missing").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_memory_backend_delete() {
        let backend = MemoryCacheBackend::new(100);
        backend.set("k", json!(1), None).await.unwrap();
        backend.delete("k").await.unwrap();
        backend.run_pending_tasks().await;

        assert!(backend.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_backend_honors_per_entry_ttl() {
        let backend = MemoryCacheBackend::new(100);
        backend
            .set("short", json!(1), Some(Duration::from_millis(20)))
            .await
            .unwrap();
        backend.set("long", json!(2), None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        backend.run_pending_tasks().await;

        assert!(backend.get("short").await.unwrap().is_none());
        assert_eq!(backend.get("long").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_memory_backend_list_filters_by_prefix() {
        let backend = MemoryCacheBackend::new(100);
        backend.set("tag:builder", json!([]), None).await.unwrap();
        backend.set("tag:content", json!([]), None).await.unwrap();
        backend
            .set("cache:page:1", json!({}), None)
            .await
            .unwrap();
        backend.run_pending_tasks().await;

        let mut tags = backend.list(Some("tag:")).await.unwrap();
        tags.sort();
        assert_eq!(tags, vec!["tag:builder", "tag:content"]);

        let all = backend.list(None).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_null_backend_is_a_no_op() {
        let backend = NullBackend;
        backend.set("k", json!(1), None).await.unwrap();
        assert!(backend.get("k").await.unwrap().is_none());
        assert!(backend.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mock_backend_simulates_read_failure() {
        let backend = MockCacheBackend::new();
        backend.set("k", json!(1), None).await.unwrap();

        backend.set_fail_reads(true);
        assert!(backend.get("k").await.is_err());
        assert!(backend.list(None).await.is_err());

        backend.set_fail_reads(false);
        assert_eq!(backend.get("k").await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_mock_backend_simulates_write_failure() {
        let backend = MockCacheBackend::new();
        backend.set_fail_writes(true);
        assert!(backend.set("k", json!(1), None).await.is_err());
        assert!(backend.delete("k").await.is_err());
        assert!(backend.is_empty());
    }
}
