//! Builder content cache
//!
//! Content-aware layer over the shared `CacheManager` for CMS builder
//! content and pages. An in-process map acts as L1 (never expires on its
//! own, cleared only by explicit invalidation); the shared manager is L2.
//! The cache strategy for an item is a pure function of its shape.

use parking_lot::RwLock;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use super::error::CacheError;
use super::manager::{CacheManager, CacheOptions};

/// Builder content/page cache with an L1 memory map over the shared manager
pub struct BuilderCacheManager {
    memory: RwLock<HashMap<String, Value>>,
    cache: Arc<CacheManager>,
}

impl BuilderCacheManager {
    pub fn new(cache: Arc<CacheManager>) -> Self {
        Self {
            memory: RwLock::new(HashMap::new()),
            cache,
        }
    }

    /// Cache key for a content item: `builder:content:<id>:<model>`
    pub fn content_key(id: &str, model: &str) -> String {
        format!("builder:content:{}:{}", id, model)
    }

    /// Cache key for a page: `builder:page:<url_hash>:<model>`
    pub fn page_key(url: &str, model: &str) -> String {
        format!("builder:page:{}:{}", url_hash(url), model)
    }

    /// Get a content item, checking memory first, then L2, then fetching
    pub async fn get_content<F, Fut>(
        &self,
        id: &str,
        model: &str,
        fetcher: F,
    ) -> Result<Value, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, CacheError>>,
    {
        let key = Self::content_key(id, model);

        if let Some(value) = self.memory.read().get(&key) {
            return Ok(value.clone());
        }

        if let Some(value) = self.cache.get_value::<Value>(&key).await {
            self.memory.write().insert(key, value.clone());
            return Ok(value);
        }

        let value = fetcher().await?;
        self.store_content(&key, id, model, &value).await;
        Ok(value)
    }

    /// Get a page by URL, same layering as `get_content`
    pub async fn get_page<F, Fut>(
        &self,
        url: &str,
        model: &str,
        fetcher: F,
    ) -> Result<Value, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, CacheError>>,
    {
        let key = Self::page_key(url, model);

        if let Some(value) = self.memory.read().get(&key) {
            return Ok(value.clone());
        }

        if let Some(value) = self.cache.get_value::<Value>(&key).await {
            self.memory.write().insert(key, value.clone());
            return Ok(value);
        }

        let value = fetcher().await?;
        let options = self
            .options_for(&value)
            .tagged(vec!["builder".to_string(), "pages".to_string(), model.to_string()]);
        self.cache.set_value(&key, &value, &options).await;
        self.memory.write().insert(key, value.clone());
        Ok(value)
    }

    /// Explicitly cache a content item in both layers
    pub async fn cache_content(&self, id: &str, model: &str, value: &Value) {
        let key = Self::content_key(id, model);
        self.store_content(&key, id, model, value).await;
    }

    /// Remove a content item from both layers and its tag index entries
    pub async fn invalidate_content(&self, id: &str, model: &str) {
        let key = Self::content_key(id, model);
        self.memory.write().remove(&key);
        if let Err(e) = self.cache.invalidate(&key).await {
            tracing::warn!(key = %key, error = %e, "Failed to invalidate content in backend");
        }
        self.cache.invalidate_by_tags(&[content_tag(id)]).await;
    }

    /// Invalidate every cached item belonging to a model
    pub async fn invalidate_model(&self, model: &str) {
        let suffix = format!(":{}", model);
        self.memory.write().retain(|key, _| !key.ends_with(&suffix));
        self.cache.invalidate_by_tags(&[model.to_string()]).await;
    }

    /// Drop the entire L1 map
    pub fn clear_memory(&self) {
        self.memory.write().clear();
    }

    /// Number of entries held in L1
    pub fn memory_len(&self) -> usize {
        self.memory.read().len()
    }

    async fn store_content(&self, key: &str, id: &str, model: &str, value: &Value) {
        let options = self.options_for(value).tagged(vec![
            "builder".to_string(),
            "content".to_string(),
            content_tag(id),
            model.to_string(),
        ]);
        self.cache.set_value(key, value, &options).await;
        self.memory.write().insert(key.to_string(), value.clone());
    }

    fn options_for(&self, value: &Value) -> CacheOptions {
        let strategy = self.cache.strategies().select_for_content(value);
        CacheOptions::with_strategy(strategy.name.clone())
    }
}

fn content_tag(id: &str) -> String {
    format!("content-{}", id)
}

/// Short hex digest of a page URL, stable across processes
fn url_hash(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    hex::encode(&digest[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::backend::MockCacheBackend;
    use serde_json::json;

    fn setup() -> (BuilderCacheManager, MockCacheBackend) {
        let backend = MockCacheBackend::new();
        let cache = Arc::new(CacheManager::new(Some(Arc::new(backend.clone()))));
        (BuilderCacheManager::new(cache), backend)
    }

    #[test]
    fn test_key_formats() {
        assert_eq!(
            BuilderCacheManager::content_key("abc", "page"),
            "builder:content:abc:page"
        );
        let key = BuilderCacheManager::page_key("/pricing", "page");
        assert!(key.starts_with("builder:page:"));
        assert!(key.ends_with(":page"));
        // Hash component is 16 hex chars
        let hash = key.split(':').nth(2).unwrap();
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_url_hash_is_deterministic() {
        assert_eq!(url_hash("/a"), url_hash("/a"));
        assert_ne!(url_hash("/a"), url_hash("/b"));
    }

    #[tokio::test]
    async fn test_miss_fetches_and_populates_both_layers() {
        let (builder, backend) = setup();
        let value = builder
            .get_content("page-1", "page", || async { Ok(json!({"title": "Home"})) })
            .await
            .unwrap();
        assert_eq!(value, json!({"title": "Home"}));
        assert_eq!(builder.memory_len(), 1);
        assert!(backend.peek("builder:content:page-1:page").is_some());
    }

    #[tokio::test]
    async fn test_memory_hit_skips_backend_entirely() {
        let (builder, backend) = setup();
        builder
            .cache_content("page-1", "page", &json!({"title": "Home"}))
            .await;

        // Break the backend: a memory hit must not notice
        backend.set_fail_reads(true);
        let value = builder
            .get_content("page-1", "page", || async {
                Err(CacheError::FetchFailed("should not fetch".to_string()))
            })
            .await
            .unwrap();
        assert_eq!(value, json!({"title": "Home"}));
    }

    #[tokio::test]
    async fn test_l2_hit_promotes_into_memory() {
        let (builder, _backend) = setup();
        builder
            .cache_content("page-1", "page", &json!({"title": "Home"}))
            .await;
        builder.clear_memory();
        assert_eq!(builder.memory_len(), 0);

        let value = builder
            .get_content("page-1", "page", || async {
                Err(CacheError::FetchFailed("should not fetch".to_string()))
            })
            .await
            .unwrap();
        assert_eq!(value, json!({"title": "Home"}));
        assert_eq!(builder.memory_len(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_content_clears_both_layers() {
        let (builder, backend) = setup();
        builder
            .cache_content("page-1", "page", &json!({"title": "Home"}))
            .await;

        builder.invalidate_content("page-1", "page").await;
        assert_eq!(builder.memory_len(), 0);
        assert!(backend.peek("builder:content:page-1:page").is_none());

        // Next get falls through to the fetcher
        let value = builder
            .get_content("page-1", "page", || async { Ok(json!({"title": "Fresh"})) })
            .await
            .unwrap();
        assert_eq!(value, json!({"title": "Fresh"}));
    }

    #[tokio::test]
    async fn test_invalidate_model_clears_matching_entries() {
        let (builder, backend) = setup();
        builder.cache_content("a", "page", &json!(1)).await;
        builder.cache_content("b", "page", &json!(2)).await;
        builder.cache_content("c", "symbol", &json!(3)).await;

        builder.invalidate_model("page").await;
        assert_eq!(builder.memory_len(), 1);
        assert!(backend.peek("builder:content:a:page").is_none());
        assert!(backend.peek("builder:content:b:page").is_none());
        assert!(backend.peek("builder:content:c:symbol").is_some());
    }

    #[tokio::test]
    async fn test_code_bearing_content_gets_dynamic_strategy_tags() {
        let (builder, backend) = setup();
        builder
            .cache_content("widget", "page", &json!({"data": {"jsCode": "x()"}}))
            .await;
        // "dynamic" strategy contributes its own tag on top of the builder tags
        assert!(backend.peek("tag:dynamic").is_some());
    }

    #[tokio::test]
    async fn test_get_page_caches_under_url_hash() {
        let (builder, backend) = setup();
        let value = builder
            .get_page("/pricing", "page", || async { Ok(json!({"page": "pricing"})) })
            .await
            .unwrap();
        assert_eq!(value, json!({"page": "pricing"}));

        let key = BuilderCacheManager::page_key("/pricing", "page");
        assert!(backend.peek(&key).is_some());
        assert!(backend.peek("tag:pages").is_some());
    }
}
