//! Component cache
//!
//! Caches rendered component payloads keyed by id and version. L1 is an
//! in-process map with a frequency-weighted eviction score; L2 is the
//! shared `CacheManager`. Large payloads are gzip-compressed before they
//! reach L2; compression is strictly best-effort and failures fall back to
//! the raw payload in both directions.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Instant;

use crate::config::CacheSettings;

use super::error::CacheError;
use super::manager::{CacheManager, CacheOptions};

struct MemoryEntry {
    value: Value,
    size_bytes: u64,
    access_count: u64,
    last_access: Instant,
}

impl MemoryEntry {
    /// Eviction score: lower is evicted first
    ///
    /// Frequency-weighted recency: a rarely-used entry that was just
    /// touched scores low, a hot entry that has idled scores high. Not
    /// pure LRU.
    fn score(&self, now: Instant) -> u128 {
        let idle_ms = now.duration_since(self.last_access).as_millis();
        self.access_count as u128 * idle_ms
    }
}

/// Component cache with compression and scored eviction
pub struct ComponentCacheManager {
    memory: Mutex<HashMap<String, MemoryEntry>>,
    cache: Arc<CacheManager>,
    max_memory_bytes: u64,
    compression_threshold: usize,
}

impl ComponentCacheManager {
    pub fn new(cache: Arc<CacheManager>, settings: &CacheSettings) -> Self {
        Self {
            memory: Mutex::new(HashMap::new()),
            cache,
            max_memory_bytes: settings.component_cache_size_bytes,
            compression_threshold: settings.compression_threshold_bytes,
        }
    }

    /// Cache key: `component:<id>:<version|latest>`
    pub fn component_key(id: &str, version: Option<&str>) -> String {
        format!("component:{}:{}", id, version.unwrap_or("latest"))
    }

    /// Get a component payload, L1 then L2 then fetch
    pub async fn get_component<F, Fut>(
        &self,
        id: &str,
        version: Option<&str>,
        fetcher: F,
    ) -> Result<Value, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, CacheError>>,
    {
        let key = Self::component_key(id, version);

        {
            let mut memory = self.memory.lock();
            if let Some(entry) = memory.get_mut(&key) {
                entry.access_count += 1;
                entry.last_access = Instant::now();
                return Ok(entry.value.clone());
            }
        }

        if let Some(stored) = self.cache.get_value::<Value>(&key).await {
            let value = decode_payload(stored);
            self.insert_memory(&key, &value);
            return Ok(value);
        }

        let value = fetcher().await?;
        self.store(&key, id, &value).await;
        Ok(value)
    }

    /// Explicitly cache a component payload in both layers
    pub async fn cache_component(&self, id: &str, version: Option<&str>, value: &Value) {
        let key = Self::component_key(id, version);
        self.store(&key, id, value).await;
    }

    /// Remove every cached version of a component
    pub async fn invalidate_component(&self, id: &str) {
        let prefix = format!("component:{}:", id);
        self.memory.lock().retain(|key, _| !key.starts_with(&prefix));
        self.cache.invalidate_by_tags(&[component_tag(id)]).await;
    }

    /// Total serialized size held in L1
    pub fn memory_size_bytes(&self) -> u64 {
        self.memory.lock().values().map(|e| e.size_bytes).sum()
    }

    pub fn memory_len(&self) -> usize {
        self.memory.lock().len()
    }

    async fn store(&self, key: &str, id: &str, value: &Value) {
        let payload = encode_payload(value, self.compression_threshold);
        let options = CacheOptions::with_strategy("component").tagged(vec![
            "component".to_string(),
            component_tag(id),
        ]);
        self.cache.set_value(key, &payload, &options).await;
        self.insert_memory(key, value);
    }

    fn insert_memory(&self, key: &str, value: &Value) {
        let size_bytes = serde_json::to_vec(value)
            .map(|v| v.len() as u64)
            .unwrap_or(0);
        let mut memory = self.memory.lock();
        memory.insert(
            key.to_string(),
            MemoryEntry {
                value: value.clone(),
                size_bytes,
                access_count: 1,
                last_access: Instant::now(),
            },
        );
        Self::evict_to_cap(&mut memory, self.max_memory_bytes);
    }

    /// Evict lowest-scoring entries until total size fits the cap
    fn evict_to_cap(memory: &mut HashMap<String, MemoryEntry>, cap: u64) {
        let mut total: u64 = memory.values().map(|e| e.size_bytes).sum();
        if total <= cap {
            return;
        }

        let now = Instant::now();
        let mut scored: Vec<(String, u128, u64)> = memory
            .iter()
            .map(|(k, e)| (k.clone(), e.score(now), e.size_bytes))
            .collect();
        scored.sort_by(|a, b| a.1.cmp(&b.1));

        for (key, _, size) in scored {
            if total <= cap {
                break;
            }
            memory.remove(&key);
            total = total.saturating_sub(size);
            tracing::debug!(key = %key, "Evicted component from memory cache");
        }
    }
}

fn component_tag(id: &str) -> String {
    format!("component-{}", id)
}

/// Wrap a payload for L2, compressing when it exceeds the threshold
///
/// Compression failure falls back to the raw payload: correctness over
/// optimization.
fn encode_payload(value: &Value, threshold: usize) -> Value {
    let raw = match serde_json::to_vec(value) {
        Ok(raw) => raw,
        Err(_) => return value.clone(),
    };
    if raw.len() <= threshold {
        return value.clone();
    }

    match gzip(&raw) {
        Ok(compressed) => json!({
            "c": true,
            "d": BASE64.encode(compressed),
        }),
        Err(e) => {
            tracing::warn!(error = %e, "Compression failed, caching raw payload");
            value.clone()
        }
    }
}

/// Unwrap an L2 payload, treating any decode failure as a raw payload
fn decode_payload(stored: Value) -> Value {
    let is_wrapper = stored.get("c").and_then(Value::as_bool) == Some(true);
    if !is_wrapper {
        return stored;
    }

    let Some(encoded) = stored.get("d").and_then(Value::as_str) else {
        return stored;
    };

    let decoded = BASE64
        .decode(encoded)
        .ok()
        .and_then(|bytes| gunzip(&bytes).ok())
        .and_then(|raw| serde_json::from_slice(&raw).ok());

    match decoded {
        Some(value) => value,
        None => {
            tracing::warn!("Decompression failed, treating cached payload as raw");
            stored
        }
    }
}

fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

fn gunzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}
