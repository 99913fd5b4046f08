//! Cache warming
//!
//! Proactively populates the cache before real requests need the values.
//! Built-in strategies are dispatched by name; a manual priority queue
//! covers ad-hoc targets. Individual fetch failures are isolated: one bad
//! target never aborts a batch.

use async_trait::async_trait;
use futures::future::{join_all, BoxFuture};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use super::analytics::CacheAnalytics;
use super::error::CacheError;
use super::manager::{CacheManager, CacheOptions};

/// Keys warmed by popular-content must be below this hit rate to qualify
const POPULAR_HIT_RATE_CEILING: f64 = 80.0;
/// ...and above this request count
const POPULAR_MIN_REQUESTS: u64 = 5;

/// Source of authoritative content used by warming fetches
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Fetch a page by path
    async fn fetch_page(&self, path: &str) -> Result<Value, CacheError>;

    /// Fetch arbitrary content by cache key
    async fn fetch_content(&self, key: &str) -> Result<Value, CacheError>;

    /// Fetch a builder template/component by id
    async fn fetch_template(&self, id: &str) -> Result<Value, CacheError>;
}

/// Outcome of warming a single target
#[derive(Debug, Clone, Serialize)]
pub struct WarmingResult {
    pub key: String,
    pub success: bool,
    pub duration_ms: f64,
    pub error: Option<String>,
}

impl WarmingResult {
    fn ok(key: impl Into<String>, started: Instant) -> Self {
        Self {
            key: key.into(),
            success: true,
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
            error: None,
        }
    }

    fn failed(key: impl Into<String>, started: Instant, error: impl ToString) -> Self {
        Self {
            key: key.into(),
            success: false,
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
            error: Some(error.to_string()),
        }
    }
}

/// Fetcher callback for a manual warming target
pub type TargetFetcher =
    Box<dyn Fn() -> BoxFuture<'static, Result<Value, CacheError>> + Send + Sync>;

/// A manually enqueued warming target
///
/// Consumed exactly once by `execute_manual_warming`; failures are recorded
/// in the results, not retried.
pub struct WarmingTarget {
    pub key: String,
    pub fetcher: TargetFetcher,
    pub priority: u32,
    pub tags: Vec<String>,
}

/// Per-strategy scheduling configuration
///
/// Only interval-based scheduling exists; strategies without an interval
/// run on demand via `execute_strategy`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmingStrategyConfig {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub interval_secs: Option<u64>,
}

fn default_enabled() -> bool {
    true
}

/// Warming configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmingConfig {
    #[serde(default = "default_strategies")]
    pub strategies: Vec<WarmingStrategyConfig>,
    /// Paths always warmed by critical-pages, regardless of hit rate
    #[serde(default = "default_critical_pages")]
    pub critical_pages: Vec<String>,
    /// Template/component ids warmed by builder-templates
    #[serde(default)]
    pub builder_templates: Vec<String>,
}

impl Default for WarmingConfig {
    fn default() -> Self {
        Self {
            strategies: default_strategies(),
            critical_pages: default_critical_pages(),
            builder_templates: Vec::new(),
        }
    }
}

fn default_strategies() -> Vec<WarmingStrategyConfig> {
    vec![
        WarmingStrategyConfig {
            name: "popular-content".to_string(),
            enabled: true,
            interval_secs: Some(30 * 60),
        },
        WarmingStrategyConfig {
            name: "critical-pages".to_string(),
            enabled: true,
            interval_secs: Some(15 * 60),
        },
        WarmingStrategyConfig {
            name: "builder-templates".to_string(),
            enabled: false,
            interval_secs: Some(60 * 60),
        },
    ]
}

fn default_critical_pages() -> Vec<String> {
    vec!["/".to_string(), "/dashboard".to_string()]
}

/// Schedules and executes cache warming strategies
pub struct CacheWarmingManager {
    cache: Arc<CacheManager>,
    analytics: Arc<CacheAnalytics>,
    source: Arc<dyn ContentSource>,
    config: WarmingConfig,
    queue: Mutex<Vec<WarmingTarget>>,
    is_warming: AtomicBool,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl CacheWarmingManager {
    pub fn new(
        cache: Arc<CacheManager>,
        analytics: Arc<CacheAnalytics>,
        source: Arc<dyn ContentSource>,
        config: WarmingConfig,
    ) -> Self {
        Self {
            cache,
            analytics,
            source,
            config,
            queue: Mutex::new(Vec::new()),
            is_warming: AtomicBool::new(false),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Execute a built-in strategy by name
    ///
    /// Unknown names log a warning and return empty results; this never
    /// fails.
    pub async fn execute_strategy(&self, name: &str) -> Vec<WarmingResult> {
        match name {
            "popular-content" => self.warm_popular_content().await,
            "critical-pages" => self.warm_critical_pages().await,
            "builder-templates" => self.warm_builder_templates().await,
            "night-refresh" => {
                // Run the three base strategies concurrently and flatten
                let batches = futures::join!(
                    self.warm_popular_content(),
                    self.warm_critical_pages(),
                    self.warm_builder_templates(),
                );
                let mut results = batches.0;
                results.extend(batches.1);
                results.extend(batches.2);
                results
            }
            other => {
                tracing::warn!(strategy = %other, "Unknown warming strategy");
                Vec::new()
            }
        }
    }

    /// Re-fetch analytics-identified underperformers
    async fn warm_popular_content(&self) -> Vec<WarmingResult> {
        let metrics = self.analytics.metrics(Some(60));
        let candidates: Vec<String> = metrics
            .top_keys
            .into_iter()
            .filter(|k| k.hit_rate < POPULAR_HIT_RATE_CEILING && k.requests > POPULAR_MIN_REQUESTS)
            .map(|k| k.key)
            .collect();

        let futures = candidates.into_iter().map(|key| async move {
            let started = Instant::now();
            let source = self.source.clone();
            let fetch_key = key.clone();
            let outcome: Result<Value, CacheError> = self
                .cache
                .get_or_set(
                    &key,
                    move || async move { source.fetch_content(&fetch_key).await },
                    CacheOptions::default(),
                )
                .await;
            match outcome {
                Ok(_) => WarmingResult::ok(key, started),
                Err(e) => WarmingResult::failed(key, started, e),
            }
        });
        join_all(futures).await
    }

    /// Warm the fixed list of known-important pages
    async fn warm_critical_pages(&self) -> Vec<WarmingResult> {
        let futures = self.config.critical_pages.iter().map(|path| async move {
            let started = Instant::now();
            let key = format!("cache:page:{}", path);
            let source = self.source.clone();
            let fetch_path = path.clone();
            let outcome: Result<Value, CacheError> = self
                .cache
                .get_or_set(
                    &key,
                    move || async move { source.fetch_page(&fetch_path).await },
                    CacheOptions::with_strategy("static"),
                )
                .await;
            match outcome {
                Ok(_) => WarmingResult::ok(key, started),
                Err(e) => WarmingResult::failed(key, started, e),
            }
        });
        join_all(futures).await
    }

    /// Warm configured builder templates/components
    async fn warm_builder_templates(&self) -> Vec<WarmingResult> {
        let futures = self.config.builder_templates.iter().map(|id| async move {
            let started = Instant::now();
            let key = format!("component:{}:latest", id);
            let source = self.source.clone();
            let fetch_id = id.clone();
            let outcome: Result<Value, CacheError> = self
                .cache
                .get_or_set(
                    &key,
                    move || async move { source.fetch_template(&fetch_id).await },
                    CacheOptions::with_strategy("component"),
                )
                .await;
            match outcome {
                Ok(_) => WarmingResult::ok(key, started),
                Err(e) => WarmingResult::failed(key, started, e),
            }
        });
        join_all(futures).await
    }

    /// Enqueue a manual warming target; the queue is re-sorted by
    /// descending priority on every enqueue
    pub fn add_target(&self, target: WarmingTarget) {
        let mut queue = self.queue.lock();
        queue.push(target);
        queue.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// Number of targets currently queued
    pub fn queue_len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Drain and execute the manual queue front-to-back
    ///
    /// Guarded against concurrent runs: if a drain is already in progress
    /// this returns empty immediately instead of queueing another run.
    pub async fn execute_manual_warming(&self) -> Vec<WarmingResult> {
        if self
            .is_warming
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Manual warming already running, skipping");
            return Vec::new();
        }

        let targets: Vec<WarmingTarget> = std::mem::take(&mut *self.queue.lock());
        let mut results = Vec::with_capacity(targets.len());

        for target in targets {
            let started = Instant::now();
            match (target.fetcher)().await {
                Ok(value) => {
                    let stored = value.clone();
                    let outcome: Result<Value, CacheError> = self
                        .cache
                        .get_or_set(
                            &target.key,
                            move || async move { Ok(stored) },
                            CacheOptions::default().tagged(target.tags.clone()),
                        )
                        .await;
                    match outcome {
                        Ok(_) => results.push(WarmingResult::ok(&target.key, started)),
                        Err(e) => results.push(WarmingResult::failed(&target.key, started, e)),
                    }
                }
                Err(e) => {
                    tracing::warn!(key = %target.key, error = %e, "Warming target failed");
                    results.push(WarmingResult::failed(&target.key, started, e));
                }
            }
        }

        self.is_warming.store(false, Ordering::Release);
        results
    }

    /// Spawn interval timers for every enabled strategy with an interval
    pub fn start(self: &Arc<Self>) {
        let mut handles = self.handles.lock();
        for strategy in &self.config.strategies {
            let Some(interval_secs) = strategy.interval_secs else {
                continue;
            };
            if !strategy.enabled {
                continue;
            }

            let manager = self.clone();
            let name = strategy.name.clone();
            tracing::info!(strategy = %name, interval_secs = interval_secs, "Scheduling warming strategy");

            handles.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
                // First tick fires immediately; skip it so the schedule
                // starts one interval out
                interval.tick().await;
                loop {
                    interval.tick().await;
                    let results = manager.execute_strategy(&name).await;
                    let failures = results.iter().filter(|r| !r.success).count();
                    tracing::info!(
                        strategy = %name,
                        warmed = results.len() - failures,
                        failed = failures,
                        "Warming cycle complete"
                    );
                }
            }));
        }
    }

    /// Abort all scheduled warming tasks
    pub fn stop(&self) {
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
    }
}

impl Drop for CacheWarmingManager {
    fn drop(&mut self) {
        self.stop();
    }
}
