//! Cache analytics
//!
//! Records every cache access (hit/miss/stale/error) with latency and size
//! into a bounded, append-only history, and derives rolling-window metrics,
//! threshold-based insights and a composite performance score from it. The
//! history is observational only, never authoritative cache state.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

use crate::config::CacheSettings;

/// Outcome of a single cache access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessKind {
    Hit,
    Miss,
    Stale,
    Error,
}

/// One recorded cache access. Immutable once appended.
#[derive(Debug, Clone, Serialize)]
pub struct CacheAccess {
    pub key: String,
    pub timestamp: DateTime<Utc>,
    pub kind: AccessKind,
    pub response_time_ms: f64,
    pub size_bytes: Option<u64>,
    pub tags: Option<Vec<String>>,
    pub strategy: Option<String>,
}

impl CacheAccess {
    /// Convenience constructor stamping the current time
    pub fn now(key: impl Into<String>, kind: AccessKind, response_time_ms: f64) -> Self {
        Self {
            key: key.into(),
            timestamp: Utc::now(),
            kind,
            response_time_ms,
            size_bytes: None,
            tags: None,
            strategy: None,
        }
    }

    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = Some(size_bytes);
        self
    }

    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = Some(strategy.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }
}

/// Per-key aggregate within a metrics window
#[derive(Debug, Clone, Serialize)]
pub struct KeyMetrics {
    pub key: String,
    pub requests: u64,
    pub hits: u64,
    pub hit_rate: f64,
}

/// Per-strategy aggregate within a metrics window
#[derive(Debug, Clone, Default, Serialize)]
pub struct StrategyMetrics {
    pub requests: u64,
    pub hits: u64,
    pub hit_rate: f64,
    pub avg_response_time_ms: f64,
}

/// Windowed metrics snapshot
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheMetrics {
    pub total_requests: u64,
    pub hits: u64,
    pub misses: u64,
    pub stale_hits: u64,
    pub errors: u64,
    /// Percentage: (hits + stale) / total * 100, 0.0 when there is no traffic
    pub hit_rate: f64,
    pub avg_response_time_ms: f64,
    pub total_size_bytes: u64,
    /// Top 10 keys by request count
    pub top_keys: Vec<KeyMetrics>,
    pub strategies: HashMap<String, StrategyMetrics>,
}

/// Append-only analytics recorder with a bounded ring history
pub struct CacheAnalytics {
    history: Mutex<VecDeque<CacheAccess>>,
    max_history_size: usize,
    min_hit_rate: f64,
    max_response_time_ms: f64,
    max_error_rate: f64,
}

impl CacheAnalytics {
    pub fn new(settings: &CacheSettings) -> Self {
        Self {
            history: Mutex::new(VecDeque::new()),
            max_history_size: settings.max_history_size,
            min_hit_rate: settings.min_hit_rate,
            max_response_time_ms: settings.max_response_time_ms,
            max_error_rate: settings.max_error_rate,
        }
    }

    /// Append an access record, evicting from the front when over capacity
    pub fn record_access(&self, access: CacheAccess) {
        let mut history = self.history.lock();
        history.push_back(access);
        while history.len() > self.max_history_size {
            history.pop_front();
        }
    }

    /// Number of records currently held
    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }

    /// Compute metrics over the last `window_minutes`, or all history if None
    pub fn metrics(&self, window_minutes: Option<i64>) -> CacheMetrics {
        let history = self.history.lock();
        let cutoff = window_minutes.map(|m| Utc::now() - ChronoDuration::minutes(m));

        let window: Vec<&CacheAccess> = history
            .iter()
            .filter(|a| cutoff.map(|c| a.timestamp >= c).unwrap_or(true))
            .collect();

        let total = window.len() as u64;
        if total == 0 {
            return CacheMetrics::default();
        }

        let mut metrics = CacheMetrics {
            total_requests: total,
            ..Default::default()
        };

        let mut response_time_sum = 0.0;
        let mut per_key: HashMap<&str, (u64, u64)> = HashMap::new();
        let mut per_strategy: HashMap<&str, (u64, u64, f64)> = HashMap::new();

        for access in &window {
            match access.kind {
                AccessKind::Hit => metrics.hits += 1,
                AccessKind::Miss => metrics.misses += 1,
                AccessKind::Stale => metrics.stale_hits += 1,
                AccessKind::Error => metrics.errors += 1,
            }
            response_time_sum += access.response_time_ms;
            metrics.total_size_bytes += access.size_bytes.unwrap_or(0);

            let key_entry = per_key.entry(access.key.as_str()).or_default();
            key_entry.0 += 1;
            if matches!(access.kind, AccessKind::Hit | AccessKind::Stale) {
                key_entry.1 += 1;
            }

            if let Some(strategy) = &access.strategy {
                let entry = per_strategy.entry(strategy.as_str()).or_default();
                entry.0 += 1;
                if matches!(access.kind, AccessKind::Hit | AccessKind::Stale) {
                    entry.1 += 1;
                }
                entry.2 += access.response_time_ms;
            }
        }

        metrics.hit_rate = (metrics.hits + metrics.stale_hits) as f64 / total as f64 * 100.0;
        metrics.avg_response_time_ms = response_time_sum / total as f64;

        let mut keys: Vec<KeyMetrics> = per_key
            .into_iter()
            .map(|(key, (requests, hits))| KeyMetrics {
                key: key.to_string(),
                requests,
                hits,
                hit_rate: hits as f64 / requests as f64 * 100.0,
            })
            .collect();
        keys.sort_by(|a, b| b.requests.cmp(&a.requests).then(a.key.cmp(&b.key)));
        keys.truncate(10);
        metrics.top_keys = keys;

        metrics.strategies = per_strategy
            .into_iter()
            .map(|(name, (requests, hits, time_sum))| {
                (
                    name.to_string(),
                    StrategyMetrics {
                        requests,
                        hits,
                        hit_rate: hits as f64 / requests as f64 * 100.0,
                        avg_response_time_ms: time_sum / requests as f64,
                    },
                )
            })
            .collect();

        metrics
    }

    /// Generate human-readable performance warnings for the last hour
    pub fn insights(&self) -> Vec<String> {
        self.insights_for_window(60)
    }

    /// Generate threshold-based warnings over the given window. Advisory only.
    pub fn insights_for_window(&self, window_minutes: i64) -> Vec<String> {
        let metrics = self.metrics(Some(window_minutes));
        let mut insights = Vec::new();

        if metrics.total_requests == 0 {
            return insights;
        }

        if metrics.hit_rate < self.min_hit_rate {
            insights.push(format!(
                "Hit rate {:.1}% is below the {:.1}% target; consider longer TTLs or warming",
                metrics.hit_rate, self.min_hit_rate
            ));
        }

        if metrics.avg_response_time_ms > self.max_response_time_ms {
            insights.push(format!(
                "Average response time {:.1}ms exceeds the {:.1}ms target",
                metrics.avg_response_time_ms, self.max_response_time_ms
            ));
        }

        let error_rate = metrics.errors as f64 / metrics.total_requests as f64 * 100.0;
        if error_rate > self.max_error_rate {
            insights.push(format!(
                "Error rate {:.1}% exceeds the {:.1}% threshold; check backend health",
                error_rate, self.max_error_rate
            ));
        }

        for (name, strategy) in &metrics.strategies {
            if strategy.requests > 10 && strategy.hit_rate < 50.0 {
                insights.push(format!(
                    "Strategy '{}' is underperforming: {:.1}% hit rate over {} requests",
                    name, strategy.hit_rate, strategy.requests
                ));
            }
        }

        insights
    }

    /// Composite performance score in [0, 100]
    ///
    /// Weighted: hit rate 50%, response-time score 30%, error-rate score 20%.
    /// Returns 100 when there is no traffic (optimistic default).
    pub fn performance_score(&self) -> u32 {
        let metrics = self.metrics(Some(60));
        if metrics.total_requests == 0 {
            return 100;
        }

        let response_score = (100.0 - metrics.avg_response_time_ms / 10.0).max(0.0);
        let error_rate = metrics.errors as f64 / metrics.total_requests as f64 * 100.0;
        let error_score = (100.0 - error_rate * 10.0).max(0.0);

        let score = metrics.hit_rate * 0.5 + response_score * 0.3 + error_score * 0.2;
        score.clamp(0.0, 100.0).round() as u32
    }
}
