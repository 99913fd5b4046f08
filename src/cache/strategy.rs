//! Cache strategies
//!
//! A strategy is a named, static policy bundle (TTL, base tags, warmup and
//! compression toggles). Strategies are selected per content item by a pure
//! content-shape predicate, never mutated at runtime.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Named cache policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheStrategy {
    pub name: String,
    /// Time to live in seconds
    pub ttl_seconds: u64,
    /// Base tags applied to every entry cached under this strategy
    #[serde(default)]
    pub tags: Vec<String>,
    /// Whether warming loops should consider entries under this strategy
    #[serde(default)]
    pub warmup: bool,
    /// Whether oversized payloads are compressed
    #[serde(default)]
    pub compression: bool,
    /// Whether the content carries per-variant sub-keys
    #[serde(default)]
    pub variations: bool,
}

impl CacheStrategy {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

/// Static registry of named strategies
#[derive(Debug, Clone)]
pub struct StrategyRegistry {
    strategies: HashMap<String, CacheStrategy>,
}

impl StrategyRegistry {
    /// Build the built-in strategy table
    pub fn builtin() -> Self {
        let mut strategies = HashMap::new();
        for strategy in [
            CacheStrategy {
                name: "default".to_string(),
                ttl_seconds: 300,
                tags: vec!["builder".to_string()],
                warmup: false,
                compression: false,
                variations: false,
            },
            CacheStrategy {
                name: "static".to_string(),
                ttl_seconds: 3600,
                tags: vec!["builder".to_string(), "static".to_string()],
                warmup: true,
                compression: true,
                variations: false,
            },
            CacheStrategy {
                name: "dynamic".to_string(),
                ttl_seconds: 60,
                tags: vec!["builder".to_string(), "dynamic".to_string()],
                warmup: false,
                compression: false,
                variations: false,
            },
            CacheStrategy {
                name: "variations".to_string(),
                ttl_seconds: 120,
                tags: vec!["builder".to_string(), "variations".to_string()],
                warmup: false,
                compression: false,
                variations: true,
            },
            CacheStrategy {
                name: "component".to_string(),
                ttl_seconds: 1800,
                tags: vec!["component".to_string()],
                warmup: true,
                compression: true,
                variations: false,
            },
        ] {
            strategies.insert(strategy.name.clone(), strategy);
        }
        Self { strategies }
    }

    /// Look up a strategy by name, falling back to `default` for unknown names
    pub fn get(&self, name: &str) -> &CacheStrategy {
        self.strategies
            .get(name)
            .unwrap_or_else(|| &self.strategies["default"])
    }

    /// Select a strategy from content shape
    ///
    /// Pure function: code-bearing content is volatile so it gets the short
    /// `dynamic` TTL; content declaring variations gets the variant-aware
    /// strategy; everything else falls back to `default`.
    pub fn select_for_content(&self, content: &Value) -> &CacheStrategy {
        if content_has_code(content) {
            self.get("dynamic")
        } else if content_has_variations(content) {
            self.get("variations")
        } else {
            self.get("default")
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.strategies.keys().cloned().collect()
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn content_has_code(content: &Value) -> bool {
    let data = content.get("data").unwrap_or(content);
    ["jsCode", "tsCode", "cssCode", "customCode"]
        .iter()
        .any(|field| {
            data.get(field)
                .and_then(|v| v.as_str())
                .map(|s| !s.is_empty())
                .unwrap_or(false)
        })
}

fn content_has_variations(content: &Value) -> bool {
    content
        .get("variations")
        .map(|v| match v {
            Value::Array(arr) => !arr.is_empty(),
            Value::Object(map) => !map.is_empty(),
            _ => false,
        })
        .unwrap_or(false)
}
