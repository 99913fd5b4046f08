// Cache module

pub mod analytics;
pub mod backend;
pub mod builder;
pub mod component;
pub mod error;
pub mod manager;
pub mod strategy;
pub mod warming;

pub use analytics::{AccessKind, CacheAccess, CacheAnalytics, CacheMetrics};
pub use backend::{CacheBackend, MemoryCacheBackend, MockCacheBackend, NullBackend};
pub use builder::BuilderCacheManager;
pub use component::ComponentCacheManager;
pub use error::CacheError;
pub use manager::{CacheManager, CacheOptions};
pub use strategy::{CacheStrategy, StrategyRegistry};
pub use warming::{
    CacheWarmingManager, ContentSource, WarmingConfig, WarmingResult, WarmingTarget,
};
