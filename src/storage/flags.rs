//! Storage feature flags
//!
//! Runtime switches controlling whether uploads hit the real backend or the
//! mock. The resolution order in `should_use_real` is strict: an explicit
//! force wins over an explicit mode, which wins over environment heuristics.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::env;
use tracing::info;

use crate::config::env_flag;

/// Requested storage mode before availability is taken into account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageModePreference {
    Mock,
    Real,
    Auto,
}

impl Default for StorageModePreference {
    fn default() -> Self {
        StorageModePreference::Auto
    }
}

/// Snapshot of all storage feature flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct R2FeatureFlags {
    /// Requested mode; Auto resolves from environment and availability
    #[serde(default)]
    pub mode: StorageModePreference,
    /// Overrides everything else and forces the real backend
    #[serde(default)]
    pub force_real: bool,
    #[serde(default = "default_true")]
    pub enable_health_check: bool,
    #[serde(default)]
    pub enable_detailed_logging: bool,
    /// Allow routing to the mock backend when the real one fails
    #[serde(default = "default_true")]
    pub fallback_to_mock: bool,
    #[serde(default)]
    pub test_mode: bool,
    /// True when running in the production environment
    #[serde(default)]
    pub production: bool,
}

fn default_true() -> bool {
    true
}

impl Default for R2FeatureFlags {
    fn default() -> Self {
        Self {
            mode: StorageModePreference::Auto,
            force_real: false,
            enable_health_check: true,
            enable_detailed_logging: false,
            fallback_to_mock: true,
            test_mode: false,
            production: false,
        }
    }
}

impl R2FeatureFlags {
    /// Read flags from environment variables
    pub fn from_env() -> Self {
        let mode = match env::var("R2_MODE").unwrap_or_default().to_lowercase().as_str() {
            "mock" => StorageModePreference::Mock,
            "real" => StorageModePreference::Real,
            _ => StorageModePreference::Auto,
        };

        Self {
            mode,
            force_real: env_flag("R2_FORCE_REAL"),
            enable_health_check: flag_or("R2_ENABLE_HEALTH_CHECK", true),
            enable_detailed_logging: env_flag("R2_DETAILED_LOGGING"),
            fallback_to_mock: flag_or("R2_FALLBACK_TO_MOCK", true),
            test_mode: env_flag("R2_TEST_MODE"),
            production: env::var("ENVIRONMENT")
                .map(|v| v.eq_ignore_ascii_case("production"))
                .unwrap_or(false),
        }
    }

    /// Decide whether the real backend should serve the next operation.
    ///
    /// `real_available` means the real client is constructed and its last
    /// health check (if any) passed.
    pub fn should_use_real(&self, real_available: bool) -> bool {
        if self.force_real {
            return true;
        }
        match self.mode {
            StorageModePreference::Mock => false,
            StorageModePreference::Real => true,
            StorageModePreference::Auto => {
                if self.production {
                    return true;
                }
                if real_available {
                    return true;
                }
                // Real is down; honor fallback_to_mock, otherwise keep
                // trying the real backend and surface its errors
                !self.fallback_to_mock
            }
        }
    }
}

fn flag_or(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(v) if !v.is_empty() => matches!(
            v.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        _ => default,
    }
}

/// Thread-safe holder for the current flag set
pub struct FeatureFlagManager {
    flags: RwLock<R2FeatureFlags>,
}

impl FeatureFlagManager {
    pub fn new(flags: R2FeatureFlags) -> Self {
        Self {
            flags: RwLock::new(flags),
        }
    }

    pub fn from_env() -> Self {
        Self::new(R2FeatureFlags::from_env())
    }

    /// Current flag snapshot
    pub fn flags(&self) -> R2FeatureFlags {
        self.flags.read().clone()
    }

    /// Apply a partial update through a closure
    pub fn update(&self, apply: impl FnOnce(&mut R2FeatureFlags)) {
        let mut flags = self.flags.write();
        apply(&mut flags);
        info!(flags = ?*flags, "Storage feature flags updated");
    }

    /// Reset to defaults
    pub fn reset(&self) {
        *self.flags.write() = R2FeatureFlags::default();
    }

    pub fn should_use_real(&self, real_available: bool) -> bool {
        self.flags.read().should_use_real(real_available)
    }
}

impl Default for FeatureFlagManager {
    fn default() -> Self {
        Self::new(R2FeatureFlags::default())
    }
}
