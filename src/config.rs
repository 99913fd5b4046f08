// Configuration module
//
// Config is deserialized from YAML with serde defaults, mirroring the shape
// of the deployment environment. Credentials and rollout knobs can also be
// picked up from environment variables via `from_env`.

use serde::{Deserialize, Serialize};
use std::env;

use crate::error::SuzakuError;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SuzakuConfig {
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub migration: MigrationSettings,
}

impl SuzakuConfig {
    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, SuzakuError> {
        let config: SuzakuConfig = serde_yaml::from_str(yaml)
            .map_err(|e| SuzakuError::Config(format!("Invalid config YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the full configuration
    pub fn validate(&self) -> Result<(), SuzakuError> {
        self.cache.validate().map_err(SuzakuError::Config)?;
        self.migration.validate().map_err(SuzakuError::Config)?;
        Ok(())
    }
}

/// Cache-layer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Maximum number of analytics access records kept in history
    #[serde(default = "default_max_history_size")]
    pub max_history_size: usize,
    /// Hit rate below this percentage triggers an insight warning
    #[serde(default = "default_min_hit_rate")]
    pub min_hit_rate: f64,
    /// Mean response time above this (ms) triggers an insight warning
    #[serde(default = "default_max_response_time_ms")]
    pub max_response_time_ms: f64,
    /// Error rate above this percentage triggers an insight warning
    #[serde(default = "default_max_error_rate")]
    pub max_error_rate: f64,
    /// Maximum total size of the in-process component cache in bytes
    #[serde(default = "default_component_cache_size_bytes")]
    pub component_cache_size_bytes: u64,
    /// Payloads larger than this (bytes) are compressed before caching
    #[serde(default = "default_compression_threshold_bytes")]
    pub compression_threshold_bytes: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_history_size: default_max_history_size(),
            min_hit_rate: default_min_hit_rate(),
            max_response_time_ms: default_max_response_time_ms(),
            max_error_rate: default_max_error_rate(),
            component_cache_size_bytes: default_component_cache_size_bytes(),
            compression_threshold_bytes: default_compression_threshold_bytes(),
        }
    }
}

fn default_max_history_size() -> usize {
    10_000
}

fn default_min_hit_rate() -> f64 {
    70.0
}

fn default_max_response_time_ms() -> f64 {
    500.0
}

fn default_max_error_rate() -> f64 {
    5.0
}

fn default_component_cache_size_bytes() -> u64 {
    50 * 1024 * 1024 // 50MB
}

fn default_compression_threshold_bytes() -> usize {
    1024
}

impl CacheSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_history_size == 0 {
            return Err("max_history_size must be greater than zero".to_string());
        }
        if !(0.0..=100.0).contains(&self.min_hit_rate) {
            return Err(format!(
                "min_hit_rate must be between 0 and 100, got {}",
                self.min_hit_rate
            ));
        }
        Ok(())
    }
}

/// Storage backend configuration
///
/// Credentials are optional: without them the router runs mock-only.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    /// Custom public domain for generated URLs (overrides the r2.dev default)
    #[serde(default)]
    pub public_domain: Option<String>,
    /// Root directory for the mock (filesystem) backend
    #[serde(default = "default_mock_root")]
    pub mock_root: String,
    /// Minimum seconds between health-check probes
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,
}

fn default_mock_root() -> String {
    "/tmp/suzaku-mock-storage".to_string()
}

fn default_health_check_interval_secs() -> u64 {
    300 // 5 minutes
}

impl StorageConfig {
    /// Read storage configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            account_id: env::var("R2_ACCOUNT_ID").ok().filter(|v| !v.is_empty()),
            bucket: env::var("R2_BUCKET").ok().filter(|v| !v.is_empty()),
            access_key_id: env::var("R2_ACCESS_KEY_ID").ok().filter(|v| !v.is_empty()),
            secret_access_key: env::var("R2_SECRET_ACCESS_KEY")
                .ok()
                .filter(|v| !v.is_empty()),
            public_domain: env::var("R2_PUBLIC_DOMAIN").ok().filter(|v| !v.is_empty()),
            mock_root: env::var("MOCK_STORAGE_ROOT").unwrap_or_else(|_| default_mock_root()),
            health_check_interval_secs: env::var("STORAGE_HEALTH_CHECK_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_health_check_interval_secs),
        }
    }

    /// True when every credential needed to build a real client is present
    pub fn has_real_credentials(&self) -> bool {
        self.account_id.is_some()
            && self.bucket.is_some()
            && self.access_key_id.is_some()
            && self.secret_access_key.is_some()
    }
}

/// Migration rollout settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationSettings {
    /// Percentage of operations routed to the new router (0-100)
    #[serde(default)]
    pub rollout_percentage: u32,
    /// Run every operation against both routers and compare results
    #[serde(default)]
    pub enable_comparison: bool,
    /// Gate for comparison mode; both must be set to dual-execute
    #[serde(default)]
    pub enable_testing: bool,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            rollout_percentage: 0,
            enable_comparison: false,
            enable_testing: false,
        }
    }
}

impl MigrationSettings {
    /// Read migration settings from environment variables
    pub fn from_env() -> Self {
        Self {
            rollout_percentage: env::var("STORAGE_ROLLOUT_PERCENTAGE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            enable_comparison: env_flag("STORAGE_ENABLE_COMPARISON"),
            enable_testing: env_flag("STORAGE_ENABLE_TESTING"),
        }
    }

    /// Both switches must be on for dual execution
    pub fn comparison_enabled(&self) -> bool {
        self.enable_comparison && self.enable_testing
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.rollout_percentage > 100 {
            return Err(format!(
                "rollout_percentage must be between 0 and 100, got {}",
                self.rollout_percentage
            ));
        }
        Ok(())
    }
}

/// Interpret an environment variable as a boolean flag
pub(crate) fn env_flag(name: &str) -> bool {
    matches!(
        env::var(name).unwrap_or_default().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_create_empty_config() {
        let _config = SuzakuConfig::default();
    }

    #[test]
    fn test_can_deserialize_minimal_config_from_yaml() {
        let yaml = r#"{}"#;
        let config = SuzakuConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.cache.max_history_size, 10_000);
        assert_eq!(config.migration.rollout_percentage, 0);
    }

    #[test]
    fn test_cache_settings_defaults() {
        let settings = CacheSettings::default();
        assert_eq!(settings.max_history_size, 10_000);
        assert_eq!(settings.min_hit_rate, 70.0);
        assert_eq!(settings.max_response_time_ms, 500.0);
        assert_eq!(settings.max_error_rate, 5.0);
        assert_eq!(settings.compression_threshold_bytes, 1024);
    }

    #[test]
    fn test_can_parse_cache_section() {
        let yaml = r#"
cache:
  max_history_size: 500
  min_hit_rate: 60
"#;
        let config = SuzakuConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.cache.max_history_size, 500);
        assert_eq!(config.cache.min_hit_rate, 60.0);
    }

    #[test]
    fn test_invalid_yaml_surfaces_config_error() {
        let err = SuzakuConfig::from_yaml("cache:\n  max_history_size: not-a-number").unwrap_err();
        assert!(matches!(err, SuzakuError::Config(_)));
        assert!(err.to_string().contains("Invalid config YAML"));
    }

    #[test]
    fn test_validation_failure_surfaces_config_error() {
        let yaml = r#"
migration:
  rollout_percentage: 150
"#;
        let err = SuzakuConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, SuzakuError::Config(_)));
        assert!(err.to_string().contains("rollout_percentage"));
    }

    #[test]
    fn test_rejects_zero_history_size() {
        let settings = CacheSettings {
            max_history_size: 0,
            ..Default::default()
        };
        let result = settings.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("max_history_size"));
    }

    #[test]
    fn test_rejects_rollout_percentage_over_100() {
        let settings = MigrationSettings {
            rollout_percentage: 150,
            ..Default::default()
        };
        let result = settings.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("rollout_percentage"));
    }

    #[test]
    fn test_storage_config_detects_missing_credentials() {
        let config = StorageConfig::default();
        assert!(!config.has_real_credentials());

        let config = StorageConfig {
            account_id: Some("acct".to_string()),
            bucket: Some("media".to_string()),
            access_key_id: Some("key".to_string()),
            secret_access_key: Some("secret".to_string()),
            ..Default::default()
        };
        assert!(config.has_real_credentials());
    }

    #[test]
    fn test_can_parse_storage_section() {
        let yaml = r#"
storage:
  bucket: media
  public_domain: cdn.example.com
  health_check_interval_secs: 60
"#;
        let config = SuzakuConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.storage.bucket.as_deref(), Some("media"));
        assert_eq!(config.storage.public_domain.as_deref(), Some("cdn.example.com"));
        assert_eq!(config.storage.health_check_interval_secs, 60);
    }

    #[test]
    fn test_can_parse_migration_section() {
        let yaml = r#"
migration:
  rollout_percentage: 30
  enable_comparison: true
  enable_testing: true
"#;
        let config = SuzakuConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.migration.rollout_percentage, 30);
        assert!(config.migration.enable_comparison);
        assert!(config.migration.enable_testing);
    }
}
