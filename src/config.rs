//! Configuration for the SPL meter agent.

use crate::core::aggregator::{DECIMAL_PLACES, MAX_SAMPLES, RETENTION};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Silicon Laboratories, Inc.
pub const DEFAULT_VENDOR_ID: u16 = 0x10C4;

/// CP2112-based WL100 meter.
pub const DEFAULT_PRODUCT_ID: u16 = 0x82CD;

/// Main configuration for the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which device to bind and how to reconnect
    pub device: DeviceConfig,

    /// History limits and rounding
    pub aggregator: AggregatorConfig,

    /// Delay between polls in milliseconds (10ms is ~100 polls per second)
    pub poll_interval_ms: u64,

    /// How often a report is written
    #[serde(with = "duration_serde")]
    pub report_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            aggregator: AggregatorConfig::default(),
            poll_interval_ms: 10,
            report_interval: Duration::from_secs(1),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults if it is missing.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("spl-meter-agent")
            .join("config.json")
    }

    /// Reject settings the aggregator or monitor cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.aggregator.max_samples == 0 {
            return Err(ConfigError::Invalid(
                "aggregator.max_samples must be at least 1".to_string(),
            ));
        }
        if self.aggregator.decimal_places > 10 {
            return Err(ConfigError::Invalid(format!(
                "aggregator.decimal_places must be at most 10, got {}",
                self.aggregator.decimal_places
            )));
        }
        if self.report_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "report_interval must be at least one second".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Device identity and reconnect policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub vendor_id: u16,
    pub product_id: u16,

    /// Wait after a failed re-open before the next attempt
    #[serde(with = "duration_serde")]
    pub reconnect_backoff: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            vendor_id: DEFAULT_VENDOR_ID,
            product_id: DEFAULT_PRODUCT_ID,
            reconnect_backoff: Duration::from_secs(1),
        }
    }
}

/// Sample history limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Maximum number of retained samples
    pub max_samples: usize,

    /// Samples older than this are dropped
    #[serde(with = "duration_serde")]
    pub retention: Duration,

    /// Decimal places of the window averages
    pub decimal_places: u32,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            max_samples: MAX_SAMPLES,
            retention: RETENTION,
            decimal_places: DECIMAL_PLACES,
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("spl-meter-config-test-{}", std::process::id()))
            .join(name)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.device.vendor_id, 0x10C4);
        assert_eq!(config.device.product_id, 0x82CD);
        assert_eq!(config.device.reconnect_backoff, Duration::from_secs(1));
        assert_eq!(config.aggregator.max_samples, 100_000);
        assert_eq!(config.aggregator.retention, Duration::from_secs(1800));
        assert_eq!(config.aggregator.decimal_places, 2);
        assert_eq!(config.poll_interval(), Duration::from_millis(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"aggregator": {"retention": 60}}"#).unwrap();
        assert_eq!(config.aggregator.retention, Duration::from_secs(60));
        assert_eq!(config.aggregator.max_samples, 100_000);
        assert_eq!(config.device.vendor_id, DEFAULT_VENDOR_ID);
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = Config::default();
        config.aggregator.max_samples = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_save_and_load() {
        let path = temp_path("save_and_load.json");
        let mut config = Config::default();
        config.device.product_id = 0x1234;
        config.aggregator.retention = Duration::from_secs(900);

        config.save_to(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_missing_file_is_default() {
        let loaded = Config::load_from(&temp_path("does_not_exist.json")).unwrap();
        assert_eq!(loaded, Config::default());
    }

    #[test]
    fn test_malformed_file() {
        let path = temp_path("malformed.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::ParseError(_))
        ));

        let _ = std::fs::remove_file(&path);
    }
}
