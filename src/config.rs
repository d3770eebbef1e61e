//! Configuration management for Energy Price Level
//!
//! This module handles loading, validation, and management of the service
//! configuration from YAML files.

use crate::error::{PriceLevelError, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Environment variable pointing at an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "ENERGY_PRICE_LEVEL_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Last-known-value cache configuration
    pub persistence: PersistenceConfig,

    /// Timezone used to determine the current hour ("local" or an IANA name)
    pub timezone: String,

    /// Configured price level sensors, one per upstream entity
    pub sensors: Vec<SensorEntryConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Path to log file (or directory for the rolling appender)
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to the console (stderr)
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// Persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// JSON file holding the last published state of every sensor
    pub state_file: String,
}

/// A configured sensor entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorEntryConfig {
    /// Stable entry identifier; the sensor unique id derives from it
    pub entry_id: String,

    /// Upstream price entity to observe
    pub source_sensor: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/tmp/energy_price_level.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            state_file: "/data/energy_price_level_state.json".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            persistence: PersistenceConfig::default(),
            timezone: "local".to_string(),
            sensors: Vec::new(),
        }
    }
}

/// Timezone used when computing the current hour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HourZone {
    /// System local time
    Local,
    /// A named IANA zone
    Named(Tz),
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the first existing default location
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV)
            && !path.is_empty()
        {
            return Self::from_file(path);
        }

        let default_paths = [
            "energy_price_level.yaml",
            "/data/energy_price_level.yaml",
            "/etc/energy-price-level/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Resolve the configured timezone
    pub fn hour_zone(&self) -> Result<HourZone> {
        let tz = self.timezone.trim();
        if tz.is_empty() || tz.eq_ignore_ascii_case("local") {
            return Ok(HourZone::Local);
        }
        tz.parse::<Tz>().map(HourZone::Named).map_err(|_| {
            PriceLevelError::validation("timezone".to_string(), format!("Unknown timezone: {}", tz))
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        crate::logging::parse_log_level(&self.logging.level).map_err(|_| {
            PriceLevelError::validation(
                "logging.level".to_string(),
                format!("Invalid log level: {}", self.logging.level),
            )
        })?;

        if self.persistence.state_file.trim().is_empty() {
            return Err(PriceLevelError::validation(
                "persistence.state_file",
                "State file path cannot be empty",
            ));
        }

        self.hour_zone()?;

        let mut seen_sources = HashSet::new();
        let mut seen_entries = HashSet::new();
        for (i, sensor) in self.sensors.iter().enumerate() {
            if sensor.entry_id.trim().is_empty() {
                return Err(PriceLevelError::validation(
                    format!("sensors[{}].entry_id", i),
                    "Entry id cannot be empty".to_string(),
                ));
            }
            if !crate::setup::is_valid_entity_id(&sensor.source_sensor) {
                return Err(PriceLevelError::validation(
                    format!("sensors[{}].source_sensor", i),
                    format!("Invalid entity id: {}", sensor.source_sensor),
                ));
            }
            if !seen_entries.insert(sensor.entry_id.as_str()) {
                return Err(PriceLevelError::validation(
                    format!("sensors[{}].entry_id", i),
                    format!("Duplicate entry id: {}", sensor.entry_id),
                ));
            }
            if !seen_sources.insert(sensor.source_sensor.as_str()) {
                return Err(PriceLevelError::validation(
                    format!("sensors[{}].source_sensor", i),
                    format!("Source sensor already configured: {}", sensor.source_sensor),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(entry_id: &str, source: &str) -> SensorEntryConfig {
        SensorEntryConfig {
            entry_id: entry_id.to_string(),
            source_sensor: source.to_string(),
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.timezone, "local");
        assert_eq!(config.logging.level, "INFO");
        assert!(config.sensors.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.sensors.push(entry("a", "sensor.nordpool"));
        assert!(config.validate().is_ok());

        config.sensors.push(entry("b", "sensor.nordpool"));
        assert!(config.validate().is_err());

        config = Config::default();
        config.timezone = "Mars/Olympus".to_string();
        assert!(config.validate().is_err());

        config = Config::default();
        config.logging.level = "LOUD".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_hour_zone() {
        let mut config = Config::default();
        assert_eq!(config.hour_zone().unwrap(), HourZone::Local);
        config.timezone = "Europe/Amsterdam".to_string();
        assert_eq!(
            config.hour_zone().unwrap(),
            HourZone::Named(chrono_tz::Europe::Amsterdam)
        );
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "timezone: Europe/Oslo\nsensors:\n  - entry_id: abc\n    source_sensor: sensor.nordpool_kwh_no1\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.logging.backup_count, 5);
        assert_eq!(config.sensors.len(), 1);
        assert!(config.validate().is_ok());
    }
}
