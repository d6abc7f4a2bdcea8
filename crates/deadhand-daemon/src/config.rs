//! Configuration file management.
//!
//! `config.toml` lives in the data directory (`$DEADHAND_DATA_DIR`, or
//! `~/.deadhand`). Every field has a default, so a missing file or a
//! partial file both load.

use std::path::PathBuf;
use std::time::Duration;

use deadhand_guardian::monitor::MonitorConfig;
use deadhand_sim::engine::SimulationConfig;
use deadhand_sim::estimate::ResponseAssumptions;
use deadhand_types::config::{
    HealthThresholds, DEFAULT_CRITICAL_DISPLAY_HOURS, DEFAULT_HEALTHY_HOURS, DEFAULT_WARNING_HOURS,
};
use deadhand_types::ConfigError;
use serde::{Deserialize, Serialize};

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub monitor: MonitorSection,
    #[serde(default)]
    pub simulation: SimulationSection,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub advanced: AdvancedConfig,
}

/// Guardian health monitoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSection {
    /// Relays to query. `file://` URLs and bare paths are relay directories.
    #[serde(default)]
    pub relays: Vec<String>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_relay_timeout")]
    pub relay_timeout_ms: u64,
    #[serde(default = "default_max_concurrent_queries")]
    pub max_concurrent_queries: usize,
    #[serde(default = "default_healthy_hours")]
    pub healthy_hours: f64,
    #[serde(default = "default_warning_hours")]
    pub warning_hours: f64,
    #[serde(default = "default_critical_display_hours")]
    pub critical_display_hours: f64,
}

/// Dry-run simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSection {
    /// Poll relays during a simulation instead of using the last poll.
    #[serde(default)]
    pub query_live_guardians: bool,
    #[serde(default = "default_healthy_response_hours")]
    pub healthy_response_hours: f64,
    #[serde(default = "default_warning_response_hours")]
    pub warning_response_hours: f64,
    #[serde(default = "default_release_processing_hours")]
    pub release_processing_hours: f64,
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory. Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
}

/// Advanced configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    /// Log level: "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log file path. Empty = stderr.
    #[serde(default)]
    pub log_file: String,
}

// Default value functions

fn default_poll_interval() -> u64 {
    15 * 60
}

fn default_relay_timeout() -> u64 {
    10_000
}

fn default_max_concurrent_queries() -> usize {
    16
}

fn default_healthy_hours() -> f64 {
    DEFAULT_HEALTHY_HOURS
}

fn default_warning_hours() -> f64 {
    DEFAULT_WARNING_HOURS
}

fn default_critical_display_hours() -> f64 {
    DEFAULT_CRITICAL_DISPLAY_HOURS
}

fn default_healthy_response_hours() -> f64 {
    ResponseAssumptions::default().healthy_response_hours
}

fn default_warning_response_hours() -> f64 {
    ResponseAssumptions::default().warning_response_hours
}

fn default_release_processing_hours() -> f64 {
    ResponseAssumptions::default().release_processing_hours
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            relays: Vec::new(),
            poll_interval_secs: default_poll_interval(),
            relay_timeout_ms: default_relay_timeout(),
            max_concurrent_queries: default_max_concurrent_queries(),
            healthy_hours: default_healthy_hours(),
            warning_hours: default_warning_hours(),
            critical_display_hours: default_critical_display_hours(),
        }
    }
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            query_live_guardians: false,
            healthy_response_hours: default_healthy_response_hours(),
            warning_response_hours: default_warning_response_hours(),
            release_processing_hours: default_release_processing_hours(),
        }
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_file: String::new(),
        }
    }
}

impl MonitorSection {
    /// Validated monitor settings.
    pub fn to_monitor_config(&self) -> Result<MonitorConfig, ConfigError> {
        let thresholds =
            HealthThresholds::new(self.healthy_hours, self.warning_hours, self.critical_display_hours)?;
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid("poll_interval_secs must be positive".into()));
        }
        let config = MonitorConfig {
            relays: self.relays.clone(),
            relay_timeout: Duration::from_millis(self.relay_timeout_ms),
            max_concurrent_queries: self.max_concurrent_queries,
            thresholds,
        };
        config.validate()?;
        Ok(config)
    }
}

impl SimulationSection {
    pub fn to_simulation_config(&self) -> SimulationConfig {
        SimulationConfig {
            query_live_guardians: self.query_live_guardians,
            response: ResponseAssumptions {
                healthy_response_hours: self.healthy_response_hours,
                warning_response_hours: self.warning_response_hours,
                release_processing_hours: self.release_processing_hours,
            },
        }
    }
}

impl DaemonConfig {
    /// Load configuration from the default config file location.
    ///
    /// Falls back to defaults if file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: DaemonConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> PathBuf {
        if self.storage.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.storage.data_dir)
        }
    }

    fn config_path() -> PathBuf {
        Self::default_data_dir().join("config.toml")
    }

    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("DEADHAND_DATA_DIR") {
            return PathBuf::from(dir);
        }
        std::env::var("HOME")
            .map(|h| PathBuf::from(h).join(".deadhand"))
            .unwrap_or_else(|_| PathBuf::from("/tmp/deadhand"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert!(config.monitor.relays.is_empty());
        assert_eq!(config.monitor.poll_interval_secs, 900);
        assert_eq!(config.monitor.healthy_hours, 24.0);
        assert!(!config.simulation.query_live_guardians);
        assert_eq!(config.advanced.log_level, "info");
    }

    #[test]
    fn test_config_serialization() {
        let config = DaemonConfig::default();
        let toml_str = toml::to_string(&config).expect("serialize");
        let _parsed: DaemonConfig = toml::from_str(&toml_str).expect("parse");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: DaemonConfig = toml::from_str(
            r#"
            [monitor]
            relays = ["file:///var/lib/relay-a"]
            warning_hours = 48.0

            [simulation]
            query_live_guardians = true
            "#,
        )
        .expect("parse");
        assert_eq!(parsed.monitor.relays.len(), 1);
        assert_eq!(parsed.monitor.warning_hours, 48.0);
        assert_eq!(parsed.monitor.relay_timeout_ms, 10_000);
        assert!(parsed.simulation.to_simulation_config().query_live_guardians);

        let monitor = parsed.monitor.to_monitor_config().expect("valid");
        assert_eq!(monitor.thresholds.warning_hours, 48.0);
        assert_eq!(monitor.relay_timeout, Duration::from_millis(10_000));
    }

    #[test]
    fn test_non_monotonic_thresholds_rejected() {
        let section = MonitorSection {
            healthy_hours: 80.0,
            ..MonitorSection::default()
        };
        assert!(matches!(
            section.to_monitor_config(),
            Err(ConfigError::NonMonotonicThresholds { .. })
        ));
    }
}
