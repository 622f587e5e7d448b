//! Hub configuration

use anyhow::{Context, Result};
use hub_lib::{StoreConfig, SweeperConfig};
use serde::Deserialize;
use std::time::Duration;

/// Environment variable prefix, e.g. `GPU_HUB_PORT=5000`
pub const ENV_PREFIX: &str = "GPU_HUB";

/// Hub configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Name of this hub instance in structured logs
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// Listen address
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port for ingest, query, health and metrics
    #[serde(default = "default_port")]
    pub port: u16,

    /// Seconds without an update before an agent is reported offline
    #[serde(default = "default_data_timeout")]
    pub data_timeout_secs: u64,

    /// History points retained per agent
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Minimum seconds between two history points of one agent
    #[serde(default = "default_history_min_interval")]
    pub history_min_interval_secs: u64,

    /// Seconds between retention sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Seconds without an update before an agent is forgotten, 0 to keep forever
    #[serde(default = "default_eviction_timeout")]
    pub eviction_timeout_secs: u64,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "gpu-hub".to_string())
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_data_timeout() -> u64 {
    60
}

fn default_history_capacity() -> usize {
    100
}

fn default_history_min_interval() -> u64 {
    5
}

fn default_sweep_interval() -> u64 {
    10
}

fn default_eviction_timeout() -> u64 {
    3600
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            host: default_host(),
            port: default_port(),
            data_timeout_secs: default_data_timeout(),
            history_capacity: default_history_capacity(),
            history_min_interval_secs: default_history_min_interval(),
            sweep_interval_secs: default_sweep_interval(),
            eviction_timeout_secs: default_eviction_timeout(),
        }
    }
}

impl HubConfig {
    /// Load configuration from `GPU_HUB_*` environment variables
    pub fn load() -> Result<Self> {
        let source = config::Environment::with_prefix(ENV_PREFIX).try_parsing(true);
        Self::from_builder(config::Config::builder().add_source(source))
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self> {
        builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid hub configuration")
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            data_timeout: Duration::from_secs(self.data_timeout_secs),
            history_capacity: self.history_capacity,
            history_min_interval: Duration::from_secs(self.history_min_interval_secs),
        }
    }

    pub fn sweeper_config(&self) -> SweeperConfig {
        SweeperConfig {
            interval: Duration::from_secs(self.sweep_interval_secs),
            eviction_timeout: match self.eviction_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let config = HubConfig::from_builder(config::Config::builder()).unwrap();

        assert_eq!(config.port, 5000);
        assert_eq!(config.bind_addr(), "0.0.0.0:5000");

        let store = config.store_config();
        assert_eq!(store.data_timeout, Duration::from_secs(60));
        assert_eq!(store.history_capacity, 100);
        assert_eq!(store.history_min_interval, Duration::from_secs(5));

        let sweeper = config.sweeper_config();
        assert_eq!(sweeper.interval, Duration::from_secs(10));
        assert_eq!(sweeper.eviction_timeout, Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_overrides_and_disabled_eviction() {
        let builder = config::Config::builder()
            .set_override("port", 6001)
            .unwrap()
            .set_override("data_timeout_secs", 2)
            .unwrap()
            .set_override("eviction_timeout_secs", 0)
            .unwrap();

        let config = HubConfig::from_builder(builder).unwrap();
        assert_eq!(config.port, 6001);
        assert_eq!(config.store_config().data_timeout, Duration::from_secs(2));
        assert_eq!(config.sweeper_config().eviction_timeout, None);
    }

    #[test]
    fn test_invalid_value_is_an_error() {
        let builder = config::Config::builder()
            .set_override("port", "not-a-port")
            .unwrap();

        assert!(HubConfig::from_builder(builder).is_err());
    }
}
