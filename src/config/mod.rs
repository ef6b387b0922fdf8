//! # Configuration
//!
//! Amberlink reads a single TOML file. Every section has defaults, so a file
//! only needs the keys it wants to change.
//!
//! ```toml
//! [registry]
//! max_selected = 1
//! advertisement_timeout_ms = 10000
//!
//! [amber]
//! minimum_rssi = -76
//! maximum_bad_rssi_count = 5
//!
//! [coalescer]
//! debounce_ms = 100
//!
//! [message_log]
//! capacity = 500
//!
//! [logging]
//! level = "info"
//! file = "amberlink.log"
//!
//! [[demo_devices]]
//! name = "Demo Amber"
//! kind = "amber"
//! ```
//!
//! ```rust,no_run
//! use amberlink::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("amberlink.toml").await?;
//!     let settings = config.registry_settings();
//!     println!("selection bound: {}", settings.max_selected);
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::registry::{DeviceKind, RegistrySettings, RssiPolicy};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub amber: AmberConfig,
    #[serde(default)]
    pub coalescer: CoalescerConfig,
    #[serde(default)]
    pub message_log: MessageLogConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub demo_devices: Vec<DemoDeviceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Devices kept selected for automatic reconnection.
    #[serde(default = "default_max_selected")]
    pub max_selected: usize,
    #[serde(default = "default_advertisement_timeout_ms")]
    pub advertisement_timeout_ms: u64,
}

fn default_max_selected() -> usize {
    1
}

fn default_advertisement_timeout_ms() -> u64 {
    10_000
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_selected: default_max_selected(),
            advertisement_timeout_ms: default_advertisement_timeout_ms(),
        }
    }
}

/// RSSI policy for the Amber family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmberConfig {
    #[serde(default = "default_minimum_rssi")]
    pub minimum_rssi: i16,
    #[serde(default = "default_maximum_bad_rssi_count")]
    pub maximum_bad_rssi_count: u32,
}

fn default_minimum_rssi() -> i16 {
    -76
}

fn default_maximum_bad_rssi_count() -> u32 {
    5
}

impl Default for AmberConfig {
    fn default() -> Self {
        Self {
            minimum_rssi: default_minimum_rssi(),
            maximum_bad_rssi_count: default_maximum_bad_rssi_count(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoalescerConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_debounce_ms() -> u64 {
    100
}

impl Default for CoalescerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageLogConfig {
    #[serde(default = "default_log_capacity")]
    pub capacity: usize,
}

fn default_log_capacity() -> usize {
    500
}

impl Default for MessageLogConfig {
    fn default() -> Self {
        Self {
            capacity: default_log_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: Some("amberlink.log".to_string()),
        }
    }
}

/// A synthetic device injected at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoDeviceConfig {
    pub name: String,
    #[serde(default = "default_demo_kind")]
    pub kind: DeviceKind,
}

fn default_demo_kind() -> DeviceKind {
    DeviceKind::Amber
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config {
            demo_devices: vec![DemoDeviceConfig {
                name: "Demo Amber".to_string(),
                kind: DeviceKind::Amber,
            }],
            ..Config::default()
        };
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.registry.max_selected == 0 {
            return Err(anyhow!("registry.max_selected must be at least 1"));
        }
        if self.registry.advertisement_timeout_ms == 0 {
            return Err(anyhow!("registry.advertisement_timeout_ms must be positive"));
        }
        if self.coalescer.debounce_ms == 0 {
            return Err(anyhow!("coalescer.debounce_ms must be positive"));
        }
        if self.amber.maximum_bad_rssi_count == 0 {
            return Err(anyhow!("amber.maximum_bad_rssi_count must be at least 1"));
        }
        for demo in &self.demo_devices {
            if demo.name.trim().is_empty() {
                return Err(anyhow!("demo device names must not be empty"));
            }
        }
        Ok(())
    }

    pub fn registry_settings(&self) -> RegistrySettings {
        RegistrySettings {
            max_selected: self.registry.max_selected,
            advertisement_timeout: Duration::from_millis(self.registry.advertisement_timeout_ms),
            amber: RssiPolicy {
                minimum_rssi: self.amber.minimum_rssi,
                maximum_bad_rssi_count: self.amber.maximum_bad_rssi_count,
            },
            debounce: Duration::from_millis(self.coalescer.debounce_ms),
            message_log_capacity: self.message_log.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        config.validate().unwrap();
        let settings = config.registry_settings();
        assert_eq!(settings.max_selected, 1);
        assert_eq!(settings.advertisement_timeout, Duration::from_secs(10));
        assert_eq!(settings.amber, RssiPolicy::default());
        assert_eq!(settings.debounce, Duration::from_millis(100));
        assert!(config.demo_devices.is_empty());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [amber]
            minimum_rssi = -60

            [[demo_devices]]
            name = "Shelf"
            "#,
        )
        .unwrap();
        assert_eq!(config.amber.minimum_rssi, -60);
        assert_eq!(config.amber.maximum_bad_rssi_count, 5);
        assert_eq!(config.demo_devices[0].kind, DeviceKind::Amber);
    }

    #[test]
    fn zero_selection_bound_is_rejected() {
        let mut config = Config::default();
        config.registry.max_selected = 0;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn default_file_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("amberlink.toml");
        let path = path.to_str().unwrap();
        Config::create_default(path).await.unwrap();
        let config = Config::load(path).await.unwrap();
        assert_eq!(config.demo_devices.len(), 1);
        assert_eq!(config.logging.level, "info");
    }
}
