//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `panel.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - DeviceConfig: Where the device lives and how long to wait for it.
//!     - PollingConfig: How often to poll and how much history to keep.
//!     - ServerConfig: Bind address of the control api.
//!     - ExportConfig: Json / csv files written each poll cycle.
//!     - ForwardConfig: Optional upstream collector.
//!     - LoggingConfig: Log level and per-reading output.
//!
//! environment:
//!     PANEL_CONFIG overrides the config file path.
//!     ESP32_IP overrides `device.address`.
//!
//! ==============================================================================

use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "PANEL_CONFIG";
pub const DEVICE_ADDRESS_ENV: &str = "ESP32_IP";

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct PanelConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub forward: ForwardConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DeviceConfig {
    /// bare host/ip ("10.0.0.7") or a full url ("http://10.0.0.7:8080")
    pub address: String,
    pub poll_timeout_ms: u64,
    pub command_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_seconds: u64,
    pub history_capacity: usize,
    /// false = only poll on POST /api/refresh
    pub auto: bool,
    pub recent_rows: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExportConfig {
    /// empty disables the json snapshot
    pub json_path: String,
    /// empty disables the csv table
    pub csv_path: String,
    pub restore_on_start: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ForwardConfig {
    /// empty disables forwarding
    pub url: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub show_sensor_data: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            address: "192.168.4.1".to_string(),
            poll_timeout_ms: 5000,
            command_timeout_ms: 3000,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { interval_seconds: 5, history_capacity: 100, auto: true, recent_rows: 10 }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0:8050".to_string() }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            json_path: "readings.json".to_string(),
            csv_path: String::new(),
            restore_on_start: false,
        }
    }
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self { url: String::new(), timeout_ms: 3000 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), show_sensor_data: true }
    }
}

impl DeviceConfig {
    /// base url with scheme and without trailing slash
    pub fn base_url(&self) -> String {
        let address = self.address.trim().trim_end_matches('/');
        if address.starts_with("http://") || address.starts_with("https://") {
            address.to_string()
        } else {
            format!("http://{}", address)
        }
    }

    /// timeouts of 0 are treated as 1 ms
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms.max(1))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms.max(1))
    }
}

impl ExportConfig {
    pub fn json_file(&self) -> Option<PathBuf> {
        non_empty_path(&self.json_path)
    }

    pub fn csv_file(&self) -> Option<PathBuf> {
        non_empty_path(&self.csv_path)
    }
}

impl ForwardConfig {
    pub fn target(&self) -> Option<&str> {
        let url = self.url.trim();
        (!url.is_empty()).then_some(url)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}

fn non_empty_path(s: &str) -> Option<PathBuf> {
    let s = s.trim();
    (!s.is_empty()).then(|| PathBuf::from(s))
}

impl PanelConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: PanelConfig = toml::from_str(content).context("Failed to parse config")?;
        Ok(config)
    }

    /// Load with default fallback, then apply environment overrides
    pub fn load_or_default() -> Self {
        let mut config = Self::load_from_candidates();
        config.apply_env(std::env::var(DEVICE_ADDRESS_ENV).ok());
        config
    }

    fn load_from_candidates() -> Self {
        let paths: Vec<PathBuf> = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => vec![PathBuf::from(path)],
            Err(_) => vec![
                PathBuf::from("config").join("panel.toml"),
                PathBuf::from("..").join("config").join("panel.toml"),
            ],
        };

        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        println!("[CONFIG] Loaded from {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        println!("[CONFIG] Warning: Failed to load {}: {:#}", path.display(), e);
                    }
                }
            }
        }

        println!("[CONFIG] Warning: No config file found - using defaults");
        Self::default()
    }

    /// device address from the environment wins over the file
    pub fn apply_env(&mut self, device_address: Option<String>) {
        if let Some(address) = device_address.filter(|a| !a.trim().is_empty()) {
            self.device.address = address.trim().to_string();
        }
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("┌─────────────────────────────────────────┐");
        println!("│          PANEL CONFIGURATION            │");
        println!("├─────────────────────────────────────────┤");
        println!("│ Device: {}", self.device.base_url());
        println!(
            "│ Poll Interval: {}s (auto: {})",
            self.polling.interval_seconds, self.polling.auto
        );
        println!("│ History Capacity: {}", self.polling.history_capacity);
        println!("│ Listen: {}", self.server.bind);
        println!("│ Forward: {}", self.forward.target().unwrap_or("disabled"));
        println!("│ Log Level: {}", self.logging.level);
        println!("└─────────────────────────────────────────┘");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PanelConfig::default();
        assert_eq!(config.polling.history_capacity, 100);
        assert_eq!(config.polling.interval_seconds, 5);
        assert_eq!(config.device.poll_timeout(), Duration::from_secs(5));
        assert_eq!(config.device.command_timeout(), Duration::from_secs(3));
        assert!(config.forward.target().is_none());
        assert_eq!(config.export.json_file(), Some(PathBuf::from("readings.json")));
        assert_eq!(config.export.csv_file(), None);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = PanelConfig::parse(
            r#"
[device]
address = "10.62.155.158"

[polling]
history_capacity = 20
"#,
        )
        .unwrap();
        assert_eq!(config.device.address, "10.62.155.158");
        assert_eq!(config.device.poll_timeout_ms, 5000);
        assert_eq!(config.polling.history_capacity, 20);
        assert_eq!(config.polling.interval_seconds, 5);
        assert_eq!(config.server.bind, "0.0.0.0:8050");
    }

    #[test]
    fn test_invalid_toml_is_error() {
        assert!(PanelConfig::parse("[polling]\ninterval_seconds = \"fast\"").is_err());
    }

    #[test]
    fn test_env_override() {
        let mut config = PanelConfig::default();
        config.apply_env(Some("  10.0.0.9 ".to_string()));
        assert_eq!(config.device.address, "10.0.0.9");
        config.apply_env(Some(String::new()));
        assert_eq!(config.device.address, "10.0.0.9");
        config.apply_env(None);
        assert_eq!(config.device.address, "10.0.0.9");
    }

    #[test]
    fn test_zero_timeouts_clamped() {
        let config = PanelConfig::parse(
            r#"
[device]
poll_timeout_ms = 0
command_timeout_ms = 0

[forward]
timeout_ms = 0
"#,
        )
        .unwrap();
        assert_eq!(config.device.poll_timeout(), Duration::from_millis(1));
        assert_eq!(config.device.command_timeout(), Duration::from_millis(1));
        assert_eq!(config.forward.timeout(), Duration::from_millis(1));
    }

    #[test]
    fn test_base_url() {
        let mut device = DeviceConfig::default();
        device.address = "10.0.0.7".to_string();
        assert_eq!(device.base_url(), "http://10.0.0.7");
        device.address = "http://127.0.0.1:9000/".to_string();
        assert_eq!(device.base_url(), "http://127.0.0.1:9000");
    }
}
