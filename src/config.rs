//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every field has a default, so a missing file section (or no file at all)
//! yields the stock single-drone setup. Command-line overrides are applied
//! by the binary on top of the loaded values before validation.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{EdgeError, Result};

/// Upper bound for any timing value (one hour)
const MAX_TIMING_MS: u64 = 3_600_000;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub drone: DroneConfig,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub sensor: SensorConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Edge node configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DroneConfig {
    #[serde(default = "default_drone_id")]
    pub id: String,

    #[serde(default = "default_listen_host")]
    pub listen_host: String,

    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    #[serde(default = "default_battery_threshold")]
    pub battery_threshold: u8,

    #[serde(default = "default_battery_initial")]
    pub battery_initial: u8,
}

/// Central aggregator endpoint
///
/// The drone connects to it; the aggregator binds it.
#[derive(Debug, Deserialize, Clone)]
pub struct AggregatorConfig {
    #[serde(default = "default_aggregator_host")]
    pub host: String,

    #[serde(default = "default_aggregator_port")]
    pub port: u16,
}

/// Simulated field sensor
#[derive(Debug, Deserialize, Clone)]
pub struct SensorConfig {
    #[serde(default = "default_sensor_id")]
    pub id: String,

    #[serde(default = "default_drone_host")]
    pub drone_host: String,

    #[serde(default = "default_drone_port")]
    pub drone_port: u16,

    #[serde(default = "default_send_interval_ms")]
    pub send_interval_ms: u64,
}

/// Timer periods, in milliseconds
#[derive(Debug, Deserialize, Clone)]
pub struct TimingConfig {
    #[serde(default = "default_battery_tick_ms")]
    pub battery_tick_ms: u64,

    #[serde(default = "default_return_to_base_ms")]
    pub return_to_base_ms: u64,

    #[serde(default = "default_charge_ms")]
    pub charge_ms: u64,

    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

/// Log sink configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_file_enabled")]
    pub file_enabled: bool,
}

// Default value functions
fn default_drone_id() -> String { "drone1".to_string() }
fn default_listen_host() -> String { "0.0.0.0".to_string() }
fn default_listen_port() -> u16 { 9000 }
fn default_battery_threshold() -> u8 { 20 }
fn default_battery_initial() -> u8 { 100 }

fn default_aggregator_host() -> String { "127.0.0.1".to_string() }
fn default_aggregator_port() -> u16 { 9100 }

fn default_sensor_id() -> String { "sensor1".to_string() }
fn default_drone_host() -> String { "127.0.0.1".to_string() }
fn default_drone_port() -> u16 { 9000 }
fn default_send_interval_ms() -> u64 { 5_000 }

fn default_battery_tick_ms() -> u64 { 60_000 }
fn default_return_to_base_ms() -> u64 { 30_000 }
fn default_charge_ms() -> u64 { 5_000 }
fn default_flush_interval_ms() -> u64 { 5_000 }
fn default_retry_interval_ms() -> u64 { 5_000 }

fn default_log_level() -> String { "info".to_string() }
fn default_log_dir() -> String { "./logs".to_string() }
fn default_file_enabled() -> bool { true }

impl Default for DroneConfig {
    fn default() -> Self {
        Self {
            id: default_drone_id(),
            listen_host: default_listen_host(),
            listen_port: default_listen_port(),
            battery_threshold: default_battery_threshold(),
            battery_initial: default_battery_initial(),
        }
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            host: default_aggregator_host(),
            port: default_aggregator_port(),
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            id: default_sensor_id(),
            drone_host: default_drone_host(),
            drone_port: default_drone_port(),
            send_interval_ms: default_send_interval_ms(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            battery_tick_ms: default_battery_tick_ms(),
            return_to_base_ms: default_return_to_base_ms(),
            charge_ms: default_charge_ms(),
            flush_interval_ms: default_flush_interval_ms(),
            retry_interval_ms: default_retry_interval_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: default_log_dir(),
            file_enabled: default_file_enabled(),
        }
    }
}

impl DroneConfig {
    /// Address the sensor listener binds to
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }
}

impl AggregatorConfig {
    /// Address of the aggregator endpoint
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl SensorConfig {
    /// Address of the drone this sensor reports to
    pub fn drone_addr(&self) -> String {
        format!("{}:{}", self.drone_host, self.drone_port)
    }

    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }
}

impl TimingConfig {
    pub fn battery_tick(&self) -> Duration {
        Duration::from_millis(self.battery_tick_ms)
    }

    pub fn return_to_base(&self) -> Duration {
        Duration::from_millis(self.return_to_base_ms)
    }

    pub fn charge(&self) -> Duration {
        Duration::from_millis(self.charge_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

fn invalid(msg: impl std::fmt::Display) -> EdgeError {
    EdgeError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use edge_sentinel::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.drone.id.trim().is_empty() {
            return Err(invalid("drone id cannot be empty"));
        }

        if self.drone.listen_host.is_empty() {
            return Err(invalid("drone listen_host cannot be empty"));
        }

        if self.drone.listen_port == 0 {
            return Err(invalid("drone listen_port must be greater than 0"));
        }

        if self.drone.battery_threshold > 100 {
            return Err(invalid("battery_threshold must be between 0 and 100"));
        }

        if self.drone.battery_initial > 100 {
            return Err(invalid("battery_initial must be between 0 and 100"));
        }

        if self.aggregator.host.is_empty() {
            return Err(invalid("aggregator host cannot be empty"));
        }

        if self.aggregator.port == 0 {
            return Err(invalid("aggregator port must be greater than 0"));
        }

        if self.sensor.id.trim().is_empty() {
            return Err(invalid("sensor id cannot be empty"));
        }

        if self.sensor.drone_host.is_empty() || self.sensor.drone_port == 0 {
            return Err(invalid("sensor drone_host and drone_port must be set"));
        }

        for (name, value) in [
            ("send_interval_ms", self.sensor.send_interval_ms),
            ("battery_tick_ms", self.timing.battery_tick_ms),
            ("return_to_base_ms", self.timing.return_to_base_ms),
            ("charge_ms", self.timing.charge_ms),
            ("flush_interval_ms", self.timing.flush_interval_ms),
            ("retry_interval_ms", self.timing.retry_interval_ms),
        ] {
            if value == 0 || value > MAX_TIMING_MS {
                return Err(invalid(format!(
                    "{} must be between 1 and {}",
                    name, MAX_TIMING_MS
                )));
            }
        }

        if self.logging.level.parse::<tracing::Level>().is_err() {
            return Err(invalid(format!(
                "log level '{}' must be one of: trace, debug, info, warn, error",
                self.logging.level
            )));
        }

        if self.logging.file_enabled && self.logging.log_dir.is_empty() {
            return Err(invalid("log_dir cannot be empty when file logging is enabled"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.drone.listen_addr(), "0.0.0.0:9000");
        assert_eq!(config.aggregator.addr(), "127.0.0.1:9100");
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[drone]
id = "drone7"
listen_port = 9007
battery_threshold = 15

[aggregator]
host = "10.0.0.2"

[timing]
flush_interval_ms = 1000
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.drone.id, "drone7");
        assert_eq!(config.drone.listen_port, 9007);
        assert_eq!(config.drone.battery_threshold, 15);
        assert_eq!(config.drone.battery_initial, 100);
        assert_eq!(config.aggregator.addr(), "10.0.0.2:9100");
        assert_eq!(config.timing.flush_interval(), Duration::from_secs(1));
        assert_eq!(config.timing.battery_tick(), Duration::from_secs(60));
    }

    #[test]
    fn test_load_empty_file_uses_defaults() {
        use tempfile::NamedTempFile;

        let temp_file = NamedTempFile::new().unwrap();
        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.drone.id, "drone1");
        assert_eq!(config.timing.return_to_base_ms, 30_000);
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/edge-sentinel.toml");
        assert!(matches!(result, Err(EdgeError::Io(_))));
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[drone]\nbattery_threshold = 150\n")
            .unwrap();
        temp_file.flush().unwrap();

        assert!(matches!(
            Config::load(temp_file.path()),
            Err(EdgeError::Config(_))
        ));
    }

    #[test]
    fn test_empty_drone_id() {
        let mut config = Config::default();
        config.drone.id = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_ports() {
        let mut config = Config::default();
        config.drone.listen_port = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.aggregator.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_battery_initial_out_of_range() {
        let mut config = Config::default();
        config.drone.battery_initial = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_battery_threshold_boundaries() {
        let mut config = Config::default();
        config.drone.battery_threshold = 0;
        assert!(config.validate().is_ok());
        config.drone.battery_threshold = 100;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_timing_zero() {
        let mut config = Config::default();
        config.timing.charge_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timing_too_high() {
        let mut config = Config::default();
        config.timing.retry_interval_ms = MAX_TIMING_MS + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_log_dir_when_disabled() {
        let mut config = Config::default();
        config.logging.file_enabled = false;
        config.logging.log_dir = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_functions() {
        assert_eq!(default_drone_id(), "drone1");
        assert_eq!(default_listen_port(), 9000);
        assert_eq!(default_battery_threshold(), 20);
        assert_eq!(default_battery_initial(), 100);
        assert_eq!(default_battery_tick_ms(), 60_000);
        assert_eq!(default_return_to_base_ms(), 30_000);
        assert_eq!(default_charge_ms(), 5_000);
        assert_eq!(default_flush_interval_ms(), 5_000);
        assert_eq!(default_retry_interval_ms(), 5_000);
        assert_eq!(default_log_level(), "info");
        assert_eq!(default_sensor_id(), "sensor1");
        assert_eq!(default_send_interval_ms(), 5_000);
    }

    #[test]
    fn test_sensor_section() {
        let config: Config = toml::from_str(
            r#"
            [sensor]
            id = "s7"
            drone_port = 9500
            "#,
        )
        .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.sensor.id, "s7");
        assert_eq!(config.sensor.drone_addr(), "127.0.0.1:9500");
        assert_eq!(config.sensor.send_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_sensor_interval_zero() {
        let mut config = Config::default();
        config.sensor.send_interval_ms = 0;
        assert!(config.validate().is_err());
    }
}
