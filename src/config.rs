//! Configuration management for pylonlink
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files. Every section has defaults, so a config file
//! only needs to name what differs from a stock US2000 stack on `/dev/ttyUSB0`.

use crate::error::{PylonError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

mod defaults;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "PYLONLINK_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial link parameters
    pub serial: SerialConfig,

    /// Console wait durations
    pub timing: TimingConfig,

    /// Stack hardware constants
    pub battery: BatteryConfig,

    /// Polling mode (selects the default interval)
    pub mode: PollMode,

    /// Polling interval in milliseconds; falls back to the mode default
    pub poll_interval_ms: Option<u64>,

    /// BMS clock handling
    pub clock: ClockConfig,

    /// Optional persistence of energy counters
    pub persistence: PersistenceConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Web server binding configuration
    pub web: WebConfig,
}

/// Serial port parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path of the console adapter
    pub port: String,

    /// Line speed
    pub baud_rate: u32,

    /// Per-read timeout on the underlying port
    pub read_timeout_ms: u64,
}

/// Fixed waits that delimit console responses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Wait after the bare line terminator before discarding stale input
    pub flush_delay_ms: u64,

    /// Wait after `pwr` before reading the response
    pub settle_delay_ms: u64,

    /// Extra wait before the single re-read when the header is missing
    pub retry_delay_ms: u64,

    /// Wait after `info`
    pub info_settle_delay_ms: u64,

    /// Wait after `stat`; the per-module dump is long
    pub stat_settle_delay_ms: u64,

    /// Wait after `time` commands
    pub clock_settle_delay_ms: u64,
}

/// Stack hardware constants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryConfig {
    /// Nominal usable capacity of one module in kWh
    pub module_capacity_kwh: f64,
}

/// Where the poller runs and therefore how often it ticks by default
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollMode {
    /// Embedded in a host that owns presentation (15 s)
    #[default]
    Managed,
    /// Standalone bridge process (10 s)
    Bridge,
}

/// BMS clock options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Issue `time` after `stat` on every poll and publish the result
    pub read_each_poll: bool,

    /// Set the BMS clock to local time once before the first poll
    pub sync_on_start: bool,
}

/// Persistence options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// JSON file holding the energy counters; unset keeps them in memory only
    pub energy_state_file: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional override for the console layer
    pub console_level: Option<String>,

    /// Optional override for the file layer
    pub file_level: Option<String>,

    /// Path to log file (its directory receives the rolling files)
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Serve the read-only HTTP API
    pub enabled: bool,

    /// Bind address
    pub host: String,

    /// TCP port
    pub port: u16,
}

impl PollMode {
    /// Default tick interval for this mode
    pub fn default_interval(self) -> Duration {
        match self {
            Self::Managed => Duration::from_secs(15),
            Self::Bridge => Duration::from_secs(10),
        }
    }
}

impl TimingConfig {
    pub fn flush_delay(&self) -> Duration {
        Duration::from_millis(self.flush_delay_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn info_settle_delay(&self) -> Duration {
        Duration::from_millis(self.info_settle_delay_ms)
    }

    pub fn stat_settle_delay(&self) -> Duration {
        Duration::from_millis(self.stat_settle_delay_ms)
    }

    pub fn clock_settle_delay(&self) -> Duration {
        Duration::from_millis(self.clock_settle_delay_ms)
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the first location that exists
    pub fn load() -> Result<Self> {
        if let Some(explicit) = std::env::var_os(CONFIG_ENV_VAR) {
            let path = Path::new(&explicit);
            if !path.exists() {
                return Err(PylonError::config(format!(
                    "{} points at missing file {}",
                    CONFIG_ENV_VAR,
                    path.display()
                )));
            }
            return Self::from_file(path);
        }

        let default_paths = [
            "pylonlink.yaml",
            "/data/pylonlink.yaml",
            "/etc/pylonlink/config.yaml",
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

    /// Interval between poll ticks
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.mode.default_interval())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.serial.port.trim().is_empty() {
            return Err(PylonError::validation(
                "serial.port",
                "Port path cannot be empty",
            ));
        }

        if self.serial.baud_rate == 0 {
            return Err(PylonError::validation(
                "serial.baud_rate",
                "Must be greater than 0",
            ));
        }

        if self.serial.read_timeout_ms == 0 {
            return Err(PylonError::validation(
                "serial.read_timeout_ms",
                "Must be greater than 0",
            ));
        }

        let waits = [
            ("timing.flush_delay_ms", self.timing.flush_delay_ms),
            ("timing.settle_delay_ms", self.timing.settle_delay_ms),
            ("timing.retry_delay_ms", self.timing.retry_delay_ms),
            ("timing.info_settle_delay_ms", self.timing.info_settle_delay_ms),
            ("timing.stat_settle_delay_ms", self.timing.stat_settle_delay_ms),
            ("timing.clock_settle_delay_ms", self.timing.clock_settle_delay_ms),
        ];
        for (field, value) in waits {
            if value == 0 {
                return Err(PylonError::validation(field, "Must be greater than 0"));
            }
        }

        if !(self.battery.module_capacity_kwh.is_finite() && self.battery.module_capacity_kwh > 0.0)
        {
            return Err(PylonError::validation(
                "battery.module_capacity_kwh",
                "Must be positive",
            ));
        }

        if self.poll_interval_ms == Some(0) {
            return Err(PylonError::validation(
                "poll_interval_ms",
                "Must be greater than 0",
            ));
        }

        crate::logging::parse_log_level(&self.logging.level)
            .map_err(|_| PylonError::validation("logging.level", "Unknown log level"))?;

        Ok(())
    }
}
