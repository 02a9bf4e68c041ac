//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/cartlens/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/cartlens/` (~/.config/cartlens/)
//! - State/Logs: `$XDG_STATE_HOME/cartlens/` (~/.local/state/cartlens/)

use crate::error::{Error, Result};
use crate::types::TimeGranularity;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::path::PathBuf;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Analytics parameters
    #[serde(default)]
    pub analytics: AnalyticsConfig,

    /// Observation window bounds
    #[serde(default)]
    pub window: WindowConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Parameters recognized by the analytics components.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsConfig {
    /// Time bucket size for popularity/revenue aggregation
    #[serde(default = "default_granularity")]
    pub granularity: TimeGranularity,

    /// Acquisition-period bucket width, in days, for cohort assignment
    #[serde(default = "default_bucket_width_days")]
    pub bucket_width_days: u32,

    /// Zero-fill empty aggregation buckets instead of omitting them
    #[serde(default)]
    pub dense_buckets: bool,

    /// Periods of projected spend added on top of historical CLV
    #[serde(default = "default_horizon_periods")]
    pub horizon_periods: u32,

    /// Affinity pairs with support below this are excluded (0.0 keeps
    /// every co-occurring pair)
    #[serde(default)]
    pub min_support_threshold: f64,

    /// How long after a session's last event a transaction can still be
    /// associated with it, in minutes
    #[serde(default = "default_association_window_minutes")]
    pub association_window_minutes: i64,

    /// Abort the run when the per-record error rate exceeds this fraction
    #[serde(default = "default_error_abort_threshold")]
    pub error_abort_threshold: f64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            granularity: default_granularity(),
            bucket_width_days: default_bucket_width_days(),
            dense_buckets: false,
            horizon_periods: default_horizon_periods(),
            min_support_threshold: 0.0,
            association_window_minutes: default_association_window_minutes(),
            error_abort_threshold: default_error_abort_threshold(),
        }
    }
}

impl AnalyticsConfig {
    /// Cohort bucket width as a duration.
    pub fn bucket_width(&self) -> Duration {
        Duration::days(self.bucket_width_days as i64)
    }

    /// Session-to-transaction association window as a duration.
    pub fn association_window(&self) -> Duration {
        Duration::minutes(self.association_window_minutes)
    }
}

fn default_granularity() -> TimeGranularity {
    TimeGranularity::Weekly
}

fn default_bucket_width_days() -> u32 {
    7
}

fn default_horizon_periods() -> u32 {
    4
}

fn default_association_window_minutes() -> i64 {
    30
}

fn default_error_abort_threshold() -> f64 {
    0.05
}

/// Observation window configuration.
///
/// When `start` is not set, the window is inferred from the data (it ends
/// at the latest observed activity).
#[derive(Debug, Clone, Deserialize)]
pub struct WindowConfig {
    /// Window start; inferred from the data when absent
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,

    /// Window length in days
    #[serde(default = "default_window_days")]
    pub days: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            start: None,
            days: default_window_days(),
        }
    }
}

fn default_window_days() -> u32 {
    90
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject invalid parameters before the job starts.
    pub fn validate(&self) -> Result<()> {
        if self.analytics.bucket_width_days == 0 {
            return Err(Error::Config(
                "analytics.bucket_width_days must be positive".to_string(),
            ));
        }
        if self.analytics.association_window_minutes < 0 {
            return Err(Error::Config(
                "analytics.association_window_minutes must not be negative".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.analytics.min_support_threshold) {
            return Err(Error::Config(
                "analytics.min_support_threshold must be within [0, 1]".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.analytics.error_abort_threshold) {
            return Err(Error::Config(
                "analytics.error_abort_threshold must be within [0, 1]".to_string(),
            ));
        }
        if self.window.days == 0 {
            return Err(Error::Config("window.days must be positive".to_string()));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/cartlens/config.toml` (~/.config/cartlens/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("cartlens").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/cartlens/` (~/.local/state/cartlens/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("cartlens")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/cartlens/cartlens.log` (~/.local/state/cartlens/cartlens.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("cartlens.log")
    }
}
