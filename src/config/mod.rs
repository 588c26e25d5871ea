//! # Switchyard Configuration System
//!
//! Typed configuration for the plugin registry, the task scheduler, logging and
//! the orchestrator's intent routing table.
//!
//! ## Architecture
//!
//! - **Layered Sources**: built-in defaults, then an optional file, then
//!   `SWITCHYARD__*` environment overrides
//! - **Serde Defaults**: every field has a default so partial files are valid
//! - **Explicit Validation**: values that would wedge the scheduler are rejected
//!
//! ## Usage
//!
//! ```rust,no_run
//! use switchyard::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load_from_file("config/switchyard.toml", "development")?;
//! let workers = manager.config().scheduler.max_workers;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants::system;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SwitchyardConfig {
    /// Task scheduler settings
    pub scheduler: SchedulerConfig,

    /// Plugin discovery and loading settings
    pub plugins: PluginConfig,

    /// Logging output settings
    pub logging: LoggingConfig,

    /// Intent label to capability routing table
    pub routes: HashMap<String, String>,
}

impl SwitchyardConfig {
    /// Reject values the runtime cannot operate with
    pub fn validate(&self) -> ConfigResult<()> {
        self.scheduler.validate()?;
        self.plugins.validate()?;
        Ok(())
    }
}

/// How a failed attempt waits out its backoff delay before being re-enqueued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Hand the task to the retry timer and free the worker immediately
    #[default]
    Deferred,
    /// Sleep on the executing worker for the whole delay
    Blocking,
}

/// Task scheduler configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub max_workers: usize,
    pub poll_interval_ms: u64,
    pub default_retry_delay_ms: u64,
    pub shutdown_timeout_ms: u64,
    pub result_poll_interval_ms: u64,
    pub backoff_strategy: BackoffStrategy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: system::DEFAULT_MAX_WORKERS,
            poll_interval_ms: system::DEFAULT_POLL_INTERVAL_MS,
            default_retry_delay_ms: system::DEFAULT_RETRY_DELAY_MS,
            shutdown_timeout_ms: system::DEFAULT_SHUTDOWN_TIMEOUT_MS,
            result_poll_interval_ms: system::DEFAULT_RESULT_POLL_INTERVAL_MS,
            backoff_strategy: BackoffStrategy::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn default_retry_delay(&self) -> Duration {
        Duration::from_millis(self.default_retry_delay_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn result_poll_interval(&self) -> Duration {
        Duration::from_millis(self.result_poll_interval_ms)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.max_workers == 0 {
            return Err(ConfigurationError::invalid_value(
                "scheduler.max_workers",
                "0",
                "At least one worker is required",
            ));
        }
        for (field, value) in [
            ("scheduler.poll_interval_ms", self.poll_interval_ms),
            ("scheduler.default_retry_delay_ms", self.default_retry_delay_ms),
            ("scheduler.result_poll_interval_ms", self.result_poll_interval_ms),
        ] {
            if value == 0 {
                return Err(ConfigurationError::invalid_value(
                    field,
                    "0",
                    "Interval must be greater than zero",
                ));
            }
        }
        Ok(())
    }
}

/// Plugin discovery and loading configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PluginConfig {
    pub plugin_dirs: Vec<String>,
    pub auto_load: bool,
    pub enabled_only: bool,
    pub manifest_file: String,
    /// Per-plugin settings handed to the plugin constructor, keyed by plugin name
    pub settings: HashMap<String, serde_json::Value>,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            plugin_dirs: vec![system::DEFAULT_PLUGIN_DIR.to_string()],
            auto_load: true,
            enabled_only: true,
            manifest_file: system::MANIFEST_FILE_NAME.to_string(),
            settings: HashMap::new(),
        }
    }
}

impl PluginConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.plugin_dirs.is_empty() {
            return Err(ConfigurationError::invalid_value(
                "plugins.plugin_dirs",
                "[]",
                "At least one plugin directory is required",
            ));
        }
        if self.manifest_file.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "plugins.manifest_file",
                "",
                "Manifest file name cannot be empty",
            ));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive; `None` derives the level from the environment
    pub level: Option<String>,
    /// Also write JSON records to a file under `log_dir`
    pub json_file: bool,
    pub log_dir: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: None,
            json_file: false,
            log_dir: "log".to_string(),
        }
    }
}
