//! Configuration Loader
//!
//! Environment-aware configuration loading. A base file is merged with an
//! optional `<stem>.<environment>.<ext>` overlay next to it, and finally with
//! `SWITCHYARD__SECTION__KEY` environment variables.

use super::error::{ConfigResult, ConfigurationError};
use super::SwitchyardConfig;
use config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const ENV_PREFIX: &str = "SWITCHYARD";
const ENV_SEPARATOR: &str = "__";
const DEFAULT_CONFIG_PATH: &str = "config/switchyard.toml";

/// Owner of the loaded configuration and the environment it was loaded for
#[derive(Debug)]
pub struct ConfigManager {
    config: SwitchyardConfig,
    environment: String,
    source_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load `config/switchyard.toml` if present, otherwise defaults plus environment overrides
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        let default_path = Path::new(DEFAULT_CONFIG_PATH);
        if default_path.is_file() {
            Self::load_from_file(default_path, &environment)
        } else {
            debug!(
                path = DEFAULT_CONFIG_PATH,
                "No configuration file found, using defaults"
            );
            Self::build(None, &environment)
        }
    }

    /// Load configuration from an explicit file with an explicit environment
    pub fn load_from_file(
        path: impl AsRef<Path>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))?;
        if !metadata.is_file() {
            return Err(ConfigurationError::invalid_value(
                "config_path",
                path.display().to_string(),
                "Configuration path must point to a regular file",
            ));
        }
        Self::build(Some(path), environment)
    }

    /// Wrap an already-built configuration
    pub fn from_config(config: SwitchyardConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            source_path: None,
        }))
    }

    fn build(path: Option<&Path>, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
            if let Some(overlay) = Self::environment_overlay(path, environment) {
                debug!(overlay = %overlay.display(), "Applying environment overlay");
                builder = builder.add_source(File::from(overlay.as_path()).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator(ENV_SEPARATOR)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        let config: SwitchyardConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        info!(
            environment = %environment,
            source = %path.map(|p| p.display().to_string()).unwrap_or_else(|| "defaults".to_string()),
            max_workers = config.scheduler.max_workers,
            plugin_dirs = ?config.plugins.plugin_dirs,
            routes = config.routes.len(),
            "Configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            source_path: path.map(Path::to_path_buf),
        }))
    }

    /// `config/switchyard.toml` + `test` -> `config/switchyard.test.toml`
    fn environment_overlay(path: &Path, environment: &str) -> Option<PathBuf> {
        let stem = path.file_stem()?.to_str()?;
        let extension = path.extension()?.to_str()?;
        let overlay = path.with_file_name(format!("{stem}.{environment}.{extension}"));
        overlay.is_file().then_some(overlay)
    }

    /// Current environment from `SWITCHYARD_ENV`, then `APP_ENV`
    pub fn detect_environment() -> String {
        env::var("SWITCHYARD_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    pub fn config(&self) -> &SwitchyardConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }
}
