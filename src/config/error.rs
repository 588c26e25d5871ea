//! Configuration error types

use std::fmt;

/// Errors raised while loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Failed to read configuration file {path}: {reason}")]
    FileRead { path: String, reason: String },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("Invalid value for '{field}' ({value}): {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

impl ConfigurationError {
    pub fn file_read_error(path: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::FileRead {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigurationError>;
