use crate::config::ConfigurationError;
use crate::orchestration::DispatchError;
use crate::registry::{ManifestError, RegistryError};

/// Top-level error for callers that drive several subsystems at once.
///
/// Each subsystem keeps its own error type; this enum only aggregates them so
/// host code can use a single `?` chain.
#[derive(Debug, thiserror::Error)]
pub enum SwitchyardError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

pub type Result<T> = std::result::Result<T, SwitchyardError>;

/// Render a caught panic payload as text.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
