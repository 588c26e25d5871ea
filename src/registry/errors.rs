//! Registry and manifest error types

/// Failure to turn one on-disk manifest into a descriptor
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Failed to read manifest {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse manifest {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid manifest {path}: {reason}")]
    Invalid { path: String, reason: String },
}

/// Failure signals returned by plugin lifecycle operations
///
/// Faults raised inside plugin code surface as `InitializationFailed` or
/// `CommandFailed`; they never unwind out of the registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Plugin not found: {name}")]
    NotFound { name: String },

    #[error("Plugin '{name}' is missing dependency '{dependency}'")]
    MissingDependency { name: String, dependency: String },

    #[error("Plugin '{name}' references unknown implementation '{plugin_class}'")]
    ImplementationNotFound { name: String, plugin_class: String },

    #[error("Plugin '{name}' failed to initialize: {reason}")]
    InitializationFailed { name: String, reason: String },

    #[error("Plugin not loaded: {name}")]
    NotLoaded { name: String },

    #[error("Plugin '{name}' failed to handle command: {reason}")]
    CommandFailed { name: String, reason: String },
}

pub type RegistryResult<T> = Result<T, RegistryError>;
