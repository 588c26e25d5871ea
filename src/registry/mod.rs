//! # Registry Infrastructure
//!
//! Plugin manifests, implementation factories and the live plugin registry.
//!
//! ## Architecture
//!
//! ```text
//! Registry Infrastructure
//! ├── ManifestStore          (on-disk descriptors, discovery order)
//! ├── PluginFactoryRegistry  (plugin_class -> constructor)
//! └── PluginRegistry         (load/unload, enable/disable, capability lookup)
//! ```

pub mod errors;
pub mod manifest;
pub mod plugin;
pub mod plugin_factory;
pub mod plugin_registry;

pub use errors::{ManifestError, RegistryError, RegistryResult};
pub use manifest::{DiscoveredPlugin, ManifestStore, PluginManifest};
pub use plugin::{CommandContext, Plugin, PluginHandle, PluginSettings};
pub use plugin_factory::{FactoryStats, PluginFactory, PluginFactoryRegistry};
pub use plugin_registry::{LoadOutcome, PluginInfo, PluginRegistry, PluginStats};
