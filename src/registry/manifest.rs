//! # Plugin Manifest Store
//!
//! Parses `manifest.json` descriptors out of plugin directories and keeps the
//! validated ones keyed by plugin name, in discovery order.
//!
//! A plugin directory looks like:
//!
//! ```text
//! plugins/
//! └── speech/
//!     └── manifest.json
//! ```
//!
//! with a manifest such as:
//!
//! ```json
//! {
//!   "name": "speech",
//!   "version": "1.0.0",
//!   "description": "Offline speech recognition",
//!   "author": "core team",
//!   "plugin_class": "speech.VoskRecognizer",
//!   "capabilities": ["speech_recognition"],
//!   "dependencies": [],
//!   "enabled": true
//! }
//! ```

use super::errors::ManifestError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

fn default_enabled() -> bool {
    true
}

/// Validated plugin descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: String,
    /// Key into the factory registry that constructs the implementation
    pub plugin_class: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Other plugin names that must be loaded first
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub config_schema: serde_json::Map<String, serde_json::Value>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl PluginManifest {
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    /// Parse and validate a manifest file
    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        let raw = fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw, path)
    }

    fn from_json(raw: &str, path: &Path) -> Result<Self, ManifestError> {
        let manifest: PluginManifest =
            serde_json::from_str(raw).map_err(|source| ManifestError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        manifest.validate(path)?;
        Ok(manifest)
    }

    fn validate(&self, path: &Path) -> Result<(), ManifestError> {
        let invalid = |reason: &str| ManifestError::Invalid {
            path: path.display().to_string(),
            reason: reason.to_string(),
        };
        if self.name.trim().is_empty() {
            return Err(invalid("name cannot be empty"));
        }
        if self.plugin_class.trim().is_empty() {
            return Err(invalid("plugin_class cannot be empty"));
        }
        if self.dependencies.iter().any(|d| d == &self.name) {
            return Err(invalid("plugin cannot depend on itself"));
        }
        Ok(())
    }
}

/// A manifest together with the directory it was found in
#[derive(Debug, Clone)]
pub struct DiscoveredPlugin {
    pub manifest: Arc<PluginManifest>,
    pub path: PathBuf,
}

/// In-memory store of discovered manifests
#[derive(Debug, Default)]
pub struct ManifestStore {
    order: Vec<String>,
    entries: HashMap<String, DiscoveredPlugin>,
}

impl ManifestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan each directory for `<plugin>/<manifest_file>` descriptors
    ///
    /// Invalid manifests are logged and skipped. Returns the validated names in
    /// the order they were encountered. A name seen again replaces the earlier
    /// descriptor but keeps its original position.
    pub fn discover<P: AsRef<Path>>(&mut self, directories: &[P], manifest_file: &str) -> Vec<String> {
        let mut discovered: Vec<String> = Vec::new();

        for directory in directories {
            let directory = directory.as_ref();
            if !directory.is_dir() {
                warn!(directory = %directory.display(), "Plugin directory not found");
                continue;
            }

            let mut entries: Vec<PathBuf> = match fs::read_dir(directory) {
                Ok(read_dir) => read_dir
                    .filter_map(|entry| entry.ok().map(|e| e.path()))
                    .filter(|path| path.is_dir())
                    .collect(),
                Err(e) => {
                    error!(directory = %directory.display(), error = %e, "Failed to scan plugin directory");
                    continue;
                }
            };
            entries.sort();

            for plugin_path in entries {
                let manifest_path = plugin_path.join(manifest_file);
                if !manifest_path.is_file() {
                    debug!(path = %plugin_path.display(), "Skipping directory without manifest");
                    continue;
                }

                match PluginManifest::from_file(&manifest_path) {
                    Ok(manifest) => {
                        let name = manifest.name.clone();
                        info!(plugin = %name, version = %manifest.version, "Discovered plugin");
                        self.insert(manifest, plugin_path);
                        if !discovered.contains(&name) {
                            discovered.push(name);
                        }
                    }
                    Err(e) => {
                        error!(path = %manifest_path.display(), error = %e, "Failed to load manifest");
                    }
                }
            }
        }

        info!(count = discovered.len(), "Plugin discovery finished");
        discovered
    }

    /// Store a descriptor, replacing any previous one with the same name
    pub fn insert(&mut self, manifest: PluginManifest, path: PathBuf) {
        let name = manifest.name.clone();
        if !self.entries.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.entries.insert(
            name,
            DiscoveredPlugin {
                manifest: Arc::new(manifest),
                path,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&DiscoveredPlugin> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Descriptors in discovery order
    pub fn iter(&self) -> impl Iterator<Item = &DiscoveredPlugin> {
        self.order.iter().filter_map(|name| self.entries.get(name))
    }

    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
