//! # Plugin Registry
//!
//! Registry for plugin discovery, loading and capability lookup with
//! thread-safe management.
//!
//! ## Overview
//!
//! The PluginRegistry owns the manifest store and every live plugin instance.
//! Manifests are discovered from disk; `load` resolves a manifest's
//! `plugin_class` through the [`PluginFactoryRegistry`], constructs and
//! initializes the instance, and adds it to the active set. The orchestrator
//! then asks for providers of a capability.
//!
//! ## Key Features
//!
//! - **Manifest discovery** with per-plugin failure isolation
//! - **Dependency checks** against the active set at load time
//! - **Atomic loads**: a failed load never leaves a partial entry behind
//! - **Fault isolation**: panics inside plugin hooks are caught and reported
//! - **Capability lookup** over active and enabled plugins, in load order
//!
//! ## Usage
//!
//! ```rust,no_run
//! use switchyard::registry::{PluginFactoryRegistry, PluginRegistry};
//! use std::sync::Arc;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let factories = Arc::new(PluginFactoryRegistry::new());
//! let registry = PluginRegistry::new(factories);
//!
//! registry.discover(&["plugins"]);
//! registry.load("speech", serde_json::json!({}))?;
//!
//! for provider in registry.providers_for("speech_recognition") {
//!     println!("provider: {}", provider.name());
//! }
//! # Ok(())
//! # }
//! ```

use super::errors::{RegistryError, RegistryResult};
use super::manifest::{ManifestStore, PluginManifest};
use super::plugin::{Plugin, PluginHandle, PluginSettings};
use super::plugin_factory::PluginFactoryRegistry;
use crate::config::PluginConfig;
use crate::constants::{operations, system};
use crate::error::panic_message;
use crate::logging::{log_error, log_registry_operation};
use chrono::{DateTime, Utc};
use parking_lot::{ReentrantMutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Result of a successful `load` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    AlreadyLoaded,
}

/// Live plugin owned by the registry
struct LoadedPlugin {
    manifest: Arc<PluginManifest>,
    handle: PluginHandle,
    enabled: bool,
    load_seq: u64,
    loaded_at: DateTime<Utc>,
}

#[derive(Default)]
struct ActiveSet {
    plugins: HashMap<String, LoadedPlugin>,
    next_seq: u64,
}

impl ActiveSet {
    fn in_load_order(&self) -> Vec<&LoadedPlugin> {
        let mut loaded: Vec<&LoadedPlugin> = self.plugins.values().collect();
        loaded.sort_by_key(|p| p.load_seq);
        loaded
    }
}

/// Registry for managing plugins
pub struct PluginRegistry {
    factories: Arc<PluginFactoryRegistry>,
    manifests: RwLock<ManifestStore>,
    active: RwLock<ActiveSet>,
    /// Serializes load/unload so dependency checks and insertion are atomic.
    /// Reentrant so a plugin hook may call back into the registry.
    lifecycle: ReentrantMutex<()>,
    plugin_directories: Vec<PathBuf>,
    manifest_file: String,
    settings: HashMap<String, PluginSettings>,
}

impl PluginRegistry {
    /// Create a registry that scans the default plugin directory
    pub fn new(factories: Arc<PluginFactoryRegistry>) -> Self {
        Self {
            factories,
            manifests: RwLock::new(ManifestStore::new()),
            active: RwLock::new(ActiveSet::default()),
            lifecycle: ReentrantMutex::new(()),
            plugin_directories: vec![PathBuf::from(system::DEFAULT_PLUGIN_DIR)],
            manifest_file: system::MANIFEST_FILE_NAME.to_string(),
            settings: HashMap::new(),
        }
    }

    /// Create a registry from plugin configuration
    pub fn from_config(config: &PluginConfig, factories: Arc<PluginFactoryRegistry>) -> Self {
        Self {
            plugin_directories: config.plugin_dirs.iter().map(PathBuf::from).collect(),
            manifest_file: config.manifest_file.clone(),
            settings: config.settings.clone(),
            ..Self::new(factories)
        }
    }

    pub fn add_plugin_directory(&mut self, directory: impl Into<PathBuf>) {
        self.plugin_directories.push(directory.into());
    }

    pub fn factories(&self) -> &Arc<PluginFactoryRegistry> {
        &self.factories
    }

    /// Discover manifests in the configured directories
    pub fn discover_configured(&self) -> Vec<String> {
        self.discover(&self.plugin_directories)
    }

    /// Discover manifests in the given directories
    pub fn discover<P: AsRef<Path>>(&self, directories: &[P]) -> Vec<String> {
        let discovered = self
            .manifests
            .write()
            .discover(directories, &self.manifest_file);

        log_registry_operation(
            operations::DISCOVER,
            "*",
            None,
            "completed",
            Some(format!("{} plugins", discovered.len()).as_str()),
        );
        discovered
    }

    /// Register a manifest without scanning disk
    pub fn register_manifest(&self, manifest: PluginManifest, path: impl Into<PathBuf>) {
        debug!(plugin = %manifest.name, "Registering manifest");
        self.manifests.write().insert(manifest, path.into());
    }

    /// Load using the configured settings for this plugin, or an empty object
    pub fn load_with_defaults(&self, name: &str) -> RegistryResult<LoadOutcome> {
        let settings = self
            .settings
            .get(name)
            .cloned()
            .unwrap_or_else(|| PluginSettings::Object(Default::default()));
        self.load(name, settings)
    }

    /// Load and initialize a discovered plugin
    pub fn load(&self, name: &str, settings: PluginSettings) -> RegistryResult<LoadOutcome> {
        let _lifecycle = self.lifecycle.lock();

        if self.active.read().plugins.contains_key(name) {
            debug!(plugin = %name, "Plugin already loaded");
            return Ok(LoadOutcome::AlreadyLoaded);
        }

        let manifest = self
            .manifests
            .read()
            .get(name)
            .map(|d| d.manifest.clone())
            .ok_or_else(|| {
                error!(plugin = %name, "Plugin not found");
                RegistryError::NotFound {
                    name: name.to_string(),
                }
            })?;

        self.check_dependencies(&manifest)?;

        let result = self.instantiate(&manifest, &settings);
        let instance = match result {
            Ok(instance) => instance,
            Err(e) => {
                log_registry_operation(
                    operations::LOAD,
                    name,
                    Some(manifest.version.as_str()),
                    "failed",
                    Some(e.to_string().as_str()),
                );
                return Err(e);
            }
        };

        let handle = PluginHandle::new(name, instance);
        let reported = handle.get_capabilities();
        if !reported.is_empty() && reported.iter().any(|c| !manifest.has_capability(c)) {
            warn!(
                plugin = %name,
                manifest = ?manifest.capabilities,
                reported = ?reported,
                "Plugin reports capabilities its manifest does not declare"
            );
        }

        {
            let mut active = self.active.write();
            let load_seq = active.next_seq;
            active.next_seq += 1;
            active.plugins.insert(
                name.to_string(),
                LoadedPlugin {
                    manifest: manifest.clone(),
                    handle,
                    enabled: true,
                    load_seq,
                    loaded_at: Utc::now(),
                },
            );
        }

        log_registry_operation(operations::LOAD, name, Some(manifest.version.as_str()), "loaded", None);
        Ok(LoadOutcome::Loaded)
    }

    fn check_dependencies(&self, manifest: &PluginManifest) -> RegistryResult<()> {
        let active = self.active.read();
        if let Some(missing) = manifest
            .dependencies
            .iter()
            .find(|dep| !active.plugins.contains_key(dep.as_str()))
        {
            warn!(plugin = %manifest.name, dependency = %missing, "Missing dependency");
            return Err(RegistryError::MissingDependency {
                name: manifest.name.clone(),
                dependency: missing.clone(),
            });
        }
        Ok(())
    }

    /// Resolve, construct and initialize; any fault leaves no trace
    fn instantiate(
        &self,
        manifest: &PluginManifest,
        settings: &PluginSettings,
    ) -> RegistryResult<Arc<dyn Plugin>> {
        let name = &manifest.name;
        let factory = self.factories.resolve(&manifest.plugin_class).ok_or_else(|| {
            RegistryError::ImplementationNotFound {
                name: name.clone(),
                plugin_class: manifest.plugin_class.clone(),
            }
        })?;

        let init_failed = |reason: String| RegistryError::InitializationFailed {
            name: name.clone(),
            reason,
        };

        let instance = match catch_unwind(AssertUnwindSafe(|| factory(settings))) {
            Ok(Ok(instance)) => instance,
            Ok(Err(e)) => return Err(init_failed(format!("construction failed: {e:#}"))),
            Err(payload) => {
                return Err(init_failed(format!(
                    "constructor panicked: {}",
                    panic_message(payload.as_ref())
                )))
            }
        };

        match catch_unwind(AssertUnwindSafe(|| instance.initialize())) {
            Ok(true) => Ok(instance),
            Ok(false) => Err(init_failed("initialize returned false".to_string())),
            Err(payload) => Err(init_failed(format!(
                "initialize panicked: {}",
                panic_message(payload.as_ref())
            ))),
        }
    }

    /// Shut down and remove an active plugin
    ///
    /// The shutdown hook is best-effort: a panic inside it is logged and the
    /// plugin is removed regardless.
    pub fn unload(&self, name: &str) -> RegistryResult<()> {
        let _lifecycle = self.lifecycle.lock();

        let removed = self.active.write().plugins.remove(name);
        let Some(plugin) = removed else {
            warn!(plugin = %name, "Plugin not loaded");
            return Err(RegistryError::NotLoaded {
                name: name.to_string(),
            });
        };

        let dependents: Vec<String> = self
            .active
            .read()
            .plugins
            .values()
            .filter(|p| p.manifest.dependencies.iter().any(|d| d == name))
            .map(|p| p.manifest.name.clone())
            .collect();
        if !dependents.is_empty() {
            warn!(plugin = %name, dependents = ?dependents, "Unloading plugin that others depend on");
        }

        let instance = plugin.handle.instance().clone();
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| instance.shutdown())) {
            log_error(
                "plugin",
                operations::UNLOAD,
                &format!("shutdown hook panicked: {}", panic_message(payload.as_ref())),
                Some(name),
            );
        }

        log_registry_operation(
            operations::UNLOAD,
            name,
            Some(plugin.manifest.version.as_str()),
            "unloaded",
            None,
        );
        Ok(())
    }

    pub fn enable(&self, name: &str) -> RegistryResult<()> {
        self.set_enabled(name, true)
    }

    pub fn disable(&self, name: &str) -> RegistryResult<()> {
        self.set_enabled(name, false)
    }

    fn set_enabled(&self, name: &str, enabled: bool) -> RegistryResult<()> {
        let mut active = self.active.write();
        let plugin = active
            .plugins
            .get_mut(name)
            .ok_or_else(|| RegistryError::NotLoaded {
                name: name.to_string(),
            })?;
        plugin.enabled = enabled;

        let operation = if enabled {
            operations::ENABLE
        } else {
            operations::DISABLE
        };
        info!(plugin = %name, operation = operation, "Plugin state changed");
        Ok(())
    }

    /// Active and enabled plugins whose manifest declares `capability`, in load order
    pub fn providers_for(&self, capability: &str) -> Vec<PluginHandle> {
        self.active
            .read()
            .in_load_order()
            .into_iter()
            .filter(|p| p.enabled && p.manifest.has_capability(capability))
            .map(|p| p.handle.clone())
            .collect()
    }

    /// Load every discovered manifest in discovery order
    ///
    /// With `enabled_only`, manifests whose default-enabled flag is false are
    /// skipped. Returns the number of successful loads (already-loaded plugins
    /// count as successes).
    pub fn load_all(&self, enabled_only: bool) -> usize {
        let candidates: Vec<(String, bool)> = self
            .manifests
            .read()
            .iter()
            .map(|d| (d.manifest.name.clone(), d.manifest.enabled))
            .collect();
        let total = candidates.len();

        let mut loaded_count = 0;
        for (name, default_enabled) in candidates {
            if enabled_only && !default_enabled {
                info!(plugin = %name, "Skipping disabled plugin");
                continue;
            }
            match self.load_with_defaults(&name) {
                Ok(_) => loaded_count += 1,
                Err(e) => error!(plugin = %name, error = %e, "Failed to load plugin"),
            }
        }

        info!(loaded = loaded_count, total = total, "Loaded plugins");
        loaded_count
    }

    /// Unload every active plugin, most recently loaded first
    pub fn unload_all(&self) {
        let names: Vec<String> = self.active_names().into_iter().rev().collect();
        for name in names {
            if let Err(e) = self.unload(&name) {
                warn!(plugin = %name, error = %e, "Failed to unload plugin");
            }
        }
    }

    /// Handle to an active plugin, enabled or not
    pub fn get(&self, name: &str) -> Option<PluginHandle> {
        self.active.read().plugins.get(name).map(|p| p.handle.clone())
    }

    pub fn manifest(&self, name: &str) -> Option<Arc<PluginManifest>> {
        self.manifests.read().get(name).map(|d| d.manifest.clone())
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.active.read().plugins.contains_key(name)
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.active
            .read()
            .plugins
            .get(name)
            .map(|p| p.enabled)
            .unwrap_or(false)
    }

    /// Active plugin names in load order
    pub fn active_names(&self) -> Vec<String> {
        self.active
            .read()
            .in_load_order()
            .into_iter()
            .map(|p| p.manifest.name.clone())
            .collect()
    }

    pub fn discovered_names(&self) -> Vec<String> {
        self.manifests.read().names()
    }

    pub fn plugin_info(&self, name: &str) -> Option<PluginInfo> {
        let manifests = self.manifests.read();
        let discovered = manifests.get(name)?;
        let active = self.active.read();
        let loaded = active.plugins.get(name);
        let manifest = &discovered.manifest;

        Some(PluginInfo {
            name: manifest.name.clone(),
            version: manifest.version.clone(),
            description: manifest.description.clone(),
            author: manifest.author.clone(),
            capabilities: manifest.capabilities.clone(),
            dependencies: manifest.dependencies.clone(),
            loaded: loaded.is_some(),
            enabled: loaded.map(|p| p.enabled).unwrap_or(manifest.enabled),
            loaded_at: loaded.map(|p| p.loaded_at),
            path: discovered.path.clone(),
        })
    }

    /// Info for every discovered plugin, in discovery order
    pub fn list_plugins(&self) -> Vec<PluginInfo> {
        self.discovered_names()
            .iter()
            .filter_map(|name| self.plugin_info(name))
            .collect()
    }

    pub fn stats(&self) -> PluginStats {
        let discovered = self.manifests.read().len();
        let active = self.active.read();
        let enabled = active.plugins.values().filter(|p| p.enabled).count();
        PluginStats {
            discovered_plugins: discovered,
            loaded_plugins: active.plugins.len(),
            enabled_plugins: enabled,
            disabled_plugins: active.plugins.len() - enabled,
        }
    }
}

/// Snapshot of a discovered plugin's manifest and runtime state
#[derive(Debug, Clone, Serialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: String,
    pub capabilities: Vec<String>,
    pub dependencies: Vec<String>,
    pub loaded: bool,
    pub enabled: bool,
    pub loaded_at: Option<DateTime<Utc>>,
    pub path: PathBuf,
}

/// Statistics about discovered and active plugins
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginStats {
    pub discovered_plugins: usize,
    pub loaded_plugins: usize,
    pub enabled_plugins: usize,
    pub disabled_plugins: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::plugin::CommandContext;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Stub {
        init_ok: bool,
        shutdowns: Arc<AtomicUsize>,
    }

    impl Plugin for Stub {
        fn initialize(&self) -> bool {
            self.init_ok
        }

        fn shutdown(&self) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }

        fn handle_command(&self, command: &str, _: &CommandContext) -> anyhow::Result<Value> {
            Ok(json!(command))
        }
    }

    fn manifest(name: &str, class: &str, caps: &[&str], deps: &[&str]) -> PluginManifest {
        PluginManifest {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            description: format!("{name} plugin"),
            author: "tests".to_string(),
            plugin_class: class.to_string(),
            capabilities: caps.iter().map(|s| s.to_string()).collect(),
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
            config_schema: Default::default(),
            enabled: true,
        }
    }

    fn registry_with(shutdowns: Arc<AtomicUsize>) -> PluginRegistry {
        let factories = Arc::new(PluginFactoryRegistry::new());
        let counter = shutdowns.clone();
        factories.register("stub.Ok", move |_| {
            Ok(Arc::new(Stub {
                init_ok: true,
                shutdowns: counter.clone(),
            }))
        });
        let counter = shutdowns;
        factories.register("stub.Refuses", move |_| {
            Ok(Arc::new(Stub {
                init_ok: false,
                shutdowns: counter.clone(),
            }))
        });
        PluginRegistry::new(factories)
    }

    #[test]
    fn test_registry_creation() {
        let registry = registry_with(Arc::new(AtomicUsize::new(0)));
        assert!(registry.list_plugins().is_empty());
        assert_eq!(registry.stats(), PluginStats::default());
    }

    #[test]
    fn test_plugin_lifecycle() {
        let shutdowns = Arc::new(AtomicUsize::new(0));
        let registry = registry_with(shutdowns.clone());
        registry.register_manifest(manifest("alpha", "stub.Ok", &["cap"], &[]), "mem/alpha");

        assert_eq!(registry.load("alpha", json!({})).unwrap(), LoadOutcome::Loaded);
        assert!(registry.is_enabled("alpha"));

        registry.disable("alpha").unwrap();
        assert!(!registry.is_enabled("alpha"));
        assert!(registry.manifest("alpha").unwrap().enabled);

        registry.enable("alpha").unwrap();
        assert!(registry.is_enabled("alpha"));

        registry.unload("alpha").unwrap();
        assert!(!registry.is_loaded("alpha"));
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_initialize_false_is_atomic_failure() {
        let registry = registry_with(Arc::new(AtomicUsize::new(0)));
        registry.register_manifest(manifest("lazy", "stub.Refuses", &[], &[]), "mem/lazy");

        let err = registry.load("lazy", json!({})).unwrap_err();
        assert!(matches!(err, RegistryError::InitializationFailed { .. }));
        assert!(registry.active_names().is_empty());
    }

    #[test]
    fn test_unknown_implementation() {
        let registry = registry_with(Arc::new(AtomicUsize::new(0)));
        registry.register_manifest(manifest("ghost", "stub.Missing", &[], &[]), "mem/ghost");

        let err = registry.load("ghost", json!({})).unwrap_err();
        assert_eq!(
            err,
            RegistryError::ImplementationNotFound {
                name: "ghost".to_string(),
                plugin_class: "stub.Missing".to_string()
            }
        );
    }

    #[test]
    fn test_enable_unknown_is_not_loaded() {
        let registry = registry_with(Arc::new(AtomicUsize::new(0)));
        assert_eq!(
            registry.enable("nope"),
            Err(RegistryError::NotLoaded {
                name: "nope".to_string()
            })
        );
        assert!(matches!(
            registry.unload("nope"),
            Err(RegistryError::NotLoaded { .. })
        ));
    }

    #[test]
    fn test_plugin_info_reflects_runtime_flag() {
        let registry = registry_with(Arc::new(AtomicUsize::new(0)));
        let mut off = manifest("off", "stub.Ok", &[], &[]);
        off.enabled = false;
        registry.register_manifest(off, "mem/off");

        let info = registry.plugin_info("off").unwrap();
        assert!(!info.loaded);
        assert!(!info.enabled);

        registry.load("off", json!({})).unwrap();
        let info = registry.plugin_info("off").unwrap();
        assert!(info.loaded);
        assert!(info.enabled);
        assert!(info.loaded_at.is_some());
    }

    #[test]
    fn test_stats() {
        let registry = registry_with(Arc::new(AtomicUsize::new(0)));
        registry.register_manifest(manifest("p1", "stub.Ok", &[], &[]), "mem/p1");
        registry.register_manifest(manifest("p2", "stub.Ok", &[], &[]), "mem/p2");
        registry.register_manifest(manifest("p3", "stub.Ok", &[], &[]), "mem/p3");

        registry.load("p1", json!({})).unwrap();
        registry.load("p2", json!({})).unwrap();
        registry.disable("p2").unwrap();

        assert_eq!(
            registry.stats(),
            PluginStats {
                discovered_plugins: 3,
                loaded_plugins: 2,
                enabled_plugins: 1,
                disabled_plugins: 1,
            }
        );
    }
}
