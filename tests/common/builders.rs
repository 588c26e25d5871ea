use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use switchyard::config::SchedulerConfig;
use switchyard::registry::{PluginFactoryRegistry, PluginRegistry};
use tempfile::TempDir;

use super::plugins::register_test_factories;

/// Builder for a manifest written to `<root>/<dir_name>/manifest.json`
pub struct ManifestBuilder {
    dir_name: String,
    body: Value,
}

impl ManifestBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            dir_name: name.to_string(),
            body: json!({
                "name": name,
                "version": "1.0.0",
                "description": format!("{name} test plugin"),
                "author": "switchyard tests",
                "plugin_class": "test.Recorder",
                "capabilities": [],
                "dependencies": [],
            }),
        }
    }

    /// Directory name under the root; discovery order follows it
    pub fn dir_name(mut self, dir_name: &str) -> Self {
        self.dir_name = dir_name.to_string();
        self
    }

    pub fn plugin_class(mut self, plugin_class: &str) -> Self {
        self.body["plugin_class"] = json!(plugin_class);
        self
    }

    pub fn capabilities(mut self, capabilities: &[&str]) -> Self {
        self.body["capabilities"] = json!(capabilities);
        self
    }

    pub fn dependencies(mut self, dependencies: &[&str]) -> Self {
        self.body["dependencies"] = json!(dependencies);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.body["enabled"] = json!(enabled);
        self
    }

    pub fn write(self, root: &Path) -> PathBuf {
        let dir = root.join(&self.dir_name);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("manifest.json");
        fs::write(&path, serde_json::to_string_pretty(&self.body).unwrap()).unwrap();
        path
    }
}

/// Write raw text as a manifest, for malformed-input cases
pub fn write_raw_manifest(root: &Path, dir_name: &str, contents: &str) -> PathBuf {
    let dir = root.join(dir_name);
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join("manifest.json");
    fs::write(&path, contents).unwrap();
    path
}

/// Registry backed by the test factories, plus the temp dir holding its plugins
pub fn test_registry() -> (Arc<PluginRegistry>, TempDir) {
    let factories = Arc::new(PluginFactoryRegistry::new());
    register_test_factories(&factories);
    let registry = Arc::new(PluginRegistry::new(factories));
    (registry, TempDir::new().unwrap())
}

/// Scheduler settings with short intervals so tests stay fast
pub fn fast_scheduler_config(workers: usize) -> SchedulerConfig {
    SchedulerConfig {
        max_workers: workers,
        poll_interval_ms: 20,
        default_retry_delay_ms: 10,
        shutdown_timeout_ms: 1000,
        result_poll_interval_ms: 5,
        ..SchedulerConfig::default()
    }
}
