//! # Plugin Factory Registry
//!
//! Resolves a manifest's `plugin_class` string to a constructor. Implementations
//! are registered explicitly at startup; nothing is resolved by reflection.
//!
//! ## Usage
//!
//! ```rust
//! use switchyard::registry::{CommandContext, Plugin, PluginFactoryRegistry};
//! use std::sync::Arc;
//!
//! struct Clock;
//!
//! impl Plugin for Clock {
//!     fn handle_command(&self, _: &str, _: &CommandContext) -> anyhow::Result<serde_json::Value> {
//!         Ok(serde_json::json!("12:00"))
//!     }
//! }
//!
//! let factories = PluginFactoryRegistry::new();
//! factories.register("clock.Clock", |_settings| Ok(Arc::new(Clock)));
//! assert!(factories.contains("clock.Clock"));
//! ```

use super::plugin::{Plugin, PluginSettings};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Constructor for one plugin implementation
pub type PluginFactory =
    Arc<dyn Fn(&PluginSettings) -> anyhow::Result<Arc<dyn Plugin>> + Send + Sync>;

/// Thread-safe map from implementation reference to constructor
#[derive(Default)]
pub struct PluginFactoryRegistry {
    factories: RwLock<HashMap<String, PluginFactory>>,
}

impl PluginFactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor, replacing any previous one under the same key
    pub fn register<F>(&self, plugin_class: impl Into<String>, factory: F)
    where
        F: Fn(&PluginSettings) -> anyhow::Result<Arc<dyn Plugin>> + Send + Sync + 'static,
    {
        let plugin_class = plugin_class.into();
        let replaced = self
            .factories
            .write()
            .insert(plugin_class.clone(), Arc::new(factory))
            .is_some();

        if replaced {
            info!(plugin_class = %plugin_class, "Replaced plugin factory");
        } else {
            debug!(plugin_class = %plugin_class, "Registered plugin factory");
        }
    }

    pub fn resolve(&self, plugin_class: &str) -> Option<PluginFactory> {
        self.factories.read().get(plugin_class).cloned()
    }

    pub fn unregister(&self, plugin_class: &str) -> bool {
        self.factories.write().remove(plugin_class).is_some()
    }

    pub fn contains(&self, plugin_class: &str) -> bool {
        self.factories.read().contains_key(plugin_class)
    }

    pub fn stats(&self) -> FactoryStats {
        let factories = self.factories.read();
        let mut plugin_classes: Vec<String> = factories.keys().cloned().collect();
        plugin_classes.sort();
        FactoryStats {
            registered_factories: factories.len(),
            plugin_classes,
        }
    }
}

/// Statistics about registered factories
#[derive(Debug, Clone)]
pub struct FactoryStats {
    pub registered_factories: usize,
    pub plugin_classes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::plugin::CommandContext;
    use serde_json::{json, Value};

    struct Configured(Value);

    impl Plugin for Configured {
        fn handle_command(&self, _: &str, _: &CommandContext) -> anyhow::Result<Value> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_register_and_resolve() {
        let factories = PluginFactoryRegistry::new();
        factories.register("cfg.Configured", |settings| {
            Ok(Arc::new(Configured(settings.clone())))
        });

        let factory = factories.resolve("cfg.Configured").unwrap();
        let plugin = factory(&json!({"volume": 3})).unwrap();
        let out = plugin.handle_command("x", &CommandContext::new()).unwrap();
        assert_eq!(out, json!({"volume": 3}));
        assert!(factories.resolve("cfg.Missing").is_none());
    }

    #[test]
    fn test_register_replaces_existing() {
        let factories = PluginFactoryRegistry::new();
        factories.register("k", |_| Ok(Arc::new(Configured(json!(1)))));
        factories.register("k", |_| Ok(Arc::new(Configured(json!(2)))));

        let plugin = factories.resolve("k").unwrap()(&Value::Null).unwrap();
        assert_eq!(plugin.handle_command("", &CommandContext::new()).unwrap(), json!(2));
        assert_eq!(factories.stats().registered_factories, 1);
    }

    #[test]
    fn test_unregister() {
        let factories = PluginFactoryRegistry::new();
        factories.register("k", |_| Ok(Arc::new(Configured(Value::Null))));
        assert!(factories.unregister("k"));
        assert!(!factories.unregister("k"));
        assert!(!factories.contains("k"));
    }
}
