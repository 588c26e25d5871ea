//! # Plugin Runtime Contract
//!
//! Every loadable plugin implements [`Plugin`]. Instances are shared behind
//! `Arc` and must use interior mutability for any state they keep, because the
//! registry and dispatching callers may hold the same instance concurrently.

use super::errors::{RegistryError, RegistryResult};
use crate::constants::operations;
use crate::error::panic_message;
use crate::logging::log_error;
use serde_json::Value;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Free-form context passed alongside a command
pub type CommandContext = serde_json::Map<String, Value>;

/// Caller-supplied configuration handed to a plugin constructor
pub type PluginSettings = Value;

/// Behavior a loadable plugin provides
pub trait Plugin: Send + Sync {
    /// Acquire resources. Returning `false` aborts the load.
    fn initialize(&self) -> bool {
        true
    }

    /// Release resources. Called once on unload; failures are only logged.
    fn shutdown(&self) {}

    /// Capabilities the running instance reports
    fn get_capabilities(&self) -> Vec<String> {
        Vec::new()
    }

    /// Handle a command routed to this plugin. May have side effects.
    fn handle_command(&self, command: &str, context: &CommandContext) -> anyhow::Result<Value>;
}

/// Shared reference to an active plugin instance
///
/// Calls made through the handle never unwind into the caller.
#[derive(Clone)]
pub struct PluginHandle {
    name: Arc<str>,
    instance: Arc<dyn Plugin>,
}

impl PluginHandle {
    pub(crate) fn new(name: &str, instance: Arc<dyn Plugin>) -> Self {
        Self {
            name: Arc::from(name),
            instance,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle_command(&self, command: &str, context: &CommandContext) -> RegistryResult<Value> {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.instance.handle_command(command, context)
        }));

        let reason = match outcome {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => format!("{e:#}"),
            Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
        };

        log_error("plugin", operations::HANDLE_COMMAND, &reason, Some(&self.name));
        Err(RegistryError::CommandFailed {
            name: self.name.to_string(),
            reason,
        })
    }

    /// Capabilities reported by the instance; empty if the plugin faults
    pub fn get_capabilities(&self) -> Vec<String> {
        catch_unwind(AssertUnwindSafe(|| self.instance.get_capabilities())).unwrap_or_else(
            |payload| {
                log_error(
                    "plugin",
                    operations::GET_CAPABILITIES,
                    &format!("panicked: {}", panic_message(payload.as_ref())),
                    Some(&self.name),
                );
                Vec::new()
            },
        )
    }

    pub fn instance(&self) -> &Arc<dyn Plugin> {
        &self.instance
    }
}

impl fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginHandle").field("name", &self.name).finish()
    }
}
