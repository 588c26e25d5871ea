//! # Orchestrator
//!
//! Turns classified commands into plugin invocations. An intent label is
//! mapped to a capability through the routing table; the first enabled
//! provider of that capability (in load order) handles the command.
//!
//! Commands run either inline ([`Orchestrator::dispatch`]) or as scheduler
//! tasks ([`Orchestrator::dispatch_async`]). Both paths keep a
//! [`TaskRecord`](super::history::TaskRecord) per command in the history
//! store.

use super::errors::{DispatchError, DispatchResult};
use super::history::{HistoryStore, TaskRecord};
use crate::config::SwitchyardConfig;
use crate::constants::{history_status, operations};
use crate::execution::{TaskError, TaskId, TaskPriority, TaskScheduler, TaskSpec};
use crate::registry::{CommandContext, PluginFactoryRegistry, PluginHandle, PluginRegistry};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Output of the upstream intent classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedCommand {
    pub raw_text: String,
    pub intent: String,
    #[serde(default)]
    pub entities: Map<String, Value>,
}

impl ClassifiedCommand {
    pub fn new(raw_text: impl Into<String>, intent: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            intent: intent.into(),
            entities: Map::new(),
        }
    }

    pub fn with_entity(mut self, key: impl Into<String>, value: Value) -> Self {
        self.entities.insert(key.into(), value);
        self
    }

    fn context(&self) -> CommandContext {
        let mut context = CommandContext::new();
        context.insert("intent".to_string(), Value::String(self.intent.clone()));
        context.insert("entities".to_string(), Value::Object(self.entities.clone()));
        context
    }
}

/// Result of a synchronous dispatch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchOutcome {
    pub record_id: String,
    pub capability: String,
    pub plugin: String,
    pub value: Value,
    pub execution_time_ms: u64,
}

/// Routes classified commands to plugins and records their outcomes
pub struct Orchestrator {
    registry: Arc<PluginRegistry>,
    scheduler: Arc<TaskScheduler>,
    history: Arc<dyn HistoryStore>,
    /// Lowercased intent label -> capability
    routes: HashMap<String, String>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<PluginRegistry>,
        scheduler: Arc<TaskScheduler>,
        history: Arc<dyn HistoryStore>,
        routes: HashMap<String, String>,
    ) -> Self {
        let routes = routes
            .into_iter()
            .map(|(intent, capability)| (intent.to_lowercase(), capability))
            .collect();
        Self {
            registry,
            scheduler,
            history,
            routes,
        }
    }

    /// Build a running orchestrator from configuration
    ///
    /// Discovers the configured plugin directories, loads plugins when
    /// `plugins.auto_load` is set, and starts the scheduler.
    pub fn bootstrap(
        config: &SwitchyardConfig,
        factories: Arc<PluginFactoryRegistry>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        let registry = Arc::new(PluginRegistry::from_config(&config.plugins, factories));
        let discovered = registry.discover_configured();
        let loaded = if config.plugins.auto_load {
            registry.load_all(config.plugins.enabled_only)
        } else {
            0
        };

        let scheduler = Arc::new(TaskScheduler::new(config.scheduler.clone()));
        scheduler.start();

        info!(
            discovered = discovered.len(),
            loaded = loaded,
            routes = config.routes.len(),
            "Orchestrator bootstrapped"
        );
        Self::new(registry, scheduler, history, config.routes.clone())
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn scheduler(&self) -> &Arc<TaskScheduler> {
        &self.scheduler
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    /// Capability routed from an intent label (case-insensitive)
    pub fn resolve_capability(&self, intent: &str) -> Option<&str> {
        self.routes.get(&intent.to_lowercase()).map(String::as_str)
    }

    fn provider_for(&self, command: &ClassifiedCommand) -> DispatchResult<(String, PluginHandle)> {
        let capability = self
            .resolve_capability(&command.intent)
            .ok_or_else(|| DispatchError::NoRoute {
                intent: command.intent.clone(),
            })?
            .to_string();
        let provider = first_provider(&self.registry, &capability)?;
        Ok((capability, provider))
    }

    /// Handle a command on the calling thread
    pub fn dispatch(&self, command: &ClassifiedCommand) -> DispatchResult<DispatchOutcome> {
        let record_id = Uuid::new_v4().to_string();
        self.history.append(TaskRecord::new(
            record_id.as_str(),
            command.raw_text.as_str(),
            command.intent.as_str(),
            history_status::PROCESSING,
        ));

        let started = Instant::now();
        let outcome = self.provider_for(command).and_then(|(capability, provider)| {
            let value = provider.handle_command(&command.raw_text, &command.context())?;
            Ok((capability, provider, value))
        });
        let execution_time_ms = elapsed_ms(started);

        match outcome {
            Ok((capability, provider, value)) => {
                self.history.update_status(
                    &record_id,
                    history_status::COMPLETED,
                    Some(value.to_string()),
                    None,
                    execution_time_ms,
                );
                info!(
                    operation = operations::DISPATCH,
                    intent = %command.intent,
                    capability = %capability,
                    plugin = %provider.name(),
                    elapsed_ms = execution_time_ms,
                    "Command dispatched"
                );
                Ok(DispatchOutcome {
                    record_id,
                    capability,
                    plugin: provider.name().to_string(),
                    value,
                    execution_time_ms,
                })
            }
            Err(e) => {
                self.history.update_status(
                    &record_id,
                    history_status::FAILED,
                    None,
                    Some(e.to_string()),
                    execution_time_ms,
                );
                warn!(
                    operation = operations::DISPATCH,
                    intent = %command.intent,
                    error = %e,
                    "Command dispatch failed"
                );
                Err(e)
            }
        }
    }

    /// Queue a command on the scheduler and return its task id
    ///
    /// Routing is checked up front so unroutable commands fail immediately.
    /// The provider is chosen again when the task runs, since the registry
    /// may change while the task waits in the queue. The history record uses
    /// the task id and is finalized by the task's callbacks.
    pub fn dispatch_async(
        &self,
        command: ClassifiedCommand,
        priority: TaskPriority,
    ) -> DispatchResult<TaskId> {
        let (capability, _) = self.provider_for(&command)?;

        let task_id = TaskId::new();
        let record_id = task_id.to_string();
        self.history.append(TaskRecord::new(
            record_id.as_str(),
            command.raw_text.as_str(),
            command.intent.as_str(),
            history_status::QUEUED,
        ));

        let submitted = Instant::now();
        let registry = self.registry.clone();
        let work_capability = capability.clone();
        let context = command.context();
        let raw_text = command.raw_text.clone();

        let on_success = {
            let history = self.history.clone();
            let record_id = record_id.clone();
            move |value: &Value| {
                history.update_status(
                    &record_id,
                    history_status::COMPLETED,
                    Some(value.to_string()),
                    None,
                    elapsed_ms(submitted),
                );
            }
        };
        let on_error = {
            let history = self.history.clone();
            let record_id = record_id.clone();
            move |err: &TaskError| {
                history.update_status(
                    &record_id,
                    history_status::FAILED,
                    None,
                    Some(err.to_string()),
                    elapsed_ms(submitted),
                );
            }
        };

        let spec = TaskSpec::new(move |_ctx| {
            let provider = first_provider(&registry, &work_capability)?;
            Ok(provider.handle_command(&raw_text, &context)?)
        })
        .with_id(task_id)
        .priority(priority)
        .on_success(on_success)
        .on_error(on_error);

        let submitted_id = self.scheduler.submit(spec);
        info!(
            operation = operations::DISPATCH,
            task_id = %submitted_id,
            intent = %command.intent,
            capability = %capability,
            priority = %priority,
            "Command queued"
        );
        Ok(submitted_id)
    }

    /// Stop the scheduler, then unload every plugin
    pub fn shutdown(&self) {
        info!("Orchestrator shutdown initiated");
        self.scheduler.stop(self.scheduler.config().shutdown_timeout());
        self.registry.unload_all();
        let stats = self.history.stats();
        info!(
            total_tasks = stats.total_tasks,
            completed = stats.completed,
            failed = stats.failed,
            "Orchestrator shutdown complete"
        );
    }
}

fn first_provider(registry: &PluginRegistry, capability: &str) -> DispatchResult<PluginHandle> {
    registry
        .providers_for(capability)
        .into_iter()
        .next()
        .ok_or_else(|| {
            error!(capability = %capability, "No provider available");
            DispatchError::NoProvider {
                capability: capability.to_string(),
            }
        })
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}
