#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Switchyard Core
//!
//! Capability-routed plugin runtime and priority task scheduler for command
//! orchestration.
//!
//! ## Overview
//!
//! Switchyard sits between an intent classifier and the code that acts on a
//! command. Plugins are described by on-disk manifests, constructed through
//! explicitly registered factories, and looked up by the capabilities they
//! declare. Long-running work goes through a fixed pool of worker threads
//! with priorities, retries with exponential backoff, and per-attempt
//! timeouts.
//!
//! ## Module Organization
//!
//! - [`registry`] - Manifest discovery, plugin factories, lifecycle and capability lookup
//! - [`execution`] - Priority queue, retry timer and the task scheduler
//! - [`orchestration`] - Intent routing, dispatch and command history
//! - [`config`] - Layered configuration with environment overrides
//! - [`logging`] - Structured logging setup and helpers
//! - [`error`] - Crate-level error aggregation
//! - [`constants`] - Shared defaults and well-known names
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use switchyard::config::ConfigManager;
//! use switchyard::orchestration::{ClassifiedCommand, InMemoryHistory, Orchestrator};
//! use switchyard::registry::PluginFactoryRegistry;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! switchyard::logging::init_structured_logging(&manager.config().logging);
//!
//! let factories = Arc::new(PluginFactoryRegistry::new());
//! // factories.register("speech.Recognizer", |settings| ...);
//!
//! let orchestrator = Orchestrator::bootstrap(
//!     manager.config(),
//!     factories,
//!     Arc::new(InMemoryHistory::new()),
//! );
//! let outcome = orchestrator.dispatch(&ClassifiedCommand::new("what time is it", "time_query"))?;
//! println!("{}", outcome.value);
//! orchestrator.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod execution;
pub mod logging;
pub mod orchestration;
pub mod registry;

pub use config::{ConfigManager, SwitchyardConfig};
pub use error::{Result, SwitchyardError};
pub use execution::{TaskId, TaskPriority, TaskResult, TaskScheduler, TaskSpec};
pub use orchestration::{ClassifiedCommand, Orchestrator};
pub use registry::{Plugin, PluginFactoryRegistry, PluginManifest, PluginRegistry};
