//! # Orchestration
//!
//! The boundary between an upstream intent classifier and the plugin
//! runtime: routing, dispatch and command history.
//!
//! ```text
//! ClassifiedCommand ──> routes (intent -> capability)
//!                              │
//!                              ▼
//!                 PluginRegistry::providers_for ──> PluginHandle::handle_command
//!                              │                          (inline or on TaskScheduler)
//!                              ▼
//!                        HistoryStore
//! ```

pub mod errors;
pub mod history;
pub mod orchestrator;

pub use errors::{DispatchError, DispatchResult};
pub use history::{HistoryStats, HistoryStore, InMemoryHistory, TaskRecord};
pub use orchestrator::{ClassifiedCommand, DispatchOutcome, Orchestrator};
