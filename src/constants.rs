//! # System Constants
//!
//! Defaults and well-known names shared by the registry, the scheduler and the
//! orchestration boundary.

/// Operational defaults used when configuration leaves a value unset
pub mod system {
    /// Crate version marker
    pub const SWITCHYARD_VERSION: &str = env!("CARGO_PKG_VERSION");

    /// File looked up inside every plugin directory
    pub const MANIFEST_FILE_NAME: &str = "manifest.json";

    /// Default plugin search path
    pub const DEFAULT_PLUGIN_DIR: &str = "plugins";

    /// Default number of scheduler workers
    pub const DEFAULT_MAX_WORKERS: usize = 3;

    /// How long a worker blocks on the queue before re-checking the running flag
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

    /// Base delay for exponential retry backoff
    pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

    /// How long `stop` waits for each worker
    pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5000;

    /// Polling cadence of `get_result` while waiting
    pub const DEFAULT_RESULT_POLL_INTERVAL_MS: u64 = 100;

    /// Largest exponent applied to the backoff base
    pub const MAX_BACKOFF_EXPONENT: u32 = 20;
}

/// Status values written to the history store by the orchestrator
pub mod history_status {
    pub const PROCESSING: &str = "processing";
    pub const QUEUED: &str = "queued";
    pub const COMPLETED: &str = "completed";
    pub const FAILED: &str = "failed";
}

/// Operation names used in structured log records
pub mod operations {
    pub const DISCOVER: &str = "discover";
    pub const LOAD: &str = "load";
    pub const UNLOAD: &str = "unload";
    pub const ENABLE: &str = "enable";
    pub const DISABLE: &str = "disable";
    pub const SUBMIT: &str = "submit";
    pub const EXECUTE: &str = "execute";
    pub const RETRY: &str = "retry";
    pub const CANCEL: &str = "cancel";
    pub const DISPATCH: &str = "dispatch";
    pub const HANDLE_COMMAND: &str = "handle_command";
    pub const GET_CAPABILITIES: &str = "get_capabilities";
}
