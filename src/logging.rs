//! # Structured Logging Module
//!
//! Environment-aware structured logging to the console and, optionally, to a
//! JSON file for post-mortem inspection of scheduler and plugin activity.

use crate::config::LoggingConfig;
use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<Option<WorkerGuard>> = OnceLock::new();

/// Initialize structured logging once per process
///
/// `RUST_LOG` takes precedence over the configured level. If a global
/// subscriber is already installed the existing one is kept.
pub fn init_structured_logging(config: &LoggingConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = config
            .level
            .clone()
            .unwrap_or_else(|| get_log_level(&environment).to_string());

        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_level(true)
            .with_filter(build_filter(&log_level));

        let mut guard = None;
        let file_layer = if config.json_file {
            match open_log_file(&config.log_dir, &environment) {
                Ok((dir, file_name)) => {
                    let appender = tracing_appender::rolling::never(dir, file_name);
                    let (writer, worker_guard) = tracing_appender::non_blocking(appender);
                    guard = Some(worker_guard);
                    Some(
                        fmt::layer()
                            .with_writer(writer)
                            .with_target(true)
                            .with_thread_names(true)
                            .with_ansi(false)
                            .json()
                            .with_filter(build_filter(&log_level)),
                    )
                }
                Err(e) => {
                    eprintln!("switchyard: cannot create log directory {}: {e}", config.log_dir);
                    None
                }
            }
        } else {
            None
        };

        let result = tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer)
            .try_init();

        if result.is_err() {
            tracing::debug!("Global tracing subscriber already initialized - keeping it");
        }

        tracing::info!(
            pid = process::id(),
            environment = %environment,
            level = %log_level,
            json_file = config.json_file,
            "Structured logging initialized"
        );

        guard
    });
}

fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

fn open_log_file(log_dir: &str, environment: &str) -> std::io::Result<(PathBuf, String)> {
    let dir = PathBuf::from(log_dir);
    fs::create_dir_all(&dir)?;
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    Ok((dir, format!("{environment}.{}.{timestamp}.log", process::id())))
}

fn get_environment() -> String {
    std::env::var("SWITCHYARD_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Log structured data for registry operations
pub fn log_registry_operation(
    operation: &str,
    name: &str,
    version: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        name = %name,
        version = version,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "REGISTRY_OPERATION"
    );
}

/// Log structured data for task operations
pub fn log_task_operation(
    operation: &str,
    task_id: &str,
    priority: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::debug!(
        operation = %operation,
        task_id = %task_id,
        priority = priority,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "TASK_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "ERROR"
    );
}
