//! # Task Model
//!
//! Identifiers, priorities, outcomes and the submission builder used by the
//! [`TaskScheduler`](super::scheduler::TaskScheduler).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Unique, opaque task identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Scheduling priority. Lower rank runs first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Critical = 0,
    High = 1,
    #[default]
    Normal = 2,
    Low = 3,
    Background = 4,
}

impl TaskPriority {
    pub fn rank(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
            Self::Background => "background",
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "normal" => Ok(Self::Normal),
            "low" => Ok(Self::Low),
            "background" => Ok(Self::Background),
            other => Err(format!("Invalid task priority: {other}")),
        }
    }
}

/// Where a task currently is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Queued and not yet picked up
    Pending,
    Running,
    /// Failed an attempt and waiting to run again
    RetryScheduled,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::RetryScheduled => "retry_scheduled",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Why an attempt failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskError {
    #[error("{message}")]
    Execution { message: String },

    #[error("Task timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Task panicked: {message}")]
    Panicked { message: String },
}

impl TaskError {
    pub fn execution(error: &anyhow::Error) -> Self {
        Self::Execution {
            message: format!("{error:#}"),
        }
    }

    pub fn timeout(timeout: Duration) -> Self {
        Self::Timeout {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Outcome of one attempt of a task
///
/// Intermediate failures that lead to a retry are recorded too; the last
/// record written for an id reflects its final attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub success: bool,
    pub value: Option<Value>,
    pub error: Option<TaskError>,
    #[serde(with = "duration_millis")]
    pub execution_time: Duration,
    pub retry_count: u32,
    pub completed_at: DateTime<Utc>,
}

impl TaskResult {
    pub(crate) fn succeeded(
        task_id: TaskId,
        value: Value,
        execution_time: Duration,
        retry_count: u32,
    ) -> Self {
        Self {
            task_id,
            success: true,
            value: Some(value),
            error: None,
            execution_time,
            retry_count,
            completed_at: Utc::now(),
        }
    }

    pub(crate) fn failed(
        task_id: TaskId,
        error: TaskError,
        execution_time: Duration,
        retry_count: u32,
    ) -> Self {
        Self {
            task_id,
            success: false,
            value: None,
            error: Some(error),
            execution_time,
            retry_count,
            completed_at: Utc::now(),
        }
    }
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}

/// Per-attempt view handed to the work function
#[derive(Debug, Clone)]
pub struct TaskContext {
    task_id: TaskId,
    attempt: u32,
    cancelled: Arc<AtomicBool>,
}

impl TaskContext {
    pub(crate) fn new(task_id: TaskId, attempt: u32) -> Self {
        Self {
            task_id,
            attempt,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Zero-based attempt number (equal to the retry count so far)
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Set once the scheduler has given up waiting on this attempt.
    ///
    /// Long-running work should poll this and return early; the scheduler
    /// cannot forcibly stop a running closure.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

/// The unit of work a task runs on each attempt
pub type TaskWork = Arc<dyn Fn(&TaskContext) -> anyhow::Result<Value> + Send + Sync>;

/// Invoked once with the value of a successful task
pub type SuccessCallback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Invoked once with the error of a task that failed for good
pub type ErrorCallback = Arc<dyn Fn(&TaskError) + Send + Sync>;

/// Builder describing a task submission
#[derive(Clone)]
pub struct TaskSpec {
    pub(crate) id: Option<TaskId>,
    pub(crate) work: TaskWork,
    pub(crate) priority: TaskPriority,
    pub(crate) max_retries: u32,
    pub(crate) retry_delay: Option<Duration>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) on_success: Option<SuccessCallback>,
    pub(crate) on_error: Option<ErrorCallback>,
}

impl TaskSpec {
    pub fn new<F>(work: F) -> Self
    where
        F: Fn(&TaskContext) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self {
            id: None,
            work: Arc::new(work),
            priority: TaskPriority::Normal,
            max_retries: 0,
            retry_delay: None,
            timeout: None,
            on_success: None,
            on_error: None,
        }
    }

    /// Pre-assign the id so callers can reference it before submission
    pub(crate) fn with_id(mut self, id: TaskId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Base of the exponential backoff; the scheduler default applies when unset
    pub fn retry_delay(mut self, base: Duration) -> Self {
        self.retry_delay = Some(base);
        self
    }

    /// Per-attempt wall-clock limit.
    ///
    /// An expired attempt is recorded as [`TaskError::Timeout`] and its
    /// [`TaskContext`] is marked cancelled. Work that never checks
    /// [`TaskContext::is_cancelled`] keeps running on a detached thread.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(callback));
        self
    }

    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&TaskError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSpec")
            .field("priority", &self.priority)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("timeout", &self.timeout)
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// A submitted task as it travels through the queue
pub(crate) struct Task {
    pub id: TaskId,
    pub priority: TaskPriority,
    pub work: TaskWork,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub timeout: Option<Duration>,
    pub on_success: Option<SuccessCallback>,
    pub on_error: Option<ErrorCallback>,
    pub retry_count: u32,
}

impl Task {
    pub fn from_spec(spec: TaskSpec, default_retry_delay: Duration) -> Self {
        let retry_delay = match spec.retry_delay {
            Some(base) if !base.is_zero() => base,
            _ => default_retry_delay,
        };
        Self {
            id: spec.id.unwrap_or_default(),
            priority: spec.priority,
            work: spec.work,
            max_retries: spec.max_retries,
            retry_delay,
            timeout: spec.timeout,
            on_success: spec.on_success,
            on_error: spec.on_error,
            retry_count: 0,
        }
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// `base * 2^retry_count`, evaluated before the count is incremented
    pub fn backoff_delay(&self) -> Duration {
        let exponent = self
            .retry_count
            .min(crate::constants::system::MAX_BACKOFF_EXPONENT);
        self.retry_delay.saturating_mul(1u32 << exponent)
    }
}
