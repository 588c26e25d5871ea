//! # Task Execution
//!
//! Priority scheduling of background work on a fixed pool of worker threads.
//!
//! ```text
//! submit ──> PriorityTaskQueue ──> worker threads ──> results / callbacks
//!                   ▲                     │
//!                   └──── RetryTimer <────┘  (failed attempts with retries left)
//! ```

pub mod priority_queue;
pub mod retry_timer;
pub mod scheduler;
pub mod task;

pub use priority_queue::PriorityTaskQueue;
pub use retry_timer::RetryTimer;
pub use scheduler::{SchedulerStats, TaskScheduler};
pub use task::{
    ErrorCallback, SuccessCallback, TaskContext, TaskError, TaskId, TaskPriority, TaskResult,
    TaskSpec, TaskState, TaskWork,
};
