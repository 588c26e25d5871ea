//! # Task Scheduler
//!
//! Fixed pool of worker threads draining a shared priority queue.
//!
//! ## Lifecycle of a task
//!
//! ```text
//! submit ──> Pending ──> Running ──┬──> Succeeded
//!               │                  ├──> Failed
//!               │                  └──> RetryScheduled ──> Running ...
//!               └──> Cancelled (only before a worker picks it up)
//! ```
//!
//! Every attempt writes a [`TaskResult`]; a retried task therefore exposes
//! its intermediate failure until the next attempt finishes. Use
//! [`TaskScheduler::wait_for_completion`] to wait for a terminal outcome.
//!
//! The queue is unbounded. Submitting faster than the workers drain it grows
//! memory without limit.

use super::priority_queue::PriorityTaskQueue;
use super::retry_timer::RetryTimer;
use super::task::{Task, TaskContext, TaskError, TaskId, TaskResult, TaskSpec, TaskState};
use crate::config::{BackoffStrategy, SchedulerConfig};
use crate::constants::operations;
use crate::error::panic_message;
use crate::logging::log_task_operation;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Bookkeeping for every task the scheduler has seen
#[derive(Default)]
struct Ledger {
    /// Submitted and not yet resolved by any attempt
    pending: HashSet<TaskId>,
    running: HashSet<TaskId>,
    retrying: HashSet<TaskId>,
    /// Cancelled before starting; reported until `clear_completed`
    cancelled: HashSet<TaskId>,
    /// Cancelled tasks still sitting in the queue. Only a worker popping
    /// the task removes its entry.
    discard: HashSet<TaskId>,
    completed: HashMap<TaskId, TaskResult>,
}

impl Ledger {
    fn state_of(&self, id: &TaskId) -> Option<TaskState> {
        if self.running.contains(id) {
            Some(TaskState::Running)
        } else if self.retrying.contains(id) {
            Some(TaskState::RetryScheduled)
        } else if self.cancelled.contains(id) {
            Some(TaskState::Cancelled)
        } else if self.pending.contains(id) {
            Some(TaskState::Pending)
        } else {
            self.completed.get(id).map(|r| {
                if r.success {
                    TaskState::Succeeded
                } else {
                    TaskState::Failed
                }
            })
        }
    }

    fn record(&mut self, result: TaskResult) {
        self.pending.remove(&result.task_id);
        self.running.remove(&result.task_id);
        self.completed.insert(result.task_id, result);
    }
}

struct SchedulerInner {
    config: SchedulerConfig,
    queue: Arc<PriorityTaskQueue<Task>>,
    retry_timer: RetryTimer<Task>,
    ledger: Mutex<Ledger>,
    running: AtomicBool,
    /// Bumped on every start so workers from an earlier run retire
    generation: AtomicU64,
}

impl SchedulerInner {
    fn is_current(&self, generation: u64) -> bool {
        self.running.load(Ordering::Acquire)
            && self.generation.load(Ordering::Acquire) == generation
    }

    fn enqueue(&self, task: Task) {
        self.queue.push(task.priority.rank(), task);
    }
}

struct WorkerSet {
    /// Worker index paired with its thread
    handles: Vec<(usize, JoinHandle<()>)>,
    exits: Receiver<usize>,
}

/// Priority task scheduler with retries, backoff and per-attempt timeouts
///
/// # Examples
///
/// ```rust
/// use switchyard::config::SchedulerConfig;
/// use switchyard::execution::{TaskPriority, TaskScheduler, TaskSpec};
/// use std::time::Duration;
///
/// let scheduler = TaskScheduler::new(SchedulerConfig::default());
/// scheduler.start();
///
/// let id = scheduler.submit(
///     TaskSpec::new(|_ctx| Ok(serde_json::json!(42))).priority(TaskPriority::High),
/// );
/// let result = scheduler
///     .wait_for_completion(&id, Duration::from_secs(5))
///     .expect("task finished");
/// assert_eq!(result.value, Some(serde_json::json!(42)));
///
/// scheduler.stop(Duration::from_secs(1));
/// ```
pub struct TaskScheduler {
    inner: Arc<SchedulerInner>,
    workers: Mutex<Option<WorkerSet>>,
}

impl TaskScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let queue = Arc::new(PriorityTaskQueue::new());
        let sink_queue = queue.clone();
        let retry_timer = RetryTimer::new(move |task: Task| {
            log_task_operation(
                operations::RETRY,
                &task.id.to_string(),
                Some(task.priority.as_str()),
                "requeued",
                None,
            );
            sink_queue.push(task.priority.rank(), task);
        });

        Self {
            inner: Arc::new(SchedulerInner {
                config,
                queue,
                retry_timer,
                ledger: Mutex::new(Ledger::default()),
                running: AtomicBool::new(false),
                generation: AtomicU64::new(0),
            }),
            workers: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Spawn the worker pool. A second call while running only logs a warning.
    pub fn start(&self) {
        let mut workers = self.workers.lock();
        if self.inner.running.swap(true, Ordering::AcqRel) {
            warn!("Task scheduler already running");
            return;
        }
        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;

        let (exit_tx, exit_rx) = channel::unbounded();
        let mut handles = Vec::with_capacity(self.inner.config.max_workers);
        for index in 0..self.inner.config.max_workers {
            let inner = self.inner.clone();
            let exit_tx = exit_tx.clone();
            let spawned = thread::Builder::new()
                .name(format!("switchyard-worker-{index}"))
                .spawn(move || worker_loop(inner, index, generation, exit_tx));
            match spawned {
                Ok(handle) => handles.push((index, handle)),
                Err(e) => error!(worker = index, error = %e, "Failed to spawn worker thread"),
            }
        }

        info!(
            workers = handles.len(),
            strategy = ?self.inner.config.backoff_strategy,
            "Task scheduler started"
        );
        *workers = Some(WorkerSet {
            handles,
            exits: exit_rx,
        });
    }

    /// Stop accepting work from the queue and wait for workers to exit.
    ///
    /// Waits at most `join_timeout` overall. Workers still busy when it
    /// elapses are detached; they finish their current attempt and exit.
    /// Queued tasks stay queued and run if the scheduler is started again.
    pub fn stop(&self, join_timeout: Duration) {
        let taken = {
            let mut workers = self.workers.lock();
            if !self.inner.running.swap(false, Ordering::AcqRel) {
                debug!("Task scheduler already stopped");
                return;
            }
            self.inner.queue.wake_all();
            workers.take()
        };
        let Some(set) = taken else {
            return;
        };

        let deadline = Instant::now() + join_timeout;
        let mut exited = HashSet::new();
        while exited.len() < set.handles.len() {
            match set.exits.recv_deadline(deadline) {
                Ok(index) => {
                    exited.insert(index);
                }
                Err(_) => break,
            }
        }
        let remaining = set.handles.len() - exited.len();

        // Unfinished workers are detached by dropping their handle.
        for (index, handle) in set.handles {
            if exited.contains(&index) && handle.join().is_err() {
                error!(worker = index, "Worker thread panicked");
            }
        }

        if remaining > 0 {
            warn!(
                still_running = remaining,
                timeout_ms = join_timeout.as_millis() as u64,
                "Task scheduler stopped before all workers exited"
            );
        } else {
            info!("Task scheduler stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Number of worker threads owned by the current run
    pub fn worker_count(&self) -> usize {
        self.workers
            .lock()
            .as_ref()
            .map(|set| set.handles.len())
            .unwrap_or(0)
    }

    /// Queue a task and return its id. Never blocks.
    pub fn submit(&self, spec: TaskSpec) -> TaskId {
        let task = Task::from_spec(spec, self.inner.config.default_retry_delay());
        let id = task.id;

        if !self.is_running() {
            warn!(task_id = %id, "Task submitted while scheduler is stopped; it runs after start");
        }

        log_task_operation(
            operations::SUBMIT,
            &id.to_string(),
            Some(task.priority.as_str()),
            "pending",
            None,
        );
        self.inner.ledger.lock().pending.insert(id);
        self.inner.enqueue(task);
        id
    }

    /// Convenience wrapper for work with default options
    pub fn submit_fn<F>(&self, work: F) -> TaskId
    where
        F: Fn(&TaskContext) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.submit(TaskSpec::new(work))
    }

    /// Cancel a task that has not started. Returns `false` once it has begun
    /// running, has a recorded result, or is unknown.
    pub fn cancel(&self, id: &TaskId) -> bool {
        let mut ledger = self.inner.ledger.lock();
        if !ledger.pending.contains(id) || ledger.running.contains(id) {
            return false;
        }
        ledger.pending.remove(id);
        ledger.cancelled.insert(*id);
        ledger.discard.insert(*id);
        drop(ledger);

        log_task_operation(operations::CANCEL, &id.to_string(), None, "cancelled", None);
        true
    }

    /// Latest recorded result, optionally polling up to `wait` for one
    pub fn get_result(&self, id: &TaskId, wait: Option<Duration>) -> Option<TaskResult> {
        self.poll_until(wait, || self.inner.ledger.lock().completed.get(id).cloned())
    }

    /// Result of the final attempt, polling up to `wait` for the task to settle.
    /// Returns `None` on timeout or for cancelled tasks.
    pub fn wait_for_completion(&self, id: &TaskId, wait: Duration) -> Option<TaskResult> {
        self.poll_until(Some(wait), || {
            let ledger = self.inner.ledger.lock();
            match ledger.state_of(id) {
                Some(TaskState::Succeeded) | Some(TaskState::Failed) => {
                    ledger.completed.get(id).cloned()
                }
                _ => None,
            }
        })
    }

    fn poll_until<T>(&self, wait: Option<Duration>, mut probe: impl FnMut() -> Option<T>) -> Option<T> {
        let deadline = wait.map(|w| Instant::now() + w);
        loop {
            if let Some(found) = probe() {
                return Some(found);
            }
            let deadline = deadline?;
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            thread::sleep(
                self.inner
                    .config
                    .result_poll_interval()
                    .min(deadline - now),
            );
        }
    }

    pub fn task_state(&self, id: &TaskId) -> Option<TaskState> {
        self.inner.ledger.lock().state_of(id)
    }

    /// Drop every stored result and forget cancelled ids. Returns how many
    /// results were removed. Cancelled tasks still queued are discarded when
    /// a worker reaches them.
    pub fn clear_completed(&self) -> usize {
        let mut ledger = self.inner.ledger.lock();
        let cleared = ledger.completed.len();
        ledger.completed.clear();
        ledger.cancelled.clear();
        cleared
    }

    pub fn queue_size(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn stats(&self) -> SchedulerStats {
        let queue_size = self.inner.queue.len();
        let delayed_retries = self.inner.retry_timer.len();
        let workers = self.worker_count();
        let ledger = self.inner.ledger.lock();
        let succeeded = ledger.completed.values().filter(|r| r.success).count();
        let completed = ledger.completed.len();
        let success_rate = if completed == 0 {
            0.0
        } else {
            succeeded as f64 / completed as f64
        };

        SchedulerStats {
            running: self.is_running(),
            workers,
            queue_size,
            delayed_retries,
            pending: ledger.pending.len(),
            in_flight: ledger.running.len(),
            retrying: ledger.retrying.len(),
            cancelled: ledger.cancelled.len(),
            completed,
            succeeded,
            failed: completed - succeeded,
            success_rate,
        }
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop(self.inner.config.shutdown_timeout());
        }
    }
}

/// Snapshot of scheduler counters
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStats {
    pub running: bool,
    pub workers: usize,
    pub queue_size: usize,
    pub delayed_retries: usize,
    pub pending: usize,
    pub in_flight: usize,
    pub retrying: usize,
    pub cancelled: usize,
    pub completed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub success_rate: f64,
}

/// Reports the worker's exit on every path, including unwinding.
struct ExitSignal {
    index: usize,
    tx: Sender<usize>,
}

impl Drop for ExitSignal {
    fn drop(&mut self) {
        let _ = self.tx.send(self.index);
    }
}

fn worker_loop(inner: Arc<SchedulerInner>, index: usize, generation: u64, exit_tx: Sender<usize>) {
    let _exit = ExitSignal { index, tx: exit_tx };
    debug!(worker = index, "Worker started");
    let poll_interval = inner.config.poll_interval();

    while inner.is_current(generation) {
        let Some((sequence, task)) = inner.queue.pop_sequenced_timeout(poll_interval) else {
            continue;
        };

        if !inner.is_current(generation) {
            // Popped during shutdown; put it back in its original place.
            inner.queue.restore(task.priority.rank(), sequence, task);
            break;
        }

        {
            let mut ledger = inner.ledger.lock();
            if ledger.discard.remove(&task.id) {
                debug!(worker = index, task_id = %task.id, "Discarding cancelled task");
                continue;
            }
            ledger.retrying.remove(&task.id);
            ledger.running.insert(task.id);
        }

        process_task(&inner, task, index);
    }

    debug!(worker = index, "Worker exiting");
}

fn process_task(inner: &SchedulerInner, mut task: Task, worker: usize) {
    let task_id = task.id.to_string();
    log_task_operation(
        operations::EXECUTE,
        &task_id,
        Some(task.priority.as_str()),
        "running",
        Some(format!("worker={worker} attempt={}", task.retry_count).as_str()),
    );

    let started = Instant::now();
    let outcome = run_attempt(&task);
    let elapsed = started.elapsed();

    match outcome {
        Ok(value) => {
            inner.ledger.lock().record(TaskResult::succeeded(
                task.id,
                value.clone(),
                elapsed,
                task.retry_count,
            ));
            log_task_operation(operations::EXECUTE, &task_id, None, "succeeded", None);
            if let Some(callback) = &task.on_success {
                guard_callback(&task_id, "success", || callback(&value));
            }
        }
        Err(err) if task.can_retry() => {
            let delay = task.backoff_delay();
            {
                let mut ledger = inner.ledger.lock();
                ledger.record(TaskResult::failed(
                    task.id,
                    err.clone(),
                    elapsed,
                    task.retry_count,
                ));
                ledger.retrying.insert(task.id);
            }
            warn!(
                task_id = %task.id,
                attempt = task.retry_count,
                max_retries = task.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Task attempt failed; retrying"
            );

            task.retry_count += 1;
            match inner.config.backoff_strategy {
                BackoffStrategy::Deferred => inner.retry_timer.schedule(delay, task),
                BackoffStrategy::Blocking => {
                    thread::sleep(delay);
                    log_task_operation(operations::RETRY, &task_id, None, "requeued", None);
                    inner.enqueue(task);
                }
            }
        }
        Err(err) => {
            inner.ledger.lock().record(TaskResult::failed(
                task.id,
                err.clone(),
                elapsed,
                task.retry_count,
            ));
            error!(
                task_id = %task.id,
                retries = task.retry_count,
                error = %err,
                "Task failed"
            );
            if let Some(callback) = &task.on_error {
                guard_callback(&task_id, "error", || callback(&err));
            }
        }
    }
}

/// Run one attempt, honoring the task's timeout if it has one
fn run_attempt(task: &Task) -> Result<Value, TaskError> {
    let ctx = TaskContext::new(task.id, task.retry_count);
    let Some(timeout) = task.timeout else {
        return invoke(&task.work, &ctx);
    };

    let (tx, rx) = channel::bounded(1);
    let work = task.work.clone();
    let attempt_ctx = ctx.clone();
    let spawned = thread::Builder::new()
        .name(format!("switchyard-task-{}", task.id))
        .spawn(move || {
            let _ = tx.send(invoke(&work, &attempt_ctx));
        });
    if let Err(e) = spawned {
        return Err(TaskError::Execution {
            message: format!("failed to spawn attempt thread: {e}"),
        });
    }

    match rx.recv_timeout(timeout) {
        Ok(outcome) => outcome,
        Err(RecvTimeoutError::Timeout) => {
            // The attempt thread is abandoned; it sees the flag if it checks.
            ctx.cancel();
            Err(TaskError::timeout(timeout))
        }
        Err(RecvTimeoutError::Disconnected) => Err(TaskError::Panicked {
            message: "attempt thread exited without a result".to_string(),
        }),
    }
}

fn invoke(work: &super::task::TaskWork, ctx: &TaskContext) -> Result<Value, TaskError> {
    match catch_unwind(AssertUnwindSafe(|| work(ctx))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(TaskError::execution(&e)),
        Err(payload) => Err(TaskError::Panicked {
            message: panic_message(payload.as_ref()),
        }),
    }
}

fn guard_callback(task_id: &str, kind: &str, callback: impl FnOnce()) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(callback)) {
        error!(
            task_id = %task_id,
            callback = kind,
            error = %panic_message(payload.as_ref()),
            "Task callback panicked"
        );
    }
}
