//! Deadline-ordered holding area for tasks waiting out a retry backoff.
//!
//! A single background thread sleeps until the earliest deadline, then hands
//! the item to a sink (the scheduler re-enqueues it). Workers therefore never
//! block on backoff delays.

use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error};

type Sink<T> = Arc<dyn Fn(T) + Send + Sync>;

struct Delayed<T> {
    due: Instant,
    sequence: u64,
    item: T,
}

impl<T> PartialEq for Delayed<T> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.sequence == other.sequence
    }
}

impl<T> Eq for Delayed<T> {}

impl<T> PartialOrd for Delayed<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Delayed<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.due, other.sequence).cmp(&(self.due, self.sequence))
    }
}

struct Shared<T> {
    heap: Mutex<BinaryHeap<Delayed<T>>>,
    changed: Condvar,
    shutdown: AtomicBool,
    next_sequence: AtomicU64,
}

/// Releases items to a sink once their delay has elapsed
pub struct RetryTimer<T: Send + 'static> {
    shared: Arc<Shared<T>>,
    sink: Sink<T>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> RetryTimer<T> {
    pub fn new<F>(sink: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                heap: Mutex::new(BinaryHeap::new()),
                changed: Condvar::new(),
                shutdown: AtomicBool::new(false),
                next_sequence: AtomicU64::new(0),
            }),
            sink: Arc::new(sink),
            thread: Mutex::new(None),
        }
    }

    /// Hold `item` for `delay`, then pass it to the sink
    pub fn schedule(&self, delay: Duration, item: T) {
        if !self.ensure_thread() {
            // Without a timer thread the item is released immediately.
            (self.sink)(item);
            return;
        }

        let sequence = self.shared.next_sequence.fetch_add(1, AtomicOrdering::SeqCst);
        self.shared.heap.lock().push(Delayed {
            due: Instant::now() + delay,
            sequence,
            item,
        });
        self.shared.changed.notify_one();
    }

    /// Number of items still waiting
    pub fn len(&self) -> usize {
        self.shared.heap.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_thread(&self) -> bool {
        let mut slot = self.thread.lock();
        if slot.is_some() {
            return true;
        }

        let shared = self.shared.clone();
        let sink = self.sink.clone();
        match thread::Builder::new()
            .name("switchyard-retry-timer".to_string())
            .spawn(move || run_timer(shared, sink))
        {
            Ok(handle) => {
                *slot = Some(handle);
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to spawn retry timer thread");
                false
            }
        }
    }
}

fn run_timer<T>(shared: Arc<Shared<T>>, sink: Sink<T>) {
    debug!("Retry timer started");
    let mut heap = shared.heap.lock();
    while !shared.shutdown.load(AtomicOrdering::Acquire) {
        let now = Instant::now();
        match heap.peek().map(|d| d.due) {
            Some(due) if due <= now => {
                if let Some(delayed) = heap.pop() {
                    // Release the lock while the sink runs so schedulers can keep pushing.
                    drop(heap);
                    sink(delayed.item);
                    heap = shared.heap.lock();
                }
            }
            Some(due) => {
                shared.changed.wait_until(&mut heap, due);
            }
            None => {
                shared.changed.wait(&mut heap);
            }
        }
    }
    debug!(remaining = heap.len(), "Retry timer stopped");
}

impl<T: Send + 'static> Drop for RetryTimer<T> {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, AtomicOrdering::Release);
        {
            // Taking the lock orders the flag store before the timer's next wait.
            let _heap = self.shared.heap.lock();
            self.shared.changed.notify_all();
        }
        if let Some(handle) = self.thread.lock().take() {
            if handle.join().is_err() {
                error!("Retry timer thread panicked");
            }
        }
    }
}
