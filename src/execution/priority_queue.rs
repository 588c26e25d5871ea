//! Thread-safe priority queue shared by submitters and workers.
//!
//! Items are ordered by `(priority, sequence)` ascending. The sequence number
//! comes from a monotonic counter assigned at insertion, so equal-priority
//! items leave in insertion order regardless of clock resolution.

use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::Duration;

struct Entry<T> {
    priority: u8,
    sequence: u64,
    item: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    // BinaryHeap is a max-heap; reverse so the smallest key pops first.
    fn cmp(&self, other: &Self) -> Ordering {
        (other.priority, other.sequence).cmp(&(self.priority, self.sequence))
    }
}

/// Min-heap keyed on `(priority, sequence)` with blocking, bounded pops
pub struct PriorityTaskQueue<T> {
    heap: Mutex<BinaryHeap<Entry<T>>>,
    available: Condvar,
    next_sequence: AtomicU64,
}

impl<T> Default for PriorityTaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PriorityTaskQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            available: Condvar::new(),
            next_sequence: AtomicU64::new(0),
        }
    }

    /// Insert an item; returns the sequence number it was given
    pub fn push(&self, priority: u8, item: T) -> u64 {
        let sequence = self.next_sequence.fetch_add(1, AtomicOrdering::SeqCst);
        let mut heap = self.heap.lock();
        heap.push(Entry {
            priority,
            sequence,
            item,
        });
        drop(heap);
        self.available.notify_one();
        sequence
    }

    /// Remove the highest-priority item without waiting
    pub fn try_pop(&self) -> Option<T> {
        self.heap.lock().pop().map(|e| e.item)
    }

    /// Remove the highest-priority item, waiting at most `timeout` for one
    ///
    /// Returns `None` early if [`wake_all`](Self::wake_all) interrupts the
    /// wait, or if another consumer took the item that triggered the wakeup.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        self.pop_sequenced_timeout(timeout).map(|(_, item)| item)
    }

    /// [`pop_timeout`](Self::pop_timeout) that also returns the item's
    /// sequence number, for handing to [`restore`](Self::restore)
    pub fn pop_sequenced_timeout(&self, timeout: Duration) -> Option<(u64, T)> {
        let mut heap = self.heap.lock();
        if let Some(entry) = heap.pop() {
            return Some((entry.sequence, entry.item));
        }
        self.available.wait_for(&mut heap, timeout);
        heap.pop().map(|e| (e.sequence, e.item))
    }

    /// Put back a popped item under the sequence number it already had, so
    /// it keeps its place ahead of later equal-priority items
    pub fn restore(&self, priority: u8, sequence: u64, item: T) {
        self.heap.lock().push(Entry {
            priority,
            sequence,
            item,
        });
        self.available.notify_one();
    }

    /// Wake every blocked consumer so it can re-check its own exit condition
    pub fn wake_all(&self) {
        self.available.notify_all();
    }

    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }
}
