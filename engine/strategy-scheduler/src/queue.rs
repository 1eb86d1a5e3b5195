// Time-ordered timer queue shared between producers and the loop thread

use crate::clock::Millis;
use crate::message::TimerEntry;
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Binary-heap priority queue of [`TimerEntry`] values.
///
/// - Any thread may push; the loop thread pops and peeks
/// - One mutex guards the heap and is held only for the heap operation itself
/// - Sequence numbers are issued atomically so FIFO ties hold across producers
#[derive(Debug)]
pub struct TimerQueue<T> {
    heap: Mutex<BinaryHeap<Reverse<TimerEntry<T>>>>,
    next_sequence: AtomicU64,
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self { heap: Mutex::new(BinaryHeap::new()), next_sequence: AtomicU64::new(0) }
    }

    /// Queue a payload and return the sequence number it was issued
    pub fn push(&self, due_ms: Millis, priority: i32, payload: T) -> u64 {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        self.heap.lock().push(Reverse(TimerEntry::new(due_ms, priority, sequence, payload)));
        sequence
    }

    /// Put a previously popped entry back, keeping its original sequence
    pub fn push_entry(&self, entry: TimerEntry<T>) {
        self.heap.lock().push(Reverse(entry));
    }

    pub fn pop(&self) -> Option<TimerEntry<T>> {
        self.heap.lock().pop().map(|Reverse(entry)| entry)
    }

    /// Sort key `(due_ms, priority, sequence)` of the head entry
    pub fn peek(&self) -> Option<(Millis, i32, u64)> {
        self.heap.lock().peek().map(|Reverse(entry)| (entry.due_ms, entry.priority, entry.sequence))
    }

    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
