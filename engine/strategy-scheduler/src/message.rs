//! Timer queue entries

use crate::clock::Millis;
use std::cmp::Ordering;

/// A queued unit of work, ordered by `(due_ms, -priority, sequence)`.
///
/// Earlier due times win; among equal due times the higher priority wins; remaining
/// ties are broken by submission order. Entries are immutable once queued.
#[derive(Debug)]
pub struct TimerEntry<T> {
    pub due_ms: Millis,
    pub priority: i32,
    pub sequence: u64,
    pub payload: T,
}

impl<T> TimerEntry<T> {
    pub fn new(due_ms: Millis, priority: i32, sequence: u64, payload: T) -> Self {
        Self { due_ms, priority, sequence, payload }
    }

    /// Sort key of this entry; smaller keys pop first
    pub fn key(&self) -> (Millis, i32, u64) {
        (self.due_ms, -self.priority, self.sequence)
    }
}

impl<T> PartialEq for TimerEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<T> Eq for TimerEntry<T> {}

impl<T> PartialOrd for TimerEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for TimerEntry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}
