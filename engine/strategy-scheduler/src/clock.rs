//! Time sources for the event loop
//!
//! Timestamps inside the scheduler are naive local wall-clock milliseconds. Strategies
//! reason in exchange-local time, so no time zone ever enters the loop.

use crate::event_loop::LoopNotifier;
use chrono::{DateTime, Local, NaiveDateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Milliseconds since the naive local epoch
pub type Millis = i64;

/// Convert a naive local timestamp to loop milliseconds
pub fn to_millis(dt: NaiveDateTime) -> Millis {
    dt.and_utc().timestamp_millis()
}

/// Convert loop milliseconds back to a naive local timestamp
pub fn from_millis(ms: Millis) -> NaiveDateTime {
    DateTime::<Utc>::from_timestamp_millis(ms).map(|dt| dt.naive_utc()).unwrap_or_default()
}

/// Source of "now" for the loop, plus the way the loop waits for a due time
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> Millis;

    /// Suspend until `due_ms` has been reached or the notifier is woken,
    /// whichever comes first
    fn sleep_until(&self, due_ms: Millis, notifier: &LoopNotifier);

    fn now(&self) -> NaiveDateTime {
        from_millis(self.now_ms())
    }
}

/// Wall-clock time in the local zone; waits block on the notifier's condvar
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> Millis {
        to_millis(Local::now().naive_local())
    }

    fn sleep_until(&self, due_ms: Millis, notifier: &LoopNotifier) {
        let remaining = due_ms - self.now_ms();
        if remaining > 0 {
            notifier.wait_timeout(Duration::from_millis(remaining as u64));
        }
    }
}

/// Virtual time that jumps straight to the next due time instead of sleeping.
///
/// A pending wake-up (remote push, stop request, signal) keeps time where it is so
/// the loop can react before anything later fires.
#[derive(Debug)]
pub struct SimulatedClock {
    now_ms: AtomicI64,
}

impl SimulatedClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self { now_ms: AtomicI64::new(to_millis(start)) }
    }

    pub fn set(&self, now: NaiveDateTime) {
        self.now_ms.store(to_millis(now), Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now_ms.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for SimulatedClock {
    fn now_ms(&self) -> Millis {
        self.now_ms.load(Ordering::SeqCst)
    }

    fn sleep_until(&self, due_ms: Millis, notifier: &LoopNotifier) {
        if !notifier.is_woken() {
            self.now_ms.fetch_max(due_ms, Ordering::SeqCst);
        }
    }
}
