//! Metrics collection for the event loop

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Point-in-time view of loop counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopMetricsSnapshot {
    /// Callbacks invoked
    pub messages_handled: u64,

    /// Times the loop re-queued a future entry and waited for it
    pub timers_armed: u64,

    /// Wake-ups delivered through the notifier
    pub wakeups: u64,

    /// Entries popped whose callback had been cancelled
    pub cancelled_skipped: u64,

    /// Callbacks that returned an error
    pub callback_failures: u64,

    /// Signals delivered into the loop
    pub signals_handled: u64,

    /// Seconds since the metrics were created
    pub uptime_seconds: u64,
}

/// Counters updated by the loop thread; readable from anywhere
#[derive(Debug)]
pub struct LoopMetrics {
    messages_handled: AtomicU64,
    timers_armed: AtomicU64,
    wakeups: AtomicU64,
    cancelled_skipped: AtomicU64,
    callback_failures: AtomicU64,
    signals_handled: AtomicU64,
    start_time: Instant,
}

impl LoopMetrics {
    pub fn new() -> Self {
        Self {
            messages_handled: AtomicU64::new(0),
            timers_armed: AtomicU64::new(0),
            wakeups: AtomicU64::new(0),
            cancelled_skipped: AtomicU64::new(0),
            callback_failures: AtomicU64::new(0),
            signals_handled: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_message(&self) {
        self.messages_handled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timer_armed(&self) {
        self.timers_armed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_wakeup(&self) {
        self.wakeups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self) {
        self.cancelled_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.callback_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_signal(&self) {
        self.signals_handled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LoopMetricsSnapshot {
        LoopMetricsSnapshot {
            messages_handled: self.messages_handled.load(Ordering::Relaxed),
            timers_armed: self.timers_armed.load(Ordering::Relaxed),
            wakeups: self.wakeups.load(Ordering::Relaxed),
            cancelled_skipped: self.cancelled_skipped.load(Ordering::Relaxed),
            callback_failures: self.callback_failures.load(Ordering::Relaxed),
            signals_handled: self.signals_handled.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for LoopMetrics {
    fn default() -> Self {
        Self::new()
    }
}
