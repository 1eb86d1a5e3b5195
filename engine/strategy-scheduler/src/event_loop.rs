//! Cooperative single-threaded event loop
//!
//! The loop pops the head of its [`TimerQueue`]. A head that is not yet due is pushed
//! back and the loop sleeps on its [`Clock`] until the due time or a wake-up. A due head
//! has its callback invoked in-line. Callbacks never overlap. The first callback error
//! stops the loop and is returned from [`EventLoop::run`].

use crate::clock::{from_millis, Clock, Millis};
use crate::error::{Result, SchedulerError};
use crate::message::TimerEntry;
use crate::metrics::{LoopMetrics, LoopMetricsSnapshot};
use crate::queue::TimerQueue;
use chrono::NaiveDateTime;
use parking_lot::{Condvar, Mutex};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Interrupt signal number
pub const SIGINT: i32 = 2;

/// Terminate signal number
pub const SIGTERM: i32 = 15;

/// Callback scheduled from the loop thread
pub type LocalCallback = Box<dyn FnOnce(&LoopHandle) -> anyhow::Result<()>>;

/// Callback scheduled from another thread
pub type RemoteCallback = Box<dyn FnOnce(&LoopHandle) -> anyhow::Result<()> + Send>;

type ExitChecker = Box<dyn Fn(Millis, Millis) -> bool>;
type SignalCallback = Rc<dyn Fn(&LoopHandle)>;

/// Queue payload. Local callbacks stay in the loop's own table, keyed by sequence.
pub(crate) enum Task {
    Local,
    Remote(RemoteCallback),
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Local => f.write_str("Local"),
            Task::Remote(_) => f.write_str("Remote"),
        }
    }
}

#[derive(Debug, Default)]
struct WakeState {
    woken: bool,
    stop_requested: bool,
    signals: Vec<i32>,
}

#[derive(Debug)]
struct NotifierInner {
    queue: TimerQueue<Task>,
    state: Mutex<WakeState>,
    cond: Condvar,
    metrics: LoopMetrics,
}

/// Thread-safe side of the loop: the timer queue plus its wake primitive.
///
/// Cloning is cheap; every clone talks to the same loop.
#[derive(Debug, Clone)]
pub struct LoopNotifier {
    inner: Arc<NotifierInner>,
}

impl LoopNotifier {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(NotifierInner {
                queue: TimerQueue::new(),
                state: Mutex::new(WakeState::default()),
                cond: Condvar::new(),
                metrics: LoopMetrics::new(),
            }),
        }
    }

    /// Interrupt a sleeping loop so it re-evaluates its queue
    pub fn wake(&self) {
        let mut state = self.inner.state.lock();
        state.woken = true;
        self.inner.metrics.record_wakeup();
        self.inner.cond.notify_all();
    }

    /// Ask the loop to stop; safe from any thread
    pub fn request_stop(&self) {
        self.inner.state.lock().stop_requested = true;
        self.wake();
    }

    /// Hand an OS signal to the loop; its registered callback runs on the loop thread
    pub fn deliver_signal(&self, signum: i32) {
        self.inner.state.lock().signals.push(signum);
        self.wake();
    }

    /// Queue a callback from any thread and wake the loop
    pub fn call_at<F>(&self, due_ms: Millis, priority: i32, callback: F)
    where
        F: FnOnce(&LoopHandle) -> anyhow::Result<()> + Send + 'static,
    {
        self.inner.queue.push(due_ms, priority, Task::Remote(Box::new(callback)));
        self.wake();
    }

    pub fn is_woken(&self) -> bool {
        self.inner.state.lock().woken
    }

    /// Block until woken or until `timeout` elapses
    pub fn wait_timeout(&self, timeout: Duration) {
        let mut state = self.inner.state.lock();
        if !state.woken {
            let _ = self.inner.cond.wait_for(&mut state, timeout);
        }
    }

    /// Number of entries waiting in the queue, cancelled ones included
    pub fn pending(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn metrics(&self) -> LoopMetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    fn take_pending(&self) -> WakeState {
        std::mem::take(&mut *self.inner.state.lock())
    }

    fn queue(&self) -> &TimerQueue<Task> {
        &self.inner.queue
    }

    fn counters(&self) -> &LoopMetrics {
        &self.inner.metrics
    }
}

impl Default for LoopNotifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a scheduled local callback, usable with [`LoopHandle::cancel`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

struct LoopInner {
    clock: Arc<dyn Clock>,
    notifier: LoopNotifier,
    callbacks: RefCell<HashMap<u64, LocalCallback>>,
    exit_checkers: RefCell<Vec<ExitChecker>>,
    signal_callbacks: RefCell<HashMap<i32, SignalCallback>>,
    strategy_time: Cell<Option<Millis>>,
    running: Cell<bool>,
    stopped: Cell<bool>,
    failure: RefCell<Option<SchedulerError>>,
}

/// Loop-thread handle used by callbacks and components to schedule work
#[derive(Clone)]
pub struct LoopHandle {
    inner: Rc<LoopInner>,
}

impl LoopHandle {
    /// Schedule `callback` at an absolute time
    pub fn call_at<F>(&self, due_ms: Millis, priority: i32, callback: F) -> TimerHandle
    where
        F: FnOnce(&LoopHandle) -> anyhow::Result<()> + 'static,
    {
        let sequence = self.inner.notifier.queue().push(due_ms, priority, Task::Local);
        self.inner.callbacks.borrow_mut().insert(sequence, Box::new(callback));
        TimerHandle(sequence)
    }

    /// Schedule `callback` after `delay`
    pub fn call_later<F>(&self, delay: Duration, priority: i32, callback: F) -> TimerHandle
    where
        F: FnOnce(&LoopHandle) -> anyhow::Result<()> + 'static,
    {
        self.call_at(self.now_ms() + delay.as_millis() as Millis, priority, callback)
    }

    /// Schedule `callback` as soon as the loop regains control
    pub fn call_soon<F>(&self, callback: F) -> TimerHandle
    where
        F: FnOnce(&LoopHandle) -> anyhow::Result<()> + 'static,
    {
        self.call_at(self.now_ms(), 0, callback)
    }

    /// Run `callback` once, `delay` from now, at default priority
    pub fn defer<F>(&self, delay: Duration, callback: F) -> TimerHandle
    where
        F: FnOnce(&LoopHandle) -> anyhow::Result<()> + 'static,
    {
        self.call_later(delay, 0, callback)
    }

    /// Drop a pending callback. Its queue entry stays and is discarded without waiting
    /// once it reaches the head of the queue.
    pub fn cancel(&self, handle: TimerHandle) -> bool {
        self.inner.callbacks.borrow_mut().remove(&handle.0).is_some()
    }

    /// Stop the loop after the current callback; idempotent
    pub fn stop(&self) {
        if !self.inner.stopped.replace(true) {
            info!("Stopping event loop");
        }
        self.inner.notifier.wake();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.get()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.get()
    }

    /// Current wall-clock time in loop milliseconds
    pub fn now_ms(&self) -> Millis {
        self.inner.clock.now_ms()
    }

    /// Current wall-clock time
    pub fn now(&self) -> NaiveDateTime {
        self.inner.clock.now()
    }

    /// Due time of the callback currently (or most recently) handled
    pub fn strategy_time(&self) -> Option<NaiveDateTime> {
        self.inner.strategy_time.get().map(from_millis)
    }

    pub fn notifier(&self) -> LoopNotifier {
        self.inner.notifier.clone()
    }

    /// Register a predicate `(now_ms, next_due_ms) -> bool`, consulted whenever the
    /// head of the queue is in the future; returning true stops the loop
    pub fn register_exit_checker<F>(&self, checker: F)
    where
        F: Fn(Millis, Millis) -> bool + 'static,
    {
        self.inner.exit_checkers.borrow_mut().push(Box::new(checker));
    }

    /// Install the loop-thread handler for `signum`, replacing any previous one
    pub fn register_signal_callback<F>(&self, signum: i32, callback: F)
    where
        F: Fn(&LoopHandle) + 'static,
    {
        self.inner.signal_callbacks.borrow_mut().insert(signum, Rc::new(callback));
    }

    pub fn metrics(&self) -> LoopMetricsSnapshot {
        self.inner.notifier.metrics()
    }

    fn should_exit(&self, now_ms: Millis, next_due_ms: Millis) -> bool {
        self.inner.exit_checkers.borrow().iter().any(|checker| checker(now_ms, next_due_ms))
    }

    fn process_wake_state(&self) {
        let pending = self.inner.notifier.take_pending();
        if pending.stop_requested {
            self.stop();
        }

        for signum in pending.signals {
            self.inner.notifier.counters().record_signal();
            let callback = self.inner.signal_callbacks.borrow().get(&signum).cloned();
            match callback {
                Some(callback) => {
                    info!("Received signal {}", signum);
                    callback(self);
                }
                None => warn!("No handler registered for signal {}", signum),
            }
        }
    }

    fn is_cancelled(&self, entry: &TimerEntry<Task>) -> bool {
        matches!(entry.payload, Task::Local)
            && !self.inner.callbacks.borrow().contains_key(&entry.sequence)
    }

    fn dispatch(&self, entry: TimerEntry<Task>) {
        let TimerEntry { due_ms, sequence, payload, .. } = entry;
        let callback = match payload {
            Task::Local => self.inner.callbacks.borrow_mut().remove(&sequence),
            Task::Remote(callback) => Some(callback as LocalCallback),
        };

        let Some(callback) = callback else {
            self.inner.notifier.counters().record_cancelled();
            debug!("Skipping cancelled timer {}", sequence);
            return;
        };

        self.inner.strategy_time.set(Some(due_ms));
        self.inner.notifier.counters().record_message();

        if let Err(error) = callback(self) {
            self.inner.notifier.counters().record_failure();
            let due = from_millis(due_ms);
            error!("Callback due at {} failed: {:#}", due, error);
            {
                let mut failure = self.inner.failure.borrow_mut();
                if failure.is_none() {
                    *failure = Some(SchedulerError::CallbackFailed { due, error });
                }
            }
            self.stop();
        }
    }
}

/// Owner of the loop; `run` blocks the calling thread until the loop stops
pub struct EventLoop {
    handle: LoopHandle,
}

impl EventLoop {
    /// Create a loop that stops on SIGINT and SIGTERM
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let handle = LoopHandle {
            inner: Rc::new(LoopInner {
                clock,
                notifier: LoopNotifier::new(),
                callbacks: RefCell::new(HashMap::new()),
                exit_checkers: RefCell::new(Vec::new()),
                signal_callbacks: RefCell::new(HashMap::new()),
                strategy_time: Cell::new(None),
                running: Cell::new(false),
                stopped: Cell::new(false),
                failure: RefCell::new(None),
            }),
        };
        handle.register_signal_callback(SIGINT, |loop_handle| loop_handle.stop());
        handle.register_signal_callback(SIGTERM, |loop_handle| loop_handle.stop());
        Self { handle }
    }

    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    pub fn notifier(&self) -> LoopNotifier {
        self.handle.notifier()
    }

    /// Run until stopped, a callback fails, or the queue drains
    pub fn run(&self) -> Result<()> {
        let handle = &self.handle;
        let inner = &handle.inner;
        if inner.running.replace(true) {
            return Err(SchedulerError::AlreadyRunning);
        }

        let notifier = inner.notifier.clone();
        info!("Event loop started with {} queued entries", notifier.pending());

        while !handle.is_stopped() {
            handle.process_wake_state();
            if handle.is_stopped() {
                break;
            }

            let Some(entry) = notifier.queue().pop() else {
                info!("Timer queue drained");
                break;
            };

            let now = inner.clock.now_ms();
            if entry.due_ms > now && !handle.is_cancelled(&entry) {
                let due = entry.due_ms;
                notifier.queue().push_entry(entry);
                if handle.should_exit(now, due) {
                    info!("Exit condition met before {}", from_millis(due));
                    handle.stop();
                    break;
                }
                notifier.counters().record_timer_armed();
                inner.clock.sleep_until(due, &notifier);
                continue;
            }

            handle.dispatch(entry);
        }

        inner.running.set(false);
        let metrics = notifier.metrics();
        info!(
            messages = metrics.messages_handled,
            timers = metrics.timers_armed,
            failures = metrics.callback_failures,
            "Event loop stopped"
        );

        match inner.failure.borrow_mut().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
