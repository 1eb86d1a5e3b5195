//! # Strategy Scheduler
//!
//! The runtime heart of a strategy process: a single-threaded cooperative event loop
//! fed by a time-ordered timer queue, a synchronous event bus, and market-time event
//! sources that expand recurring daily rules into concrete timestamps one day at a time.
//!
//! Everything except [`TimerQueue`] and [`LoopNotifier`] lives on the loop thread.
//! Other threads reach the loop only through a notifier (wake, stop, signal delivery
//! and thread-safe timer submission).

pub mod bus;
pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod event_loop;
pub mod event_source;
pub mod message;
pub mod metrics;
pub mod queue;
pub mod scheduler;
pub mod time_expr;



pub use bus::{CallbackId, EventBus};
pub use clock::{from_millis, to_millis, Clock, Millis, SimulatedClock, SystemClock};
pub use config::{MarketPeriod, MarketSession, SchedulerConfig};
pub use error::{Result, SchedulerError};
pub use event::{Event, EventClass, EventClassRegistry, EventKind, TimerClassId};
pub use event_loop::{EventLoop, LoopHandle, LoopNotifier, TimerHandle, SIGINT, SIGTERM};
pub use event_source::{EventSource, ListenerId};
pub use message::TimerEntry;
pub use metrics::{LoopMetrics, LoopMetricsSnapshot};
pub use queue::TimerQueue;
pub use scheduler::{CallbackResult, EventSourceScheduler, ScheduleId, SchedulerBus};
pub use time_expr::{Anchor, TimeExpr};

/// Current version of the scheduler
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default lookahead window of an event source, in calendar days
pub const DEFAULT_EVENT_DAYS_COUNT: u32 = 365;
