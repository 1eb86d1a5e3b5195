//! Bridges event sources into the event loop
//!
//! Each scheduled source has at most one armed timer: the one for its next event.
//! When it fires the scheduler re-reads the source, emits the event on the bus and
//! arms the following one. Timers of unscheduled sources are left in the queue and
//! do nothing when they fire.

use crate::bus::EventBus;
use crate::clock::to_millis;
use crate::event_loop::{LoopHandle, TimerHandle};
use crate::event_source::{EventSource, ListenerId};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, warn};

/// Result returned by bus subscribers driven from the loop
pub type CallbackResult = anyhow::Result<()>;

/// Bus carrying scheduled events to loop callbacks
pub type SchedulerBus = EventBus<CallbackResult>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScheduleId(u64);

impl fmt::Display for ScheduleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Schedule {
    source: Rc<RefCell<EventSource>>,
    listener: ListenerId,
    timer: Option<TimerHandle>,
    pending_reschedule: bool,
}

struct SchedulerInner {
    handle: LoopHandle,
    bus: Rc<SchedulerBus>,
    next_id: Cell<u64>,
    schedules: RefCell<HashMap<ScheduleId, Schedule>>,
}

#[derive(Clone)]
pub struct EventSourceScheduler {
    inner: Rc<SchedulerInner>,
}

impl EventSourceScheduler {
    pub fn new(handle: LoopHandle, bus: Rc<SchedulerBus>) -> Self {
        Self {
            inner: Rc::new(SchedulerInner {
                handle,
                bus,
                next_id: Cell::new(1),
                schedules: RefCell::new(HashMap::new()),
            }),
        }
    }

    pub fn bus(&self) -> Rc<SchedulerBus> {
        self.inner.bus.clone()
    }

    pub fn handle(&self) -> LoopHandle {
        self.inner.handle.clone()
    }

    /// Start feeding `source` into the loop under a fresh id
    pub fn schedule(&self, source: Rc<RefCell<EventSource>>) -> ScheduleId {
        let id = ScheduleId(self.inner.next_id.get());
        self.inner.next_id.set(id.0 + 1);

        let weak: Weak<SchedulerInner> = Rc::downgrade(&self.inner);
        let listener = source.borrow_mut().add_listener(move || {
            if let Some(inner) = weak.upgrade() {
                EventSourceScheduler { inner }.on_source_changed(id);
            }
        });

        self.inner
            .schedules
            .borrow_mut()
            .insert(id, Schedule { source, listener, timer: None, pending_reschedule: false });
        debug!("Scheduled event source {}", id);
        self.arm_next(id);
        id
    }

    /// Stop feeding a source; any armed timer becomes a no-op
    pub fn unschedule(&self, id: ScheduleId) -> bool {
        self.detach(id).is_some()
    }

    /// Unschedule and schedule again under a new id
    pub fn reschedule(&self, id: ScheduleId) -> Option<ScheduleId> {
        let source = self.detach(id)?;
        let new_id = self.schedule(source);
        debug!("Rescheduled event source {} as {}", id, new_id);
        Some(new_id)
    }

    pub fn is_scheduled(&self, id: ScheduleId) -> bool {
        self.inner.schedules.borrow().contains_key(&id)
    }

    pub fn schedule_count(&self) -> usize {
        self.inner.schedules.borrow().len()
    }

    fn detach(&self, id: ScheduleId) -> Option<Rc<RefCell<EventSource>>> {
        let schedule = self.inner.schedules.borrow_mut().remove(&id)?;
        if let Some(timer) = schedule.timer {
            self.inner.handle.cancel(timer);
        }
        match schedule.source.try_borrow_mut() {
            Ok(mut source) => {
                source.remove_listener(schedule.listener);
            }
            Err(_) => warn!("Event source {} busy, listener left in place", id),
        }
        debug!("Unscheduled event source {}", id);
        Some(schedule.source)
    }

    fn is_active(&self, id: ScheduleId) -> bool {
        self.inner.schedules.borrow().get(&id).map_or(false, |s| !s.pending_reschedule)
    }

    fn on_source_changed(&self, id: ScheduleId) {
        {
            let mut schedules = self.inner.schedules.borrow_mut();
            let Some(schedule) = schedules.get_mut(&id) else {
                return;
            };
            if schedule.pending_reschedule {
                return;
            }
            schedule.pending_reschedule = true;
            if let Some(timer) = schedule.timer.take() {
                self.inner.handle.cancel(timer);
            }
        }

        let scheduler = self.clone();
        self.inner.handle.call_soon(move |_| {
            scheduler.reschedule(id);
            Ok(())
        });
    }

    fn arm_next(&self, id: ScheduleId) {
        let Some(source) = self.inner.schedules.borrow().get(&id).map(|s| s.source.clone()) else {
            return;
        };
        let next = source.borrow_mut().peek_next_event();
        let Some(event) = next else {
            debug!("Event source {} has no further events", id);
            return;
        };

        let scheduler = self.clone();
        let timer = self
            .inner
            .handle
            .call_at(to_millis(event.time), event.priority(), move |_| scheduler.fire(id));
        if let Some(schedule) = self.inner.schedules.borrow_mut().get_mut(&id) {
            schedule.timer = Some(timer);
        }
    }

    fn fire(&self, id: ScheduleId) -> CallbackResult {
        let source = {
            let mut schedules = self.inner.schedules.borrow_mut();
            match schedules.get_mut(&id) {
                Some(schedule) if !schedule.pending_reschedule => {
                    schedule.timer = None;
                    schedule.source.clone()
                }
                _ => {
                    debug!("Ignoring timer of inactive event source {}", id);
                    return Ok(());
                }
            }
        };

        let next = source.borrow_mut().peek_next_event();
        let Some(next) = next else {
            return Ok(());
        };
        if to_millis(next.time) > self.inner.handle.now_ms() {
            self.arm_next(id);
            return Ok(());
        }

        let event = source.borrow_mut().get_next_event();
        if let Some(event) = event {
            self.inner.bus.try_emit(&event)?;
        }

        if self.is_active(id) {
            self.arm_next(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimulatedClock;
    use crate::config::MarketSession;
    use crate::event::{Event, EventClass, EventClassRegistry, EventKind};
    use crate::event_loop::EventLoop;
    use chrono::{NaiveDate, NaiveDateTime};
    use std::sync::Arc;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_hms_opt(h, m, s).unwrap()
    }

    struct Fixture {
        event_loop: EventLoop,
        scheduler: EventSourceScheduler,
        registry: EventClassRegistry,
        seen: Rc<RefCell<Vec<(EventClass, NaiveDateTime)>>>,
    }

    fn fixture() -> Fixture {
        let event_loop = EventLoop::new(Arc::new(SimulatedClock::new(at(9, 0, 0))));
        let bus = Rc::new(SchedulerBus::new());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        bus.register(
            EventClass::Any,
            move |event: &Event| {
                log.borrow_mut().push((event.class, event.time));
                Ok(())
            },
            0,
        );
        let scheduler = EventSourceScheduler::new(event_loop.handle(), bus);
        Fixture { event_loop, scheduler, registry: EventClassRegistry::new(), seen }
    }

    fn source(end: NaiveDateTime) -> Rc<RefCell<EventSource>> {
        let session = MarketSession::default();
        Rc::new(RefCell::new(EventSource::new(session, at(9, 0, 0)).with_end(Some(end))))
    }

    #[test]
    fn test_emits_each_event_in_order() {
        let mut f = fixture();
        let class = f.registry.get_or_create("a", EventKind::Daily);
        let src = source(at(23, 59, 59));
        src.borrow_mut().daily(class, "10:00").unwrap();
        src.borrow_mut().daily(class, "close").unwrap();
        f.scheduler.schedule(src);

        f.event_loop.run().unwrap();
        assert_eq!(*f.seen.borrow(), vec![(class, at(10, 0, 0)), (class, at(15, 0, 0))]);
    }

    #[test]
    fn test_same_time_events_follow_priority() {
        let mut f = fixture();
        let daily = f.registry.get_or_create("daily", EventKind::Daily);
        let sync = f.registry.get_or_create("sync", EventKind::AccountSync);

        let first = source(at(23, 59, 59));
        first.borrow_mut().daily(daily, "10:00").unwrap();
        let second = source(at(23, 59, 59));
        second.borrow_mut().daily(sync, "10:00").unwrap();
        f.scheduler.schedule(first);
        f.scheduler.schedule(second);

        f.event_loop.run().unwrap();
        assert_eq!(*f.seen.borrow(), vec![(sync, at(10, 0, 0)), (daily, at(10, 0, 0))]);
    }

    #[test]
    fn test_unscheduled_source_stops_firing() {
        let mut f = fixture();
        let class = f.registry.get_or_create("a", EventKind::Daily);
        let src = source(at(23, 59, 59));
        src.borrow_mut().daily(class, "10:00").unwrap();
        src.borrow_mut().daily(class, "11:00").unwrap();
        let id = f.scheduler.schedule(src);

        let scheduler = f.scheduler.clone();
        f.event_loop.handle().call_at(to_millis(at(10, 30, 0)), 0, move |_| {
            assert!(scheduler.unschedule(id));
            Ok(())
        });

        f.event_loop.run().unwrap();
        assert_eq!(*f.seen.borrow(), vec![(class, at(10, 0, 0))]);
        assert_eq!(f.scheduler.schedule_count(), 0);
    }

    #[test]
    fn test_rule_change_reschedules_under_new_id() {
        let mut f = fixture();
        let class = f.registry.get_or_create("a", EventKind::Daily);
        let src = source(at(23, 59, 59));
        src.borrow_mut().daily(class, "12:00").unwrap();
        let id = f.scheduler.schedule(src.clone());

        let later = src.clone();
        f.event_loop.handle().call_at(to_millis(at(10, 0, 0)), 0, move |_| {
            later.borrow_mut().daily(class, "11:00").unwrap();
            Ok(())
        });

        f.event_loop.run().unwrap();
        assert_eq!(*f.seen.borrow(), vec![(class, at(11, 0, 0)), (class, at(12, 0, 0))]);
        assert!(!f.scheduler.is_scheduled(id));
        assert_eq!(f.scheduler.schedule_count(), 1);
    }

    #[test]
    fn test_failing_subscriber_stops_loop() {
        let mut f = fixture();
        let class = f.registry.get_or_create("a", EventKind::Daily);
        f.scheduler.bus().register(class, |_| Err(anyhow::anyhow!("strategy blew up")), 0);
        let src = source(at(23, 59, 59));
        src.borrow_mut().daily(class, "10:00").unwrap();
        src.borrow_mut().daily(class, "11:00").unwrap();
        f.scheduler.schedule(src);

        let err = f.event_loop.run().unwrap_err();
        assert!(err.to_string().contains("strategy blew up"));
        assert_eq!(f.seen.borrow().len(), 1);
    }
}
