//! Lazily expanded daily event source
//!
//! An [`EventSource`] holds `(time expression, event class)` rules and turns them into
//! concrete events one calendar day at a time. Only the current day's events are kept
//! in memory. Both the start and the end bound are inclusive.

use crate::config::{MarketSession, SchedulerConfig};
use crate::error::Result;
use crate::event::{Event, EventClass};
use crate::time_expr::TimeExpr;
use crate::DEFAULT_EVENT_DAYS_COUNT;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::VecDeque;
use std::rc::Rc;
use tracing::debug;

/// Identifier of a rule-change listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// One "fire every day at" rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyRule {
    pub expr: TimeExpr,
    pub class: EventClass,
}

pub struct EventSource {
    rules: Vec<DailyRule>,
    session: MarketSession,
    start: NaiveDateTime,
    end: Option<NaiveDateTime>,
    lookahead_days: u32,
    next_day: NaiveDate,
    buffer: VecDeque<Event>,
    stale: bool,
    last_emitted: Option<NaiveDateTime>,
    resume_after: Option<NaiveDateTime>,
    listeners: Vec<(ListenerId, Rc<dyn Fn()>)>,
    next_listener: u64,
}

impl EventSource {
    pub fn new(session: MarketSession, start: NaiveDateTime) -> Self {
        Self {
            rules: Vec::new(),
            session,
            start,
            end: None,
            lookahead_days: DEFAULT_EVENT_DAYS_COUNT,
            next_day: start.date(),
            buffer: VecDeque::new(),
            stale: true,
            last_emitted: None,
            resume_after: None,
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    /// Build a source using the configured market session and lookahead window
    pub fn from_config(config: &SchedulerConfig, start: NaiveDateTime) -> Result<Self> {
        Ok(Self::new(config.session()?, start).with_lookahead_days(config.event_days_count))
    }

    pub fn with_end(mut self, end: Option<NaiveDateTime>) -> Self {
        self.end = end;
        self.stale = true;
        self
    }

    pub fn with_lookahead_days(mut self, days: u32) -> Self {
        self.lookahead_days = days.max(1);
        self.stale = true;
        self
    }

    /// Append a rule firing `class` every day at `expr`
    pub fn daily(&mut self, class: EventClass, expr: &str) -> Result<()> {
        let expr = TimeExpr::parse(expr)?;
        self.daily_expr(class, expr);
        Ok(())
    }

    pub fn daily_expr(&mut self, class: EventClass, expr: TimeExpr) {
        debug!("Adding daily rule {} for {}", expr, class);
        self.rules.push(DailyRule { expr, class });
        self.on_rules_changed();
    }

    /// Drop every rule for `class`; returns how many were removed
    pub fn remove_class(&mut self, class: EventClass) -> usize {
        let before = self.rules.len();
        self.rules.retain(|rule| rule.class != class);
        let removed = before - self.rules.len();
        if removed > 0 {
            self.on_rules_changed();
        }
        removed
    }

    pub fn set_end(&mut self, end: Option<NaiveDateTime>) {
        self.end = end;
        self.on_rules_changed();
    }

    /// Register a callback fired whenever the rule set changes.
    ///
    /// The callback runs while the source is being mutated and must not touch it.
    pub fn add_listener<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn() + 'static,
    {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Rc::new(listener)));
        id
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener, _)| *listener != id);
        before != self.listeners.len()
    }

    /// Next event without consuming it
    pub fn peek_next_event(&mut self) -> Option<Event> {
        self.refill();
        self.buffer.front().cloned()
    }

    /// Consume and return the next event
    pub fn get_next_event(&mut self) -> Option<Event> {
        self.refill();
        let event = self.buffer.pop_front()?;
        self.last_emitted = Some(event.time);
        Some(event)
    }

    pub fn rules(&self) -> &[DailyRule] {
        &self.rules
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> Option<NaiveDateTime> {
        self.end
    }

    /// Number of generated but not yet consumed events of the current day
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn on_rules_changed(&mut self) {
        self.stale = true;
        let listeners: Vec<_> = self.listeners.iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            listener();
        }
    }

    fn last_day(&self) -> NaiveDate {
        let window_end = self
            .start
            .date()
            .checked_add_days(chrono::Days::new(u64::from(self.lookahead_days - 1)))
            .unwrap_or(NaiveDate::MAX);
        match self.end {
            Some(end) => window_end.min(end.date()),
            None => window_end,
        }
    }

    fn refill(&mut self) {
        if self.stale {
            self.buffer.clear();
            self.next_day = self.last_emitted.map_or(self.start.date(), |t| t.date());
            self.resume_after = self.last_emitted;
            self.stale = false;
        }

        let last_day = self.last_day();
        while self.buffer.is_empty() && self.next_day <= last_day {
            let day = self.next_day;
            self.buffer = self.expand_day(day).into();
            if !self.buffer.is_empty() {
                self.resume_after = None;
            }
            match day.succ_opt() {
                Some(next) => self.next_day = next,
                None => break,
            }
        }
    }

    /// Events landing on calendar day `day`, one per rule, sorted by time.
    ///
    /// Right after a rule change only events later than the last emitted one are kept.
    fn expand_day(&self, day: NaiveDate) -> Vec<Event> {
        let mut events: Vec<Event> = self
            .rules
            .iter()
            .filter_map(|rule| {
                let time = rule.expr.resolve_landing_on(day, &self.session)?;
                Some(Event::new(rule.class, time))
            })
            .filter(|event| event.time >= self.start)
            .filter(|event| self.end.map_or(true, |end| event.time <= end))
            .filter(|event| self.resume_after.map_or(true, |after| event.time > after))
            .collect();
        events.sort_by_key(|event| event.time);
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use chrono::NaiveTime;
    use std::cell::Cell;

    fn day(offset: u64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap() + chrono::Days::new(offset)
    }

    fn at(offset: u64, h: u32, m: u32, s: u32) -> NaiveDateTime {
        day(offset).and_hms_opt(h, m, s).unwrap()
    }

    fn session() -> MarketSession {
        MarketSession::new(
            NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
        )
    }

    fn daily() -> EventClass {
        EventClass::Kind(EventKind::Daily)
    }

    #[test]
    fn test_fires_every_day_at_same_time() {
        let mut source = EventSource::new(session(), at(0, 0, 0, 0));
        source.daily(daily(), "09:30:00").unwrap();

        let times: Vec<_> = (0..3).map(|_| source.get_next_event().unwrap().time).collect();
        assert_eq!(times, vec![at(0, 9, 30, 0), at(1, 9, 30, 0), at(2, 9, 30, 0)]);
    }

    #[test]
    fn test_rule_past_midnight_keeps_early_rules_firing() {
        let end = Some(at(2, 23, 0, 0));
        let mut source = EventSource::new(session(), at(0, 0, 0, 0)).with_end(end);
        source.daily(daily(), "00:30").unwrap();
        source.daily(daily(), "close+10h").unwrap();

        let mut times = Vec::new();
        while let Some(event) = source.get_next_event() {
            times.push(event.time);
        }
        assert_eq!(
            times,
            vec![
                at(0, 0, 30, 0),
                at(0, 1, 0, 0),
                at(1, 0, 30, 0),
                at(1, 1, 0, 0),
                at(2, 0, 30, 0),
                at(2, 1, 0, 0),
            ]
        );
    }

    #[test]
    fn test_start_after_rule_time_skips_first_day() {
        let mut source = EventSource::new(session(), at(0, 10, 0, 0));
        source.daily(daily(), "09:30:00").unwrap();
        assert_eq!(source.get_next_event().unwrap().time, at(1, 9, 30, 0));
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let mut source =
            EventSource::new(session(), at(0, 9, 30, 0)).with_end(Some(at(1, 9, 30, 0)));
        source.daily(daily(), "open").unwrap();

        assert_eq!(source.get_next_event().unwrap().time, at(0, 9, 30, 0));
        assert_eq!(source.get_next_event().unwrap().time, at(1, 9, 30, 0));
        assert!(source.get_next_event().is_none());
    }

    #[test]
    fn test_events_within_day_are_sorted() {
        let mut source = EventSource::new(session(), at(0, 0, 0, 0));
        let minute = EventClass::Kind(EventKind::EveryMinute);
        source.daily(daily(), "close").unwrap();
        source.daily(minute, "open-30m").unwrap();
        source.daily(daily(), "12:00").unwrap();

        assert_eq!(source.buffered(), 0);
        let first = source.peek_next_event().unwrap();
        assert_eq!(first, Event::new(minute, at(0, 9, 0, 0)));
        assert_eq!(source.buffered(), 3);
        assert_eq!(source.get_next_event().unwrap(), first);
        assert_eq!(source.get_next_event().unwrap().time, at(0, 12, 0, 0));
        assert_eq!(source.get_next_event().unwrap().time, at(0, 15, 0, 0));
        assert_eq!(source.get_next_event().unwrap().time, at(1, 9, 0, 0));
    }

    #[test]
    fn test_lookahead_window_stops_generation() {
        let mut source = EventSource::new(session(), at(0, 0, 0, 0)).with_lookahead_days(2);
        source.daily(daily(), "10:00").unwrap();

        assert!(source.get_next_event().is_some());
        assert!(source.get_next_event().is_some());
        assert!(source.get_next_event().is_none());
        assert!(source.peek_next_event().is_none());
    }

    #[test]
    fn test_empty_source_yields_nothing() {
        let mut source = EventSource::new(session(), at(0, 0, 0, 0)).with_lookahead_days(3);
        assert!(source.peek_next_event().is_none());
    }

    #[test]
    fn test_rule_change_resumes_after_last_emitted() {
        let mut source = EventSource::new(session(), at(0, 0, 0, 0));
        source.daily(daily(), "10:00").unwrap();
        assert_eq!(source.get_next_event().unwrap().time, at(0, 10, 0, 0));

        source.daily(daily(), "09:00").unwrap();
        source.daily(daily(), "11:00").unwrap();
        assert_eq!(source.get_next_event().unwrap().time, at(0, 11, 0, 0));
        assert_eq!(source.get_next_event().unwrap().time, at(1, 9, 0, 0));
    }

    #[test]
    fn test_listeners_fire_on_change_until_removed() {
        let mut source = EventSource::new(session(), at(0, 0, 0, 0));
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        let id = source.add_listener(move || counter.set(counter.get() + 1));

        source.daily(daily(), "10:00").unwrap();
        assert_eq!(source.remove_class(daily()), 1);
        assert_eq!(source.remove_class(daily()), 0);
        assert_eq!(hits.get(), 2);

        assert!(source.remove_listener(id));
        source.daily(daily(), "10:00").unwrap();
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn test_invalid_rule_is_rejected_without_change() {
        let mut source = EventSource::new(session(), at(0, 0, 0, 0));
        assert!(source.daily(daily(), "lunch").is_err());
        assert!(source.rules().is_empty());
    }
}
