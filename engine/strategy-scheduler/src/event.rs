//! Event kinds, event classes and event instances

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

/// Closed set of scheduled-event kinds; each carries a fixed priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Daily,
    EveryMinute,
    AccountSync,
}

impl EventKind {
    /// Dispatch priority; higher fires first among events due at the same instant
    pub fn priority(self) -> i32 {
        match self {
            EventKind::Daily => 0,
            EventKind::EveryMinute => 1,
            EventKind::AccountSync => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EventKind::Daily => "daily",
            EventKind::EveryMinute => "every_minute",
            EventKind::AccountSync => "account_sync",
        }
    }
}

/// Opaque identity of one named timer class, issued by [`EventClassRegistry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerClassId(u32);

/// Event bus dispatch key.
///
/// Classes form a three level hierarchy: `Any` is the root, each `Kind` sits under it
/// and each named `Timer` sits under its kind. A subscriber for a class receives
/// instances of that class and of every class below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventClass {
    Any,
    Kind(EventKind),
    Timer { kind: EventKind, id: TimerClassId },
}

impl EventClass {
    pub fn priority(&self) -> i32 {
        match self {
            EventClass::Any => 0,
            EventClass::Kind(kind) | EventClass::Timer { kind, .. } => kind.priority(),
        }
    }

    pub fn parent(&self) -> Option<EventClass> {
        match self {
            EventClass::Any => None,
            EventClass::Kind(_) => Some(EventClass::Any),
            EventClass::Timer { kind, .. } => Some(EventClass::Kind(*kind)),
        }
    }

    /// True when `self` is `ancestor` or lies below it
    pub fn is_subclass_of(&self, ancestor: &EventClass) -> bool {
        let mut current = Some(*self);
        while let Some(class) = current {
            if class == *ancestor {
                return true;
            }
            current = class.parent();
        }
        false
    }
}

impl fmt::Display for EventClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventClass::Any => f.write_str("any"),
            EventClass::Kind(kind) => f.write_str(kind.name()),
            EventClass::Timer { kind, id } => write!(f, "{}#{}", kind.name(), id.0),
        }
    }
}

/// Name-keyed cache of timer classes, so repeated expansions of one logical timer
/// share a single class
#[derive(Debug, Default)]
pub struct EventClassRegistry {
    by_name: HashMap<String, EventClass>,
    names: Vec<String>,
}

impl EventClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the class registered under `name`, creating it with `kind` if absent
    pub fn get_or_create(&mut self, name: &str, kind: EventKind) -> EventClass {
        if let Some(existing) = self.by_name.get(name) {
            if let EventClass::Timer { kind: existing_kind, .. } = existing {
                if *existing_kind != kind {
                    warn!("Event class {} already exists as {}", name, existing_kind.name());
                }
            }
            return *existing;
        }

        let id = TimerClassId(self.names.len() as u32);
        let class = EventClass::Timer { kind, id };
        self.names.push(name.to_string());
        self.by_name.insert(name.to_string(), class);
        class
    }

    pub fn get(&self, name: &str) -> Option<EventClass> {
        self.by_name.get(name).copied()
    }

    pub fn name_of(&self, class: &EventClass) -> Option<&str> {
        match class {
            EventClass::Timer { id, .. } => self.names.get(id.0 as usize).map(String::as_str),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A concrete occurrence produced by an event source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub class: EventClass,
    pub time: NaiveDateTime,
}

impl Event {
    pub fn new(class: EventClass, time: NaiveDateTime) -> Self {
        Self { class, time }
    }

    pub fn priority(&self) -> i32 {
        self.class.priority()
    }

    pub fn is_instance_of(&self, class: &EventClass) -> bool {
        self.class.is_subclass_of(class)
    }
}
