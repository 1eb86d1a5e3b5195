// Synchronous event bus with class-hierarchy matching

use crate::event::{Event, EventClass};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::error;

/// Identifier returned by [`EventBus::register`], needed to unregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(u64);

/// Subscriber callback producing a result of type `R`
pub type BusCallback<R> = Rc<dyn Fn(&Event) -> R>;

struct Subscriber<R> {
    id: CallbackId,
    priority: i32,
    callback: BusCallback<R>,
}

struct ClassEntry<R> {
    class: EventClass,
    subscribers: Vec<Subscriber<R>>,
}

/// Maps event classes to priority-ordered subscriber lists.
///
/// - Classes are visited in the order they were first registered
/// - Within a class, callbacks run by descending priority, then registration order
/// - A class matches an event whose class is the same or a subclass
///
/// The bus is interior-mutable so callbacks may register or unregister while an
/// `emit` is in progress; such changes apply to the next `emit`.
pub struct EventBus<R = ()> {
    entries: RefCell<Vec<ClassEntry<R>>>,
    next_id: Cell<u64>,
}

impl<R> EventBus<R> {
    pub fn new() -> Self {
        Self { entries: RefCell::new(Vec::new()), next_id: Cell::new(0) }
    }

    pub fn register<F>(&self, class: EventClass, callback: F, priority: i32) -> CallbackId
    where
        F: Fn(&Event) -> R + 'static,
    {
        let id = CallbackId(self.next_id.get());
        self.next_id.set(id.0 + 1);

        let mut entries = self.entries.borrow_mut();
        let index = match entries.iter().position(|entry| entry.class == class) {
            Some(index) => index,
            None => {
                entries.push(ClassEntry { class, subscribers: Vec::new() });
                entries.len() - 1
            }
        };

        let subscribers = &mut entries[index].subscribers;
        let at =
            subscribers.iter().position(|s| s.priority < priority).unwrap_or(subscribers.len());
        subscribers.insert(at, Subscriber { id, priority, callback: Rc::new(callback) });
        id
    }

    /// Remove a callback; logs and returns false if it was not registered for `class`
    pub fn unregister(&self, class: EventClass, id: CallbackId) -> bool {
        let mut entries = self.entries.borrow_mut();
        let removed = entries.iter_mut().find(|entry| entry.class == class).and_then(|entry| {
            let at = entry.subscribers.iter().position(|s| s.id == id)?;
            Some(entry.subscribers.remove(at))
        });

        if removed.is_none() {
            error!("Callback {:?} is not registered for event class {}", id, class);
        }
        removed.is_some()
    }

    /// Deliver `event` to every matching callback and collect their results in order
    pub fn emit(&self, event: &Event) -> Vec<R> {
        self.matching(event).iter().map(|callback| callback(event)).collect()
    }

    pub fn subscriber_count(&self, class: EventClass) -> usize {
        self.entries
            .borrow()
            .iter()
            .find(|entry| entry.class == class)
            .map_or(0, |entry| entry.subscribers.len())
    }

    fn matching(&self, event: &Event) -> Vec<BusCallback<R>> {
        self.entries
            .borrow()
            .iter()
            .filter(|entry| event.is_instance_of(&entry.class))
            .flat_map(|entry| entry.subscribers.iter().map(|s| s.callback.clone()))
            .collect()
    }
}

impl<T, E> EventBus<Result<T, E>> {
    /// Like [`EventBus::emit`] but stops at the first failing callback
    pub fn try_emit(&self, event: &Event) -> Result<Vec<T>, E> {
        self.matching(event).iter().map(|callback| callback(event)).collect()
    }
}

impl<R> Default for EventBus<R> {
    fn default() -> Self {
        Self::new()
    }
}
