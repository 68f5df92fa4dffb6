//! Event system
//!
//! - Events are named and carry key-value arguments (no order dependency)
//! - Handler returns bool (true = consumed, stops forwarding)
//! - Only handlers registered for an event name are notified
//! - Immediate and time-deferred delivery
//!
//! Scripts raise events with `engine.emitEvent`; the bridge buffers them and
//! the scheduler hands them over here to be dispatched at `EndFrame`.

use crate::ecs::Entity;
use crate::scripting::FieldValue;
use std::collections::{BTreeMap, HashMap};

/// Named event with key-value arguments
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Event name
    pub name: String,
    /// Entity that raised the event, if any
    pub source: Option<Entity>,
    /// Timestamp when event was created (seconds)
    pub timestamp: f64,
    args: BTreeMap<String, FieldValue>,
}

impl Event {
    /// Create a new event with the given name and timestamp
    pub fn new(name: impl Into<String>, timestamp: f64) -> Self {
        Self {
            name: name.into(),
            source: None,
            timestamp,
            args: BTreeMap::new(),
        }
    }

    /// Builder pattern: set the originating entity
    pub fn from_entity(mut self, entity: Entity) -> Self {
        self.source = Some(entity);
        self
    }

    /// Builder pattern: add an argument
    pub fn with_arg(mut self, key: impl Into<String>, value: FieldValue) -> Self {
        self.args.insert(key.into(), value);
        self
    }

    /// Get an argument by key
    pub fn get_arg(&self, key: &str) -> Option<&FieldValue> {
        self.args.get(key)
    }

    /// All arguments, sorted by key
    pub fn args(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.args.iter().map(|(key, value)| (key.as_str(), value))
    }
}

/// Event handler trait
/// Returns true if event was consumed (stops forwarding)
pub trait EventHandler {
    /// Handle an event, return true if consumed
    fn on_event(&mut self, event: &Event) -> bool;
}

impl<F: FnMut(&Event) -> bool> EventHandler for F {
    fn on_event(&mut self, event: &Event) -> bool {
        self(event)
    }
}

/// Event system with registration and queuing
pub struct EventSystem {
    immediate_queue: Vec<Event>,
    deferred_queue: Vec<(f64, Event)>,
    handlers: HashMap<String, Vec<Box<dyn EventHandler>>>,
    current_time: f64,
    dispatched: u64,
}

impl EventSystem {
    /// Create a new empty event system
    pub fn new() -> Self {
        Self {
            immediate_queue: Vec::new(),
            deferred_queue: Vec::new(),
            handlers: HashMap::new(),
            current_time: 0.0,
            dispatched: 0,
        }
    }

    /// Update current time (seconds since start)
    pub fn update_time(&mut self, time: f64) {
        self.current_time = time;
    }

    /// Register a handler for an event name
    pub fn register_handler(&mut self, name: impl Into<String>, handler: Box<dyn EventHandler>) {
        self.handlers.entry(name.into()).or_default().push(handler);
    }

    /// Send event for handling at the next dispatch
    pub fn send(&mut self, event: Event) {
        self.immediate_queue.push(event);
    }

    /// Post event for deferred delivery at specified time
    pub fn post(&mut self, delivery_time: f64, event: Event) {
        self.deferred_queue.push((delivery_time, event));
    }

    /// Dispatch all pending events. Returns how many were delivered.
    ///
    /// Immediate events go first, then deferred events that are due.
    pub fn dispatch(&mut self) -> usize {
        let mut delivered = 0;
        for event in std::mem::take(&mut self.immediate_queue) {
            self.dispatch_event(&event);
            delivered += 1;
        }

        let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.deferred_queue)
            .into_iter()
            .partition(|(time, _)| *time <= self.current_time);
        self.deferred_queue = pending;
        for (_, event) in due {
            self.dispatch_event(&event);
            delivered += 1;
        }

        self.dispatched += delivered as u64;
        delivered
    }

    /// Events waiting for dispatch
    pub fn pending(&self) -> usize {
        self.immediate_queue.len() + self.deferred_queue.len()
    }

    /// Total events delivered since creation
    pub fn dispatched_total(&self) -> u64 {
        self.dispatched
    }

    fn dispatch_event(&mut self, event: &Event) {
        let Some(handlers) = self.handlers.get_mut(&event.name) else {
            log::trace!("No handler for event '{}'", event.name);
            return;
        };
        for handler in handlers.iter_mut() {
            if handler.on_event(event) {
                break;
            }
        }
    }

    /// Clear all queued events
    pub fn clear(&mut self) {
        self.immediate_queue.clear();
        self.deferred_queue.clear();
    }
}

impl Default for EventSystem {
    fn default() -> Self {
        Self::new()
    }
}
