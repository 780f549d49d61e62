//! # Event Registry
//!
//! Process-local mapping of event name to an ordered list of handlers.
//! Insertion order is invocation order. Each `register` call appends, so
//! the same handler registered twice runs twice.

use crate::error::HandlerError;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Result returned by a handler invocation.
pub type HandlerResult = Result<Value, HandlerError>;

type HandlerFn = dyn Fn(&str, &Value) -> HandlerResult + Send + Sync;

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// A subscribed handler.
///
/// Clones share identity: `off()` removes a handler only when given a clone
/// of the exact `Handler` that was passed to `on()`. Two handlers built from
/// identical closures are distinct.
#[derive(Clone)]
pub struct Handler {
    id: u64,
    func: Arc<HandlerFn>,
}

impl Handler {
    /// Wrap a closure receiving `(event_name, payload)`.
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&str, &Value) -> HandlerResult + Send + Sync + 'static,
    {
        Self {
            id: NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed),
            func: Arc::new(func),
        }
    }

    /// Wrap a closure that only looks at the payload and never fails.
    pub fn from_fn<F>(func: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        Self::new(move |_, payload| {
            func(payload);
            Ok(Value::Null)
        })
    }

    /// Invoke the handler.
    pub fn call(&self, event: &str, payload: &Value) -> HandlerResult {
        (self.func)(event, payload)
    }

    /// Identity shared by all clones of this handler.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether `other` is a clone of this handler.
    #[must_use]
    pub fn same_as(&self, other: &Handler) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler").field("id", &self.id).finish()
    }
}

/// Outcome of removing a handler from one event's list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// The handler was found and its registrations were removed.
    Removed(usize),
    /// The handler was not under this event, so the whole list was cleared.
    Cleared(usize),
    /// The event is not known to the registry.
    Unknown,
}

/// Mapping of event name to ordered handlers.
#[derive(Debug, Default)]
pub struct EventRegistry {
    handlers: HashMap<String, Vec<Handler>>,
}

impl EventRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make an event name known without registering a handler.
    ///
    /// Returns `true` if the name was new.
    pub fn declare(&mut self, event: &str) -> bool {
        if self.handlers.contains_key(event) {
            return false;
        }
        self.handlers.insert(event.to_string(), Vec::new());
        true
    }

    /// Whether the event name is known (declared or subscribed).
    #[must_use]
    pub fn contains(&self, event: &str) -> bool {
        self.handlers.contains_key(event)
    }

    /// Append a handler to an event's list.
    pub fn register(&mut self, event: &str, handler: Handler) {
        self.handlers
            .entry(event.to_string())
            .or_default()
            .push(handler);
    }

    /// Remove every registration of `handler` under `event`.
    ///
    /// When the handler is not registered under a known event, the entire
    /// list for that event is cleared instead. Teardown prefers removing too
    /// much over leaving a stale registration behind.
    pub fn remove(&mut self, event: &str, handler: &Handler) -> Removal {
        let Some(list) = self.handlers.get_mut(event) else {
            return Removal::Unknown;
        };

        let before = list.len();
        list.retain(|h| !h.same_as(handler));
        let removed = before - list.len();

        if removed > 0 {
            Removal::Removed(removed)
        } else {
            list.clear();
            Removal::Cleared(before)
        }
    }

    /// Snapshot of the handlers for an event, in invocation order.
    #[must_use]
    pub fn handlers(&self, event: &str) -> Vec<Handler> {
        self.handlers.get(event).cloned().unwrap_or_default()
    }

    /// Number of handlers registered for an event.
    #[must_use]
    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.get(event).map_or(0, Vec::len)
    }

    /// All known event names, sorted.
    #[must_use]
    pub fn events(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop every event and handler.
    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    /// Number of known event names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no event name is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
