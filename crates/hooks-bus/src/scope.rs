//! # Bus Scope
//!
//! Owns one `EventRegistry` for the lifetime of a provider. Consumers hold a
//! cheap clone of the scope; tearing the scope down clears the registry for
//! all of them at once.

use crate::registry::{EventRegistry, Handler, Removal};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Why a capability check refused an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// `on()` for an event neither declared nor known.
    Subscribe,
    /// `emit()` for an event not in the `fires` set.
    Fire,
    /// Operation on a torn-down scope.
    Closed,
}

impl Rejection {
    /// Label used in logs and metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subscribe => "subscribe",
            Self::Fire => "fire",
            Self::Closed => "closed",
        }
    }
}

/// Hook for observing bus activity (metrics, tracing bridges).
///
/// All methods default to no-ops.
pub trait BusObserver: Send + Sync {
    /// A handler was registered.
    fn subscribed(&self, _event: &str, _consumer: &str) {}

    /// An emit finished; `handlers` is the number invoked successfully.
    fn emitted(&self, _event: &str, _consumer: &str, _handlers: usize) {}

    /// A handler returned an error during emit.
    fn handler_failed(&self, _event: &str, _consumer: &str) {}

    /// A capability check refused an operation.
    fn rejected(&self, _event: &str, _consumer: &str, _reason: Rejection) {}
}

struct ScopeInner {
    id: Uuid,
    label: String,
    registry: RwLock<EventRegistry>,
    closed: AtomicBool,
    observer: RwLock<Option<Arc<dyn BusObserver>>>,
}

/// Lifetime boundary for one event registry.
#[derive(Clone)]
pub struct BusScope {
    inner: Arc<ScopeInner>,
}

impl BusScope {
    /// Establish a new scope with an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::labeled("bus")
    }

    /// Establish a new scope with a label for logs.
    #[must_use]
    pub fn labeled(label: impl Into<String>) -> Self {
        let inner = ScopeInner {
            id: Uuid::new_v4(),
            label: label.into(),
            registry: RwLock::new(EventRegistry::new()),
            closed: AtomicBool::new(false),
            observer: RwLock::new(None),
        };
        debug!(scope = %inner.label, id = %inner.id, "Bus scope established");
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Install an observer for bus activity, replacing any previous one.
    pub fn set_observer(&self, observer: Arc<dyn BusObserver>) {
        *self.inner.observer.write() = Some(observer);
    }

    /// Unique id of this scope.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Label given at construction.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Whether `teardown()` has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Clear the registry and refuse further bindings.
    pub fn teardown(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut registry = self.inner.registry.write();
        let events = registry.len();
        registry.clear();
        debug!(scope = %self.inner.label, events, "Bus scope torn down");
    }

    /// All known event names, sorted.
    #[must_use]
    pub fn known_events(&self) -> Vec<String> {
        self.inner.registry.read().events()
    }

    /// Number of handlers currently registered for `event`.
    #[must_use]
    pub fn handler_count(&self, event: &str) -> usize {
        self.inner.registry.read().handler_count(event)
    }

    /// Whether two scope values refer to the same scope.
    #[must_use]
    pub fn same_scope(&self, other: &BusScope) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn declare(&self, event: &str) {
        self.inner.registry.write().declare(event);
    }

    pub(crate) fn is_known(&self, event: &str) -> bool {
        self.inner.registry.read().contains(event)
    }

    pub(crate) fn register(&self, event: &str, handler: Handler) {
        self.inner.registry.write().register(event, handler);
    }

    pub(crate) fn remove(&self, event: &str, handler: &Handler) -> Removal {
        self.inner.registry.write().remove(event, handler)
    }

    /// Snapshot so the registry lock is not held while handlers run.
    pub(crate) fn handlers(&self, event: &str) -> Vec<Handler> {
        self.inner.registry.read().handlers(event)
    }

    pub(crate) fn observer(&self) -> Option<Arc<dyn BusObserver>> {
        self.inner.observer.read().clone()
    }
}

impl Default for BusScope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BusScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusScope")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("closed", &self.is_closed())
            .finish()
    }
}
