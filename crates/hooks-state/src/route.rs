//! # Route Monitor
//!
//! Bridges a `History` collaborator onto the bus:
//!
//! ```text
//! history.push("/a") ──► blockers ──┬─ any blocks ─► route:blocked {from, to, action}
//!                                   └─ none       ─► location updated
//!                                                    └─► listeners ─► route:changed <Location>
//! ```
//!
//! The history implementation itself belongs to the router; `MemoryHistory`
//! is an in-process stand-in used by tests and headless hosts.

use hooks_bus::{BusError, BusScope, BusStats, Capabilities, EventBus};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Emitted after every completed transition. Payload: the new `Location`.
pub const ROUTE_CHANGED: &str = "route:changed";

/// Emitted when a guard stopped a transition.
pub const ROUTE_BLOCKED: &str = "route:blocked";

/// A parsed path.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Location {
    pub pathname: String,
    /// Query string including the leading `?`, or empty.
    pub search: String,
    /// Fragment including the leading `#`, or empty.
    pub hash: String,
}

impl Location {
    /// Split `path` into pathname, search and hash.
    pub fn parse(path: &str) -> Self {
        let (rest, hash) = match path.find('#') {
            Some(i) => (&path[..i], &path[i..]),
            None => (path, ""),
        };
        let (pathname, search) = match rest.find('?') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, ""),
        };
        let pathname = if pathname.is_empty() { "/" } else { pathname };
        Self {
            pathname: pathname.to_string(),
            search: search.to_string(),
            hash: hash.to_string(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.pathname, self.search, self.hash)
    }
}

/// Kind of transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Push,
    Replace,
    Pop,
}

/// Called with the new location after a transition.
pub type Listener = Arc<dyn Fn(&Location, Action) + Send + Sync>;

/// Called with `(from, to, action)` before a transition; `true` blocks it.
pub type Blocker = Arc<dyn Fn(&Location, &Location, Action) -> bool + Send + Sync>;

/// Undo for `listen`/`block`.
pub type Unregister = Box<dyn FnOnce() + Send>;

/// Navigation history provided by the router.
pub trait History: Send + Sync {
    fn listen(&self, listener: Listener) -> Unregister;

    fn block(&self, blocker: Blocker) -> Unregister;

    /// Navigate to `path`. Returns `false` when a blocker stopped it.
    fn push(&self, path: &str) -> bool;

    /// Replace the current entry. Returns `false` when a blocker stopped it.
    fn replace(&self, path: &str) -> bool;

    fn location(&self) -> Location;
}

#[derive(Default)]
struct HistoryInner {
    entries: RwLock<Vec<Location>>,
    index: RwLock<usize>,
    listeners: RwLock<BTreeMap<u64, Listener>>,
    blockers: RwLock<BTreeMap<u64, Blocker>>,
    next_id: AtomicU64,
}

/// In-memory `History` with a back stack.
#[derive(Clone)]
pub struct MemoryHistory {
    inner: Arc<HistoryInner>,
}

impl MemoryHistory {
    /// History positioned at `initial`.
    pub fn new(initial: &str) -> Self {
        let inner = HistoryInner {
            entries: RwLock::new(vec![Location::parse(initial)]),
            ..HistoryInner::default()
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Go back one entry. Returns `false` at the start or when blocked.
    pub fn back(&self) -> bool {
        let index = *self.inner.index.read();
        if index == 0 {
            return false;
        }
        let target = self.inner.entries.read()[index - 1].clone();
        self.transition(target, Action::Pop)
    }

    /// Number of entries in the stack.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    /// Whether the stack has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.entries.read().is_empty()
    }

    fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn transition(&self, target: Location, action: Action) -> bool {
        let from = self.location();
        let blockers: Vec<Blocker> = self.inner.blockers.read().values().cloned().collect();
        if blockers.iter().any(|blocker| blocker(&from, &target, action)) {
            debug!(from = %from, to = %target, "Transition blocked");
            return false;
        }

        {
            let mut entries = self.inner.entries.write();
            let mut index = self.inner.index.write();
            match action {
                Action::Push => {
                    entries.truncate(*index + 1);
                    entries.push(target.clone());
                    *index = entries.len() - 1;
                }
                Action::Replace => entries[*index] = target.clone(),
                Action::Pop => *index = index.saturating_sub(1),
            }
        }

        let listeners: Vec<Listener> = self.inner.listeners.read().values().cloned().collect();
        for listener in &listeners {
            listener(&target, action);
        }
        true
    }
}

impl History for MemoryHistory {
    fn listen(&self, listener: Listener) -> Unregister {
        let id = self.next_id();
        self.inner.listeners.write().insert(id, listener);
        let inner: Weak<HistoryInner> = Arc::downgrade(&self.inner);
        Box::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.listeners.write().remove(&id);
            }
        })
    }

    fn block(&self, blocker: Blocker) -> Unregister {
        let id = self.next_id();
        self.inner.blockers.write().insert(id, blocker);
        let inner: Weak<HistoryInner> = Arc::downgrade(&self.inner);
        Box::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.blockers.write().remove(&id);
            }
        })
    }

    fn push(&self, path: &str) -> bool {
        self.transition(Location::parse(path), Action::Push)
    }

    fn replace(&self, path: &str) -> bool {
        self.transition(Location::parse(path), Action::Replace)
    }

    fn location(&self) -> Location {
        let index = *self.inner.index.read();
        self.inner
            .entries
            .read()
            .get(index)
            .cloned()
            .unwrap_or_default()
    }
}

impl fmt::Debug for MemoryHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryHistory")
            .field("location", &self.location())
            .field("len", &self.len())
            .finish()
    }
}

/// Emits route events for every transition of a `History`.
pub struct RouteMonitor {
    bus: EventBus,
    history: Arc<dyn History>,
    unlisten: Mutex<Option<Unregister>>,
}

impl RouteMonitor {
    /// Bind a consumer firing `route:changed` and `route:blocked` and start
    /// listening to `history`.
    ///
    /// # Errors
    ///
    /// - `BusError::ScopeClosed` - the scope was torn down
    pub fn bind(scope: &BusScope, tag: &str, history: Arc<dyn History>) -> Result<Self, BusError> {
        let caps = Capabilities::new().fires([ROUTE_CHANGED, ROUTE_BLOCKED]);
        let bus = EventBus::bind(scope, tag, caps)?;

        let emitter = bus.clone();
        let unlisten = history.listen(Arc::new(move |location: &Location, action: Action| {
            let payload = match serde_json::to_value(location) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(error = %e, "Location could not be encoded");
                    return;
                }
            };
            debug!(location = %location, action = ?action, "Route changed");
            if let Err(e) = emitter.emit(ROUTE_CHANGED, payload) {
                warn!(event = ROUTE_CHANGED, error = %e, "Route handler failed");
            }
        }));

        Ok(Self {
            bus,
            history,
            unlisten: Mutex::new(Some(unlisten)),
        })
    }

    /// Block transitions while `predicate(target)` holds, emitting
    /// `route:blocked` for each stopped transition.
    pub fn guard<P>(&self, predicate: P) -> RouteGuard
    where
        P: Fn(&Location) -> bool + Send + Sync + 'static,
    {
        let emitter = self.bus.clone();
        let blocker: Blocker = Arc::new(move |from: &Location, to: &Location, action: Action| {
            if !predicate(to) {
                return false;
            }
            let payload = json!({"from": from, "to": to, "action": action});
            if let Err(e) = emitter.emit(ROUTE_BLOCKED, payload) {
                warn!(event = ROUTE_BLOCKED, error = %e, "Route handler failed");
            }
            true
        });
        let unblock = self.history.block(blocker);
        RouteGuard {
            release: Mutex::new(Some(unblock)),
        }
    }

    /// Current location.
    #[must_use]
    pub fn location(&self) -> Location {
        self.history.location()
    }

    /// This monitor's bus statistics.
    #[must_use]
    pub fn stats(&self) -> BusStats {
        self.bus.stats()
    }

    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Stop listening. Idempotent; also runs on drop.
    pub fn stop(&self) {
        if let Some(unlisten) = self.unlisten.lock().take() {
            unlisten();
        }
    }
}

impl Drop for RouteMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for RouteMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteMonitor")
            .field("consumer", &self.bus.tag())
            .field("location", &self.location())
            .finish()
    }
}

/// Active guard. Transitions are allowed again once released or dropped.
#[must_use = "dropping the guard releases it immediately"]
pub struct RouteGuard {
    release: Mutex<Option<Unregister>>,
}

impl RouteGuard {
    pub fn release(&self) {
        if let Some(release) = self.release.lock().take() {
            release();
        }
    }
}

impl Drop for RouteGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for RouteGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteGuard")
            .field("active", &self.release.lock().is_some())
            .finish()
    }
}

/// Payload helper for `route:changed` subscribers.
///
/// # Errors
///
/// Returns the decode error if the payload is not a location.
pub fn location_from_payload(payload: &Value) -> Result<Location, serde_json::Error> {
    Location::deserialize(payload)
}
