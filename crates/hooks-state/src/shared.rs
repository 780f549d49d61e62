//! # Shared State Box
//!
//! One mutable JSON record shared across a component tree, with
//! subscriber-list notification:
//!
//! ```text
//! dispatch(Replace | Slice)
//!   ├─► state updated under the write lock
//!   ├─► persisted through the StorageAccessor (if configured)
//!   └─► subscribers notified, lock released
//!         ├─ no slice      ─► always called
//!         └─ slice "list"  ─► called only if state["list"] changed
//! ```
//!
//! Slice change detection compares `serde_json::Value`s structurally, so
//! objects and arrays are compared deeply and primitives by value.

use crate::binder::Record;
use crate::storage::StorageAccessor;
use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Callback invoked with the full record after a dispatch.
pub type StateCallback = Arc<dyn Fn(&Record) + Send + Sync>;

/// Identifier of one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub u64);

/// State update.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Replace the whole record.
    Replace(Record),
    /// Replace one top-level entry.
    Slice { slice: String, value: Value },
}

impl Dispatch {
    /// Update of the entry named `slice`.
    pub fn slice(slice: impl Into<String>, value: Value) -> Self {
        Self::Slice {
            slice: slice.into(),
            value,
        }
    }
}

/// Persistence options for a `SharedStateBox`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedStateOptions {
    /// Storage key the record is persisted under.
    pub storage_key: String,
    /// Persist after every dispatch.
    pub persist: bool,
}

impl Default for SharedStateOptions {
    fn default() -> Self {
        Self {
            storage_key: "shared-state".to_string(),
            persist: true,
        }
    }
}

struct Subscriber {
    callback: StateCallback,
    slice: Option<String>,
}

struct BoxInner {
    state: RwLock<Record>,
    subscribers: RwLock<BTreeMap<SubscriptionId, Subscriber>>,
    next_id: AtomicU64,
    storage: Option<StorageAccessor>,
    options: SharedStateOptions,
}

impl BoxInner {
    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.write().remove(&id).is_some()
    }
}

/// Shared record with slice-aware subscriptions.
///
/// Cloning yields another handle to the same record.
#[derive(Clone)]
pub struct SharedStateBox {
    inner: Arc<BoxInner>,
}

impl SharedStateBox {
    /// In-memory box starting from `initial`.
    pub fn new(initial: Record) -> Self {
        Self::build(initial, None, SharedStateOptions::default())
    }

    /// Box that persists through `storage` according to `options`.
    ///
    /// Encryption, if wanted, is configured on the accessor.
    pub fn with_storage(
        initial: Record,
        storage: StorageAccessor,
        options: SharedStateOptions,
    ) -> Self {
        Self::build(initial, Some(storage), options)
    }

    fn build(
        initial: Record,
        storage: Option<StorageAccessor>,
        options: SharedStateOptions,
    ) -> Self {
        Self {
            inner: Arc::new(BoxInner {
                state: RwLock::new(initial),
                subscribers: RwLock::default(),
                next_id: AtomicU64::new(1),
                storage,
                options,
            }),
        }
    }

    /// Deep copy of the whole record.
    ///
    /// Mutating the returned record does not affect the box.
    #[must_use]
    pub fn get_state(&self) -> Record {
        self.inner.state.read().clone()
    }

    /// Live read access to one slice, or `None` if it is absent.
    ///
    /// The guard holds the box's read lock: drop it before dispatching.
    #[must_use]
    pub fn get_slice(&self, slice: &str) -> Option<MappedRwLockReadGuard<'_, Value>> {
        RwLockReadGuard::try_map(self.inner.state.read(), |record| record.get(slice)).ok()
    }

    /// Apply `action`, persist, then notify subscribers.
    ///
    /// Returns the number of subscribers that were called.
    pub fn dispatch(&self, action: Dispatch) -> usize {
        let (previous, current) = {
            let mut state = self.inner.state.write();
            let previous = state.clone();
            match action {
                Dispatch::Replace(record) => *state = record,
                Dispatch::Slice { slice, value } => {
                    state.insert(slice, value);
                }
            }
            // Written under the lock so storage always ends on the latest record.
            self.persist(&state);
            (previous, state.clone())
        };

        self.notify(&previous, &current)
    }

    /// Replace the record with the persisted one, if any.
    ///
    /// Subscribers are notified as for a dispatch, but nothing is written
    /// back to storage. Returns whether a persisted record was loaded.
    pub fn hydrate(&self) -> bool {
        let Some(storage) = &self.inner.storage else {
            return false;
        };
        let record = match storage.read_value(&self.inner.options.storage_key) {
            Some(Value::Object(record)) => record,
            Some(other) => {
                warn!(
                    key = %self.inner.options.storage_key,
                    kind = %value_kind(&other),
                    "Persisted shared state is not a record, ignoring"
                );
                return false;
            }
            None => return false,
        };

        let previous = std::mem::replace(&mut *self.inner.state.write(), record.clone());
        self.notify(&previous, &record);
        true
    }

    /// Register `callback`, optionally scoped to one slice.
    ///
    /// The same callback may be registered several times with different
    /// slices; each registration is independent.
    pub fn subscribe(&self, callback: StateCallback, slice: Option<&str>) -> StateSubscription {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.subscribers.write().insert(
            id,
            Subscriber {
                callback,
                slice: slice.map(str::to_string),
            },
        );
        debug!(subscription = id.0, slice = ?slice, "Shared state subscriber added");

        StateSubscription {
            inner: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }

    fn persist(&self, current: &Record) {
        let Some(storage) = &self.inner.storage else {
            return;
        };
        if !self.inner.options.persist {
            return;
        }
        if !storage.write(&self.inner.options.storage_key, current) {
            warn!(key = %self.inner.options.storage_key, "Shared state was not persisted");
        }
    }

    fn notify(&self, previous: &Record, current: &Record) -> usize {
        // Snapshot so callbacks can subscribe, unsubscribe or dispatch.
        let targets: Vec<StateCallback> = self
            .inner
            .subscribers
            .read()
            .values()
            .filter(|sub| match &sub.slice {
                None => true,
                Some(slice) => previous.get(slice) != current.get(slice),
            })
            .map(|sub| Arc::clone(&sub.callback))
            .collect();

        for callback in &targets {
            callback(current);
        }
        targets.len()
    }
}

impl fmt::Debug for SharedStateBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedStateBox")
            .field("state", &*self.inner.state.read())
            .field("subscribers", &self.subscriber_count())
            .field("options", &self.inner.options)
            .finish()
    }
}

/// Handle to one subscription. Unsubscribes when dropped.
#[must_use = "dropping the subscription unsubscribes immediately"]
pub struct StateSubscription {
    inner: Weak<BoxInner>,
    id: SubscriptionId,
}

impl StateSubscription {
    /// This subscription's id.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove exactly this registration. Returns whether it was still live.
    pub fn unsubscribe(&self) -> bool {
        self.inner
            .upgrade()
            .is_some_and(|inner| inner.unsubscribe(self.id))
    }
}

impl Drop for StateSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for StateSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSubscription").field("id", &self.id).finish()
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
