//! # Derived State Binders
//!
//! A binder folds a stream of bus events into one piece of state:
//!
//! ```text
//! trigger(event, transform)(args)
//!   └─► emit(event, transform(args))
//!         └─► binder handler
//!               └─► reducer(current, payload, event)
//!                     ├─ Ok(next)  ─► state = next, error = None
//!                     └─ Err(e)    ─► error = Some(e), state unchanged
//! ```
//!
//! The binder subscribes one handler to every bound event on creation and
//! unsubscribes that same handler when unbound or dropped.
//!
//! ## Variants
//!
//! - `list`: `Vec<T>` state, reducer replaces the list
//! - `count`: `i64` state starting at `CountOptions::start`
//! - `composite`: JSON record, reducer result is shallow-merged
//! - `PromiseBinder`: async side effects, only `error` is observable

mod composite;
mod count;
mod list;
mod promise;

pub use composite::Record;
pub use count::CountOptions;
pub use promise::PromiseBinder;

use crate::error::BinderError;
use hooks_bus::{BusError, BusScope, BusStats, Capabilities, EventBus, Handler};
use parking_lot::{ReentrantMutex, RwLock};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Result of one recomputation.
pub type Recompute<S> = Result<S, BinderError>;

/// Decode a payload into a typed value for use inside reducers.
///
/// # Errors
///
/// - `BinderError::Payload` - the payload does not match `T`
pub fn decode<T: DeserializeOwned>(payload: &Value) -> Result<T, BinderError> {
    serde_json::from_value(payload.clone()).map_err(|e| BinderError::Payload(e.to_string()))
}

/// Last failure of a binder, shared with its triggers.
#[derive(Debug, Clone, Default)]
pub struct ErrorSlot {
    inner: Arc<RwLock<Option<BinderError>>>,
}

impl ErrorSlot {
    /// Current error, if the last recomputation failed.
    #[must_use]
    pub fn get(&self) -> Option<BinderError> {
        self.inner.read().clone()
    }

    pub(crate) fn set(&self, error: BinderError) {
        *self.inner.write() = Some(error);
    }

    pub(crate) fn clear(&self) {
        *self.inner.write() = None;
    }
}

/// Emits one event with a transformed payload on behalf of a binder.
///
/// Handler failures during the emit land in the binder's error slot.
#[derive(Clone)]
pub struct Trigger {
    bus: EventBus,
    event: String,
    transform: Arc<dyn Fn(Value) -> Value + Send + Sync>,
    error: ErrorSlot,
}

impl Trigger {
    pub(crate) fn new<T>(bus: &EventBus, event: &str, transform: T, error: &ErrorSlot) -> Self
    where
        T: Fn(Value) -> Value + Send + Sync + 'static,
    {
        Self {
            bus: bus.clone(),
            event: event.to_string(),
            transform: Arc::new(transform),
            error: error.clone(),
        }
    }

    /// Transform `args`, emit the event, and return the handlers' results.
    ///
    /// Returns an empty list when the emit failed; the failure is stored in
    /// the binder's error slot instead of being returned.
    pub fn fire(&self, args: Value) -> Vec<Value> {
        let payload = (self.transform)(args);
        match self.bus.emit(&self.event, payload) {
            Ok(results) => results,
            Err(err) => {
                debug!(event = %self.event, consumer = %self.bus.tag(), error = %err, "Trigger emit failed");
                self.error.set(err.into());
                Vec::new()
            }
        }
    }

    /// Event this trigger emits.
    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger")
            .field("event", &self.event)
            .field("consumer", &self.bus.tag())
            .finish()
    }
}

/// Bus binding shared by every binder flavour: the consumer, the exact
/// handler it subscribed, and the unbind latch.
pub(crate) struct Binding {
    bus: EventBus,
    handler: Handler,
    events: Vec<String>,
    unbound: AtomicBool,
}

impl Binding {
    /// Bind a consumer that subscribes to and fires `events`, and subscribe
    /// `handler` to each of them.
    pub(crate) fn mount(
        scope: &BusScope,
        tag: &str,
        mut events: Vec<String>,
        handler: Handler,
    ) -> Result<Self, BusError> {
        let mut seen = std::collections::HashSet::new();
        events.retain(|event| seen.insert(event.clone()));

        let bus = EventBus::bind(scope, tag, Capabilities::new().both(events.clone()))?;
        for event in &events {
            bus.on(event, &handler);
        }
        debug!(consumer = %tag, events = ?events, "Binder mounted");
        Ok(Self {
            bus,
            handler,
            events,
            unbound: AtomicBool::new(false),
        })
    }

    pub(crate) fn unmount(&self) {
        if self.unbound.swap(true, Ordering::AcqRel) {
            return;
        }
        self.bus.off(&self.handler);
        debug!(consumer = %self.bus.tag(), "Binder unmounted");
    }

    pub(crate) fn is_bound(&self) -> bool {
        !self.unbound.load(Ordering::Acquire)
    }
}

impl Drop for Binding {
    fn drop(&mut self) {
        self.unmount();
    }
}

/// State recomputed by a reducer every time a bound event fires.
pub struct DerivedState<S> {
    state: Arc<RwLock<S>>,
    error: ErrorSlot,
    binding: Binding,
}

impl<S> DerivedState<S>
where
    S: Clone + Send + Sync + 'static,
{
    /// Bind `reducer` to `events` with replace semantics.
    ///
    /// The reducer receives the current state, the payload and the event
    /// name, and returns the next state. On error the state is left as is
    /// and the error slot is set.
    ///
    /// # Errors
    ///
    /// - `BusError::ScopeClosed` - the scope was torn down
    /// - `BusError::InvalidEventName` - an event name is empty or padded
    pub fn bind<I, E, R>(
        scope: &BusScope,
        tag: &str,
        events: I,
        initial: S,
        reducer: R,
    ) -> Result<Self, BusError>
    where
        I: IntoIterator<Item = E>,
        E: Into<String>,
        R: Fn(&S, &Value, &str) -> Recompute<S> + Send + Sync + 'static,
    {
        let state = Arc::new(RwLock::new(initial));
        let error = ErrorSlot::default();
        // Serializes read-reduce-write per binder. Re-entrant so a reducer
        // may emit into its own binder.
        let recompute = ReentrantMutex::new(());

        let handler = {
            let state = Arc::clone(&state);
            let error = error.clone();
            let consumer = tag.to_string();
            Handler::new(move |event, payload| {
                let _turn = recompute.lock();
                // Clone out so readers are not blocked while the reducer runs.
                let current = state.read().clone();
                match reducer(&current, payload, event) {
                    Ok(next) => {
                        *state.write() = next;
                        error.clear();
                    }
                    Err(e) => {
                        debug!(event = %event, consumer = %consumer, error = %e, "Reducer failed");
                        error.set(e);
                    }
                }
                Ok(Value::Null)
            })
        };

        let events = events.into_iter().map(Into::into).collect();
        let binding = Binding::mount(scope, tag, events, handler)?;

        Ok(Self {
            state,
            error,
            binding,
        })
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> S {
        self.state.read().clone()
    }

    /// Read the current state without cloning it.
    pub fn with_state<T>(&self, f: impl FnOnce(&S) -> T) -> T {
        f(&self.state.read())
    }
}

impl<S> DerivedState<S> {
    /// A function that emits `event` with `transform(args)` as payload.
    pub fn trigger<T>(&self, event: &str, transform: T) -> Trigger
    where
        T: Fn(Value) -> Value + Send + Sync + 'static,
    {
        Trigger::new(&self.binding.bus, event, transform, &self.error)
    }

    /// A trigger that passes its arguments through unchanged.
    #[must_use]
    pub fn trigger_raw(&self, event: &str) -> Trigger {
        self.trigger(event, |args| args)
    }

    /// Last recomputation error, if any.
    #[must_use]
    pub fn error(&self) -> Option<BinderError> {
        self.error.get()
    }

    /// This binder's bus statistics.
    #[must_use]
    pub fn stats(&self) -> BusStats {
        self.binding.bus.stats()
    }

    /// This binder's bus consumer.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.binding.bus
    }

    /// Events the reducer is bound to.
    #[must_use]
    pub fn events(&self) -> &[String] {
        &self.binding.events
    }

    /// Unsubscribe the reducer. Idempotent; also runs on drop.
    pub fn unbind(&self) {
        self.binding.unmount();
    }

    /// Whether the reducer is still subscribed.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.binding.is_bound()
    }
}

impl<S: fmt::Debug> fmt::Debug for DerivedState<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedState")
            .field("state", &*self.state.read())
            .field("error", &self.error.get())
            .field("events", &self.binding.events)
            .finish()
    }
}
