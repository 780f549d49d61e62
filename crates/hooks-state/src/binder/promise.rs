use super::{Binding, ErrorSlot, Trigger};
use crate::error::BinderError;
use hooks_bus::{BusError, BusScope, BusStats, EventBus, Handler};
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

type Pending = Arc<Mutex<Vec<(String, JoinHandle<()>)>>>;

/// Binder whose handler is an async side effect.
///
/// Every bound event spawns the handler on the current tokio runtime. The
/// binder exposes no state; resolution clears `error` and rejection sets it.
pub struct PromiseBinder {
    error: ErrorSlot,
    pending: Pending,
    binding: Binding,
}

impl PromiseBinder {
    /// Bind an async handler `(payload, event) -> Result<(), BinderError>`.
    ///
    /// # Errors
    ///
    /// - `BusError::ScopeClosed` - the scope was torn down
    /// - `BusError::InvalidEventName` - an event name is empty or padded
    pub fn bind<I, E, F, Fut>(
        scope: &BusScope,
        tag: &str,
        events: I,
        handler: F,
    ) -> Result<Self, BusError>
    where
        I: IntoIterator<Item = E>,
        E: Into<String>,
        F: Fn(Value, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BinderError>> + Send + 'static,
    {
        let error = ErrorSlot::default();
        let pending: Pending = Arc::default();

        let bus_handler = {
            let error = error.clone();
            let pending = Arc::clone(&pending);
            Handler::new(move |event, payload| {
                let Ok(runtime) = Handle::try_current() else {
                    error.set(BinderError::NoRuntime {
                        event: event.to_string(),
                    });
                    return Ok(Value::Null);
                };

                let future = handler(payload.clone(), event.to_string());
                let slot = error.clone();
                let name = event.to_string();
                let task = runtime.spawn(async move {
                    match future.await {
                        Ok(()) => slot.clear(),
                        Err(e) => {
                            debug!(event = %name, error = %e, "Async handler rejected");
                            slot.set(e);
                        }
                    }
                });
                pending.lock().push((event.to_string(), task));
                Ok(Value::Null)
            })
        };

        let events = events.into_iter().map(Into::into).collect();
        let binding = Binding::mount(scope, tag, events, bus_handler)?;

        Ok(Self {
            error,
            pending,
            binding,
        })
    }

    /// Wait for every spawned handler to finish.
    ///
    /// Tasks spawned while waiting are awaited too.
    pub async fn settled(&self) {
        loop {
            let tasks: Vec<_> = std::mem::take(&mut *self.pending.lock());
            if tasks.is_empty() {
                return;
            }
            for (event, task) in tasks {
                if let Err(e) = task.await {
                    self.error.set(BinderError::Task {
                        event,
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    /// Number of spawned handlers not yet awaited by `settled`.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.pending
            .lock()
            .iter()
            .filter(|(_, task)| !task.is_finished())
            .count()
    }

    /// A function that emits `event` with `transform(args)` as payload.
    pub fn trigger<T>(&self, event: &str, transform: T) -> Trigger
    where
        T: Fn(Value) -> Value + Send + Sync + 'static,
    {
        Trigger::new(&self.binding.bus, event, transform, &self.error)
    }

    /// Last rejection, if the most recent settlement failed.
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

    /// Unsubscribe the handler. Already-spawned tasks keep running.
    pub fn unbind(&self) {
        self.binding.unmount();
    }
}

impl fmt::Debug for PromiseBinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromiseBinder")
            .field("events", &self.binding.events)
            .field("error", &self.error.get())
            .finish()
    }
}
