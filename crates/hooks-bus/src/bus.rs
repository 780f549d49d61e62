//! # Event Bus
//!
//! The pub/sub facade a consumer uses: `on` / `off` / `emit`, checked
//! against the consumer's declared capabilities and recorded in its own
//! `BusStats`.
//!
//! ## Dispatch
//!
//! ```text
//! emit(event, data)
//!   │
//!   ├─ event ∉ fires ──────────────► no-op, Ok([])
//!   │
//!   └─ snapshot handlers(event)
//!        │
//!        ├─ h1(event, data) ─ Ok(v1) ─► stats +1
//!        ├─ h2(event, data) ─ Err(e) ─► abort, Err(Handler)
//!        └─ h3 (not invoked)
//! ```
//!
//! All calls are synchronous. No lock is held while a handler runs, so a
//! handler may itself emit or subscribe.

use crate::capabilities::Capabilities;
use crate::diagnostics::DiagnosticsCollector;
use crate::error::BusError;
use crate::registry::{Handler, Removal};
use crate::scope::{BusScope, Rejection};
use crate::stats::{BusStats, StatsHandle};
use parking_lot::RwLock;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// One consumer's binding to a bus scope.
///
/// Clones refer to the same binding and share its stats.
#[derive(Clone)]
pub struct EventBus {
    scope: BusScope,
    tag: Arc<str>,
    capabilities: Arc<Capabilities>,
    stats: Arc<RwLock<BusStats>>,
}

impl EventBus {
    /// Bind a consumer to a scope.
    ///
    /// Every name in `subscribes` becomes a known event of the scope, which
    /// lets consumers that did not declare it still subscribe to it later.
    ///
    /// # Errors
    ///
    /// - `BusError::ScopeClosed` - the scope was torn down
    /// - `BusError::InvalidEventName` - a declared name is empty or padded
    pub fn bind(
        scope: &BusScope,
        tag: impl Into<String>,
        capabilities: Capabilities,
    ) -> Result<Self, BusError> {
        let tag: String = tag.into();

        if scope.is_closed() {
            return Err(BusError::ScopeClosed {
                scope: scope.label().to_string(),
            });
        }
        capabilities.validate()?;

        for event in capabilities.subscribed() {
            scope.declare(event);
        }

        debug!(
            scope = %scope.label(),
            consumer = %tag,
            subscribes = ?capabilities.subscribed().collect::<Vec<_>>(),
            fires = ?capabilities.fired().collect::<Vec<_>>(),
            "Consumer bound"
        );

        Ok(Self {
            scope: scope.clone(),
            tag: Arc::from(tag),
            capabilities: Arc::new(capabilities),
            stats: Arc::new(RwLock::new(BusStats::default())),
        })
    }

    /// Register this consumer's stats with a diagnostics collector.
    #[must_use]
    pub fn with_diagnostics(self, collector: &DiagnosticsCollector) -> Self {
        collector.register(self.stats_handle());
        self
    }

    /// Register `handler` for `event`.
    ///
    /// Returns `false` without registering when the event is neither in this
    /// consumer's `subscribes` set nor already known to the scope, or when
    /// the scope is closed.
    pub fn on(&self, event: &str, handler: &Handler) -> bool {
        if self.scope.is_closed() {
            self.reject(event, Rejection::Closed);
            return false;
        }
        if !self.capabilities.can_subscribe(event) && !self.scope.is_known(event) {
            self.reject(event, Rejection::Subscribe);
            return false;
        }

        self.scope.register(event, handler.clone());
        self.stats.write().record_subscribed(event, &self.tag);

        if let Some(observer) = self.scope.observer() {
            observer.subscribed(event, &self.tag);
        }
        debug!(event = %event, consumer = %self.tag, handler = handler.id(), "Handler subscribed");
        true
    }

    /// Remove `handler` from every event in this consumer's `subscribes` set.
    ///
    /// Under an event where the handler is not registered, that event's whole
    /// handler list is cleared.
    pub fn off(&self, handler: &Handler) {
        for event in self.capabilities.subscribed() {
            match self.scope.remove(event, handler) {
                Removal::Removed(count) => {
                    debug!(event = %event, consumer = %self.tag, count, "Handler unsubscribed");
                }
                Removal::Cleared(count) if count > 0 => {
                    warn!(
                        event = %event,
                        consumer = %self.tag,
                        cleared = count,
                        "Handler not registered; cleared event handler list"
                    );
                }
                Removal::Cleared(_) | Removal::Unknown => {}
            }
        }
    }

    /// Invoke every handler for `event`, in registration order.
    ///
    /// Returns each handler's return value. Emitting an event outside the
    /// `fires` set is a silent no-op returning an empty list.
    ///
    /// # Errors
    ///
    /// - `BusError::Handler` - a handler failed; later handlers did not run
    pub fn emit(&self, event: &str, data: Value) -> Result<Vec<Value>, BusError> {
        if self.scope.is_closed() {
            self.reject(event, Rejection::Closed);
            return Ok(Vec::new());
        }
        if !self.capabilities.can_fire(event) {
            self.reject(event, Rejection::Fire);
            return Ok(Vec::new());
        }

        let handlers = self.scope.handlers(event);
        let observer = self.scope.observer();
        let mut results = Vec::with_capacity(handlers.len());

        for handler in &handlers {
            match handler.call(event, &data) {
                Ok(value) => {
                    self.stats.write().record_fired(event, &self.tag, &data);
                    results.push(value);
                }
                Err(source) => {
                    if let Some(observer) = &observer {
                        observer.handler_failed(event, &self.tag);
                        observer.emitted(event, &self.tag, results.len());
                    }
                    debug!(
                        event = %event,
                        consumer = %self.tag,
                        handler = handler.id(),
                        error = %source,
                        "Handler failed, aborting emit"
                    );
                    return Err(BusError::Handler {
                        event: event.to_string(),
                        source,
                    });
                }
            }
        }

        if let Some(observer) = &observer {
            observer.emitted(event, &self.tag, results.len());
        }
        Ok(results)
    }

    /// Copy of this consumer's stats.
    #[must_use]
    pub fn stats(&self) -> BusStats {
        self.stats.read().clone()
    }

    /// Non-owning handle to this consumer's stats.
    #[must_use]
    pub fn stats_handle(&self) -> StatsHandle {
        StatsHandle::new(&self.tag, &self.stats)
    }

    /// Consumer tag.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Declared capabilities.
    #[must_use]
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Scope this consumer is bound to.
    #[must_use]
    pub fn scope(&self) -> &BusScope {
        &self.scope
    }

    fn reject(&self, event: &str, reason: Rejection) {
        if let Some(observer) = self.scope.observer() {
            observer.rejected(event, &self.tag, reason);
        }
        debug!(
            event = %event,
            consumer = %self.tag,
            reason = reason.as_str(),
            "Bus operation rejected"
        );
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("tag", &self.tag)
            .field("scope", &self.scope.label())
            .field("capabilities", &self.capabilities)
            .finish()
    }
}
