//! # Request Lifecycle Signals
//!
//! Event names and payload shape that data-fetching collaborators emit so
//! that any bus scope can track request lifecycles. The bus treats these
//! names like any other event.
//!
//! ## Lifecycle
//!
//! ```text
//! request:started ──► (future resolves) ──► request:ended ──► cleanup
//!        │
//!        └──────────► (abort)          ──► request:aborted ──► cleanup
//! ```

use crate::bus::EventBus;
use crate::capabilities::Capabilities;
use crate::error::BusError;
use crate::scope::BusScope;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// A request was sent.
pub const REQUEST_STARTED: &str = "request:started";

/// A request finished, successfully or not.
pub const REQUEST_ENDED: &str = "request:ended";

/// A request was aborted before it finished.
pub const REQUEST_ABORTED: &str = "request:aborted";

/// Emitted last for every tracked request.
pub const CLEANUP: &str = "cleanup";

/// All request lifecycle event names.
pub const REQUEST_EVENTS: [&str; 4] = [REQUEST_STARTED, REQUEST_ENDED, REQUEST_ABORTED, CLEANUP];

/// Primitive metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Primitive {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<bool> for Primitive {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Primitive {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Primitive {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Primitive {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Primitive {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Metadata attached to every lifecycle signal of one request.
pub type Metadata = BTreeMap<String, Primitive>;

/// Payload of a lifecycle signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSignal {
    /// Response body on success, `null` otherwise.
    pub success: Option<Value>,
    /// Error message on failure, `null` otherwise.
    pub error: Option<String>,
    /// Caller-supplied request metadata.
    pub metadata: Metadata,
}

impl RequestSignal {
    /// Signal with neither success nor error.
    #[must_use]
    pub fn pending(metadata: Metadata) -> Self {
        Self {
            success: None,
            error: None,
            metadata,
        }
    }

    /// Signal for a successful request.
    #[must_use]
    pub fn succeeded(body: Value, metadata: Metadata) -> Self {
        Self {
            success: Some(body),
            error: None,
            metadata,
        }
    }

    /// Signal for a failed request, normalized to `{success: null, error}`.
    #[must_use]
    pub fn failed(error: impl Display, metadata: Metadata) -> Self {
        Self {
            success: None,
            error: Some(error.to_string()),
            metadata,
        }
    }

    /// Convert to a bus payload.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Parse a bus payload back into a signal.
    #[must_use]
    pub fn from_payload(payload: &Value) -> Option<Self> {
        serde_json::from_value(payload.clone()).ok()
    }
}

/// How a tracked request finished.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    /// The future resolved with a body.
    Succeeded(Value),
    /// The future resolved with an error.
    Failed(String),
    /// The request was aborted first.
    Aborted,
}

/// Cancels a tracked request.
///
/// Clones control the same request.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    /// Create a handle that has not been aborted.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Abort the request.
    pub fn abort(&self) {
        self.sender.send_replace(true);
    }

    /// Whether `abort()` has been called.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        *self.sender.borrow()
    }

    async fn aborted(&self) {
        let mut receiver = self.sender.subscribe();
        let closed = receiver.wait_for(|aborted| *aborted).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }
}

impl Default for AbortHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Emits request lifecycle signals around a future.
#[derive(Debug, Clone)]
pub struct RequestTracker {
    bus: EventBus,
}

impl RequestTracker {
    /// Bind a tracker that fires the four lifecycle events.
    ///
    /// # Errors
    ///
    /// - `BusError::ScopeClosed` - the scope was torn down
    pub fn bind(scope: &BusScope, tag: impl Into<String>) -> Result<Self, BusError> {
        let bus = EventBus::bind(scope, tag, Capabilities::new().fires(REQUEST_EVENTS))?;
        Ok(Self { bus })
    }

    /// The tracker's bus binding.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Run `request`, emitting `request:started`, then `request:ended` or
    /// `request:aborted`, then `cleanup`.
    ///
    /// Failures of the future are captured in the outcome and the
    /// `request:ended` payload; they never escape as errors. Handler errors
    /// raised while signalling are logged and do not affect the request.
    pub async fn track<F, E>(
        &self,
        metadata: Metadata,
        abort: Option<&AbortHandle>,
        request: F,
    ) -> RequestOutcome
    where
        F: Future<Output = Result<Value, E>>,
        E: Display,
    {
        self.signal(REQUEST_STARTED, &RequestSignal::pending(metadata.clone()));

        let outcome = match abort {
            Some(handle) if handle.is_aborted() => RequestOutcome::Aborted,
            Some(handle) => {
                tokio::select! {
                    biased;
                    () = handle.aborted() => RequestOutcome::Aborted,
                    result = request => Self::settle(result),
                }
            }
            None => Self::settle(request.await),
        };

        match &outcome {
            RequestOutcome::Succeeded(body) => {
                self.signal(
                    REQUEST_ENDED,
                    &RequestSignal::succeeded(body.clone(), metadata.clone()),
                );
            }
            RequestOutcome::Failed(error) => {
                self.signal(REQUEST_ENDED, &RequestSignal::failed(error, metadata.clone()));
            }
            RequestOutcome::Aborted => {
                self.signal(REQUEST_ABORTED, &RequestSignal::pending(metadata.clone()));
            }
        }
        self.signal(CLEANUP, &RequestSignal::pending(metadata));

        outcome
    }

    fn settle<E: Display>(result: Result<Value, E>) -> RequestOutcome {
        match result {
            Ok(body) => RequestOutcome::Succeeded(body),
            Err(e) => RequestOutcome::Failed(e.to_string()),
        }
    }

    fn signal(&self, event: &str, signal: &RequestSignal) {
        match self.bus.emit(event, signal.to_payload()) {
            Ok(results) => {
                debug!(event = %event, consumer = %self.bus.tag(), handlers = results.len(), "Request signal emitted");
            }
            Err(e) => {
                warn!(event = %event, consumer = %self.bus.tag(), error = %e, "Request signal handler failed");
            }
        }
    }
}
