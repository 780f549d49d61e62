//! # Event Streams
//!
//! Async view of one event: a forwarding handler pushes every payload into
//! an unbounded channel that is read as a `Stream`.

use crate::bus::EventBus;
use crate::registry::Handler;
use serde_json::Value;
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tracing::debug;

/// Errors from stream operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The consumer may not subscribe to this event.
    #[error("Subscription to `{event}` was rejected")]
    Rejected { event: String },

    /// The scope was torn down and no payload is queued.
    #[error("Event stream closed")]
    Closed,
}

/// Stream of payloads emitted for one event.
///
/// When dropped, only the forwarding handler is removed; other handlers on
/// the same consumer or event are left alone.
pub struct EventStream {
    bus: EventBus,
    handler: Handler,
    event: String,
    receiver: mpsc::UnboundedReceiver<Value>,
}

impl EventStream {
    /// Subscribe to `event` through `bus`.
    ///
    /// # Errors
    ///
    /// - `SubscriptionError::Rejected` - `on()` refused the event
    pub fn open(bus: &EventBus, event: &str) -> Result<Self, SubscriptionError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handler = Handler::new(move |_, payload| {
            // A closed receiver means the stream is being dropped.
            let _ = sender.send(payload.clone());
            Ok(Value::Null)
        });

        if !bus.on(event, &handler) {
            return Err(SubscriptionError::Rejected {
                event: event.to_string(),
            });
        }

        Ok(Self {
            bus: bus.clone(),
            handler,
            event: event.to_string(),
            receiver,
        })
    }

    /// Receive the next payload.
    ///
    /// Returns `None` once the scope is torn down and the queue is drained.
    pub async fn recv(&mut self) -> Option<Value> {
        std::future::poll_fn(|cx| self.poll_payload(cx)).await
    }

    /// Receive a payload without waiting.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(payload))` - A payload was queued
    /// - `Ok(None)` - Nothing queued yet
    /// - `Err(SubscriptionError::Closed)` - The scope is torn down
    pub fn try_recv(&mut self) -> Result<Option<Value>, SubscriptionError> {
        match self.receiver.try_recv() {
            Ok(payload) => Ok(Some(payload)),
            Err(mpsc::error::TryRecvError::Empty) if self.bus.scope().is_closed() => {
                Err(SubscriptionError::Closed)
            }
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(SubscriptionError::Closed),
        }
    }

    /// Event this stream follows.
    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }

    fn poll_payload(&mut self, cx: &mut Context<'_>) -> Poll<Option<Value>> {
        match self.receiver.poll_recv(cx) {
            // Nothing can be emitted into a torn-down scope.
            Poll::Pending if self.bus.scope().is_closed() => Poll::Ready(None),
            other => other,
        }
    }
}

impl Stream for EventStream {
    type Item = Value;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.poll_payload(cx)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        let removal = self.bus.scope().remove(&self.event, &self.handler);
        debug!(
            event = %self.event,
            consumer = %self.bus.tag(),
            removal = ?removal,
            "Event stream dropped"
        );
    }
}
