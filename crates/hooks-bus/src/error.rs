//! # Bus Errors
//!
//! Error types shared by the registry, the scope and bus consumers.

use thiserror::Error;

/// Error returned by a subscribed handler.
///
/// Cloneable so that binders can keep the last failure in an `error` slot
/// while the original value is still propagated out of `emit`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    /// Create a handler error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Errors from bus operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The bus scope was torn down; no new consumers may bind to it.
    #[error("Bus scope {scope} is closed")]
    ScopeClosed { scope: String },

    /// An event name in a capability declaration is empty or padded.
    #[error("Invalid event name {name:?}")]
    InvalidEventName { name: String },

    /// A handler failed while an event was being emitted.
    ///
    /// Handlers registered after the failing one were not invoked.
    #[error("Handler for event `{event}` failed: {source}")]
    Handler {
        event: String,
        #[source]
        source: HandlerError,
    },
}

impl BusError {
    /// The handler error carried by this error, if any.
    #[must_use]
    pub fn handler_error(&self) -> Option<&HandlerError> {
        match self {
            Self::Handler { source, .. } => Some(source),
            _ => None,
        }
    }
}
