//! Error types for binders and storage.

use hooks_bus::{BusError, HandlerError};
use thiserror::Error;

/// Failure captured in a binder's `error` slot.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BinderError {
    /// The reducer (or async handler) reported a failure.
    #[error("Reducer failed: {0}")]
    Reducer(String),

    /// The payload did not have the shape the reducer expects.
    #[error("Unexpected payload: {0}")]
    Payload(String),

    /// Another handler failed while this binder's trigger was emitting.
    #[error("Handler for `{event}` failed: {source}")]
    Handler {
        event: String,
        #[source]
        source: HandlerError,
    },

    /// An async handler fired outside a tokio runtime.
    #[error("No async runtime available for `{event}`")]
    NoRuntime { event: String },

    /// An async handler task panicked or was cancelled.
    #[error("Async task for `{event}` did not complete: {message}")]
    Task { event: String, message: String },
}

impl BinderError {
    /// Build a reducer failure from any displayable value.
    pub fn reducer(message: impl std::fmt::Display) -> Self {
        Self::Reducer(message.to_string())
    }
}

impl From<BusError> for BinderError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::Handler { event, source } => Self::Handler { event, source },
            other => Self::Reducer(other.to_string()),
        }
    }
}

/// Errors reported by storage drivers and encryptors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The driver has no room for the value.
    #[error("Storage quota exceeded writing `{key}` ({needed} bytes, {available} available)")]
    QuotaExceeded {
        key: String,
        needed: usize,
        available: usize,
    },

    /// The driver refused access.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// The value could not be serialized.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Encryption or decryption failed.
    #[error("Encryption failed: {0}")]
    Encryption(String),
}
