//! # Hooks Bus - Scoped Event Bus for UI Components
//!
//! Lets components in one tree talk to each other without prop-drilling.
//!
//! ## Model
//!
//! ```text
//! ┌──────────────┐                         ┌──────────────┐
//! │  Consumer A  │                         │  Consumer B  │
//! │ fires: save  │    emit("save", data)   │ subs: save   │
//! │              │ ──────┐                 │              │
//! └──────────────┘       │                 └──────────────┘
//!                        ▼                         ↑
//!                  ┌──────────────┐                │
//!                  │   BusScope   │                │
//!                  │ (registry)   │ ───────────────┘
//!                  └──────────────┘   handler(data)
//! ```
//!
//! - A `BusScope` owns one `EventRegistry` for the lifetime of a provider.
//! - An `EventBus` is one consumer's binding: declared `subscribes`/`fires`
//!   sets plus its own `BusStats`.
//! - `on` / `off` / `emit` are synchronous; handlers run in registration
//!   order; a failing handler aborts the rest of that emit.
//!
//! ## Request Signals
//!
//! `request:started`, `request:ended`, `request:aborted` and `cleanup` are
//! the naming convention for request lifecycles (see `signals`).

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod bus;
pub mod capabilities;
pub mod diagnostics;
pub mod error;
pub mod registry;
pub mod scope;
pub mod signals;
pub mod stats;
pub mod stream;

// Re-export main types
pub use bus::EventBus;
pub use capabilities::Capabilities;
pub use diagnostics::DiagnosticsCollector;
pub use error::{BusError, HandlerError};
pub use registry::{EventRegistry, Handler, HandlerResult, Removal};
pub use scope::{BusObserver, BusScope, Rejection};
pub use signals::{
    AbortHandle, Metadata, Primitive, RequestOutcome, RequestSignal, RequestTracker, CLEANUP,
    REQUEST_ABORTED, REQUEST_ENDED, REQUEST_EVENTS, REQUEST_STARTED,
};
pub use stats::{BusStats, FiredRecord, StatsHandle, SubscribedRecord};
pub use stream::{EventStream, SubscriptionError};

/// Payload type carried by every event.
pub use serde_json::Value as Payload;
