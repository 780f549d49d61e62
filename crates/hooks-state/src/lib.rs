//! # Hooks State - Derived and Shared State for UI Components
//!
//! State primitives built on the `hooks-bus` event bus.
//!
//! ## Binders
//!
//! A binder folds bus events into local state through a reducer. Each
//! binder owns one consumer on the scope, subscribes one handler to its
//! events and removes exactly that handler when unbound or dropped.
//!
//! | Binder | State | Reducer result |
//! |--------|-------|----------------|
//! | `DerivedState::list` | `Vec<T>` | replaces |
//! | `DerivedState::count` | `i64` | replaces |
//! | `DerivedState::composite` | `Record` | shallow-merged |
//! | `PromiseBinder` | none | async, sets `error` |
//!
//! Reducer failures never escape: they land in the binder's `error` slot
//! and the last good state is kept.
//!
//! ## Shared State
//!
//! `SharedStateBox` is a bus-independent record with slice-scoped
//! subscriptions and optional persistence through a `StorageAccessor`.
//!
//! ## Helpers
//!
//! - `storage`: failure-tolerant JSON key/value access with an encryption seam
//! - `filter`: text matching and a debounced remote query
//! - `route`: history transitions bridged onto `route:*` events

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod binder;
pub mod error;
pub mod filter;
pub mod route;
pub mod shared;
pub mod storage;

pub use binder::{
    decode, CountOptions, DerivedState, ErrorSlot, PromiseBinder, Recompute, Record, Trigger,
};
pub use error::{BinderError, StorageError};
pub use filter::{DebounceConfig, DebouncedQuery, FilterOptions, MatchMode, RemoteSource, TextFilter};
pub use route::{
    Action, Blocker, History, Listener, Location, MemoryHistory, RouteGuard, RouteMonitor,
    Unregister, ROUTE_BLOCKED, ROUTE_CHANGED,
};
pub use shared::{
    Dispatch, SharedStateBox, SharedStateOptions, StateCallback, StateSubscription, SubscriptionId,
};
pub use storage::{Encryptor, MemoryStorage, StorageAccessor, StorageDriver};
