//! # Diagnostics Collector
//!
//! Explicit registry of consumer stats handles. Consumers opt in with
//! `EventBus::with_diagnostics`; the collector never keeps a consumer alive.

use crate::stats::{BusStats, StatsHandle};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// Collects `StatsHandle`s for inspection by tests and debug tooling.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsCollector {
    handles: Arc<RwLock<Vec<StatsHandle>>>,
}

impl DiagnosticsCollector {
    /// Create an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a consumer's stats.
    pub fn register(&self, handle: StatsHandle) {
        debug!(consumer = %handle.tag(), "Stats handle registered");
        self.handles.write().push(handle);
    }

    /// Stats of every live consumer, in registration order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, BusStats)> {
        self.handles
            .read()
            .iter()
            .filter_map(|h| h.snapshot().map(|s| (h.tag().to_string(), s)))
            .collect()
    }

    /// Stats of the first live consumer with the given tag.
    #[must_use]
    pub fn find(&self, tag: &str) -> Option<BusStats> {
        self.handles
            .read()
            .iter()
            .filter(|h| h.tag() == tag)
            .find_map(StatsHandle::snapshot)
    }

    /// Sum of `events_fired_count` over live consumers.
    #[must_use]
    pub fn total_fired(&self) -> u64 {
        self.snapshot().iter().map(|(_, s)| s.events_fired_count).sum()
    }

    /// Sum of `events_subscribed_count` over live consumers.
    #[must_use]
    pub fn total_subscribed(&self) -> u64 {
        self.snapshot()
            .iter()
            .map(|(_, s)| s.events_subscribed_count)
            .sum()
    }

    /// Drop handles whose consumer is gone. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let mut handles = self.handles.write();
        let before = handles.len();
        handles.retain(StatsHandle::is_alive);
        before - handles.len()
    }

    /// Number of tracked handles, live or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.read().len()
    }

    /// Whether no handle is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.read().is_empty()
    }
}
