//! # Bus Statistics
//!
//! Per-consumer counters and last-seen records. Used for diagnostics and
//! tests, never for control flow.

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

/// Most recent firing of one event by a consumer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FiredRecord {
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Tag of the consumer that fired the event.
    pub name: String,
    /// Payload of the firing.
    pub data: Value,
}

/// Most recent subscription to one event by a consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscribedRecord {
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Tag of the consumer that subscribed.
    pub name: String,
}

/// Counters owned by exactly one consumer binding.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BusStats {
    /// Last firing per event name.
    pub events_fired: BTreeMap<String, FiredRecord>,
    /// One increment per successful handler invocation caused by an emit.
    pub events_fired_count: u64,
    /// Last subscription per event name.
    pub events_subscribed: BTreeMap<String, SubscribedRecord>,
    /// One increment per successful `on()` call.
    pub events_subscribed_count: u64,
}

impl BusStats {
    /// Record one successful handler invocation.
    pub fn record_fired(&mut self, event: &str, consumer: &str, data: &Value) {
        self.events_fired.insert(
            event.to_string(),
            FiredRecord {
                timestamp: now_millis(),
                name: consumer.to_string(),
                data: data.clone(),
            },
        );
        self.events_fired_count += 1;
    }

    /// Record one successful subscription.
    pub fn record_subscribed(&mut self, event: &str, consumer: &str) {
        self.events_subscribed.insert(
            event.to_string(),
            SubscribedRecord {
                timestamp: now_millis(),
                name: consumer.to_string(),
            },
        );
        self.events_subscribed_count += 1;
    }

    /// Last firing of an event, if any.
    #[must_use]
    pub fn last_fired(&self, event: &str) -> Option<&FiredRecord> {
        self.events_fired.get(event)
    }
}

/// Read-only, non-owning view of a consumer's stats.
///
/// Becomes dead once the consumer (and every clone of it) is dropped.
#[derive(Debug, Clone)]
pub struct StatsHandle {
    tag: String,
    stats: Weak<RwLock<BusStats>>,
}

impl StatsHandle {
    pub(crate) fn new(tag: &str, stats: &Arc<RwLock<BusStats>>) -> Self {
        Self {
            tag: tag.to_string(),
            stats: Arc::downgrade(stats),
        }
    }

    /// Tag of the consumer.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Copy of the current stats, or `None` if the consumer is gone.
    #[must_use]
    pub fn snapshot(&self) -> Option<BusStats> {
        self.stats.upgrade().map(|s| s.read().clone())
    }

    /// Whether the consumer is still alive.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.stats.strong_count() > 0
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
