//! # Capability Declarations
//!
//! Each consumer declares, at bind time, the events it may listen to
//! (`subscribes`) and the events it may emit (`fires`). The sets are fixed
//! for the lifetime of the binding.

use crate::error::BusError;
use std::collections::BTreeSet;

/// Declared `subscribes` / `fires` sets for one consumer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    subscribes: BTreeSet<String>,
    fires: BTreeSet<String>,
}

impl Capabilities {
    /// Empty declaration: the consumer can neither listen nor emit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add events the consumer may listen to.
    #[must_use]
    pub fn subscribes<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subscribes.extend(events.into_iter().map(Into::into));
        self
    }

    /// Add events the consumer may emit.
    #[must_use]
    pub fn fires<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fires.extend(events.into_iter().map(Into::into));
        self
    }

    /// Add events the consumer may both listen to and emit.
    #[must_use]
    pub fn both<I, S>(self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let events: Vec<String> = events.into_iter().map(Into::into).collect();
        self.subscribes(events.clone()).fires(events)
    }

    /// Whether `event` is in the `subscribes` set.
    #[must_use]
    pub fn can_subscribe(&self, event: &str) -> bool {
        self.subscribes.contains(event)
    }

    /// Whether `event` is in the `fires` set.
    #[must_use]
    pub fn can_fire(&self, event: &str) -> bool {
        self.fires.contains(event)
    }

    /// Declared `subscribes` set.
    pub fn subscribed(&self) -> impl Iterator<Item = &str> {
        self.subscribes.iter().map(String::as_str)
    }

    /// Declared `fires` set.
    pub fn fired(&self) -> impl Iterator<Item = &str> {
        self.fires.iter().map(String::as_str)
    }

    /// Reject empty names and names with surrounding whitespace.
    ///
    /// # Errors
    ///
    /// - `BusError::InvalidEventName` for the first offending name
    pub fn validate(&self) -> Result<(), BusError> {
        for name in self.subscribes.iter().chain(self.fires.iter()) {
            if name.is_empty() || name.trim() != name {
                return Err(BusError::InvalidEventName { name: name.clone() });
            }
        }
        Ok(())
    }
}
