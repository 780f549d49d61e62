use super::{DerivedState, Recompute};
use hooks_bus::{BusError, BusScope};
use serde_json::Value;
use tracing::debug;

/// Options for a counter binder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CountOptions {
    /// Initial value.
    pub start: i64,
    /// Reserved lower bound. Not enforced; reducers clamp if they need to.
    pub min: Option<i64>,
    /// Reserved upper bound. Not enforced; reducers clamp if they need to.
    pub max: Option<i64>,
}

impl CountOptions {
    /// Options starting at `start` with no bounds.
    #[must_use]
    pub fn starting_at(start: i64) -> Self {
        Self {
            start,
            ..Self::default()
        }
    }
}

impl DerivedState<i64> {
    /// Bind a counter reducer `(previous, payload) -> next` to `events`.
    ///
    /// # Errors
    ///
    /// - `BusError::ScopeClosed` - the scope was torn down
    /// - `BusError::InvalidEventName` - an event name is empty or padded
    pub fn count<I, E, R>(
        scope: &BusScope,
        tag: &str,
        events: I,
        options: CountOptions,
        reducer: R,
    ) -> Result<Self, BusError>
    where
        I: IntoIterator<Item = E>,
        E: Into<String>,
        R: Fn(i64, &Value) -> Recompute<i64> + Send + Sync + 'static,
    {
        if options.min.is_some() || options.max.is_some() {
            debug!(
                consumer = %tag,
                min = ?options.min,
                max = ?options.max,
                "Counter bounds are recorded but not enforced"
            );
        }
        Self::bind(scope, tag, events, options.start, move |prev, payload, _| {
            reducer(*prev, payload)
        })
    }
}
