use super::{DerivedState, Recompute};
use hooks_bus::{BusError, BusScope};
use serde_json::Value;

impl<T> DerivedState<Vec<T>>
where
    T: Clone + Send + Sync + 'static,
{
    /// Bind a list reducer `(previous, payload) -> next` to `events`.
    ///
    /// The returned list replaces the previous one. No deduplication.
    ///
    /// # Errors
    ///
    /// - `BusError::ScopeClosed` - the scope was torn down
    /// - `BusError::InvalidEventName` - an event name is empty or padded
    pub fn list<I, E, R>(
        scope: &BusScope,
        tag: &str,
        events: I,
        initial: Vec<T>,
        reducer: R,
    ) -> Result<Self, BusError>
    where
        I: IntoIterator<Item = E>,
        E: Into<String>,
        R: Fn(&[T], &Value) -> Recompute<Vec<T>> + Send + Sync + 'static,
    {
        Self::bind(scope, tag, events, initial, move |prev, payload, _| {
            reducer(prev, payload)
        })
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.with_state(Vec::len)
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.with_state(Vec::is_empty)
    }
}
