use super::{DerivedState, Recompute};
use hooks_bus::{BusError, BusScope};
use serde_json::{Map, Value};

/// Arbitrary record state for composite binders.
pub type Record = Map<String, Value>;

impl DerivedState<Record> {
    /// Bind a composite reducer `(previous, payload, event) -> partial`.
    ///
    /// Unlike the other variants the returned record is shallow-merged into
    /// the previous one: keys it returns are replaced, keys it omits are
    /// kept.
    ///
    /// # Errors
    ///
    /// - `BusError::ScopeClosed` - the scope was torn down
    /// - `BusError::InvalidEventName` - an event name is empty or padded
    pub fn composite<I, E, R>(
        scope: &BusScope,
        tag: &str,
        events: I,
        initial: Record,
        reducer: R,
    ) -> Result<Self, BusError>
    where
        I: IntoIterator<Item = E>,
        E: Into<String>,
        R: Fn(&Record, &Value, &str) -> Recompute<Record> + Send + Sync + 'static,
    {
        Self::bind(scope, tag, events, initial, move |prev, payload, event| {
            let partial = reducer(prev, payload, event)?;
            let mut next = prev.clone();
            next.extend(partial);
            Ok(next)
        })
    }

    /// Value of one field of the record.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<Value> {
        self.with_state(|record| record.get(key).cloned())
    }
}
