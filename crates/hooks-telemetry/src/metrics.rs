//! Prometheus metrics for bus activity.
//!
//! All metrics follow the naming convention: `hooks_bus_<metric>_total`
//!
//! The bus crate has no metrics dependency. Counters are fed by a
//! `MetricsObserver` installed on each scope with `BusScope::set_observer`.

use hooks_bus::{BusObserver, Rejection};
use lazy_static::lazy_static;
use prometheus::{CounterVec, Encoder, Opts, Registry, TextEncoder};

use crate::TelemetryError;

lazy_static! {
    /// Metrics registry for this crate
    pub static ref REGISTRY: Registry = Registry::new();

    /// Emit calls that passed the capability check
    pub static ref EVENTS_EMITTED: CounterVec = CounterVec::new(
        Opts::new("hooks_bus_events_emitted_total", "Emits that reached the registry"),
        &["event"]
    ).expect("metric creation failed");

    /// Successful handler invocations (one per handler per emit)
    pub static ref HANDLER_INVOCATIONS: CounterVec = CounterVec::new(
        Opts::new("hooks_bus_handler_invocations_total", "Handlers invoked successfully"),
        &["event"]
    ).expect("metric creation failed");

    /// Handlers that returned an error and aborted an emit
    pub static ref HANDLER_FAILURES: CounterVec = CounterVec::new(
        Opts::new("hooks_bus_handler_failures_total", "Handlers that failed during emit"),
        &["event"]
    ).expect("metric creation failed");

    /// Successful `on()` registrations
    pub static ref SUBSCRIPTIONS: CounterVec = CounterVec::new(
        Opts::new("hooks_bus_subscriptions_total", "Handlers registered"),
        &["event"]
    ).expect("metric creation failed");

    /// Operations refused by a capability check or a closed scope
    pub static ref REJECTED_CHECKS: CounterVec = CounterVec::new(
        Opts::new("hooks_bus_rejected_total", "Operations refused by capability checks"),
        &["reason"]  // reason: subscribe/fire/closed
    ).expect("metric creation failed");
}

/// Handle to the registered metrics.
#[derive(Clone)]
pub struct MetricsHandle {
    registry: Registry,
}

impl MetricsHandle {
    /// Encode all metrics as Prometheus text format.
    ///
    /// # Errors
    ///
    /// - `TelemetryError::MetricsInit` - encoding failed
    pub fn gather(&self) -> Result<String, TelemetryError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
    }
}

/// Register all metrics with the crate registry.
///
/// Calling this more than once is harmless.
///
/// # Errors
///
/// - `TelemetryError::MetricsInit` - a metric could not be registered
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(EVENTS_EMITTED.clone()),
        Box::new(HANDLER_INVOCATIONS.clone()),
        Box::new(HANDLER_FAILURES.clone()),
        Box::new(SUBSCRIPTIONS.clone()),
        Box::new(REJECTED_CHECKS.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        registry: REGISTRY.clone(),
    })
}

/// `BusObserver` that feeds the Prometheus counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsObserver;

impl BusObserver for MetricsObserver {
    fn subscribed(&self, event: &str, _consumer: &str) {
        SUBSCRIPTIONS.with_label_values(&[event]).inc();
    }

    fn emitted(&self, event: &str, _consumer: &str, handlers: usize) {
        EVENTS_EMITTED.with_label_values(&[event]).inc();
        HANDLER_INVOCATIONS
            .with_label_values(&[event])
            .inc_by(handlers as f64);
    }

    fn handler_failed(&self, event: &str, _consumer: &str) {
        HANDLER_FAILURES.with_label_values(&[event]).inc();
    }

    fn rejected(&self, _event: &str, _consumer: &str, reason: Rejection) {
        REJECTED_CHECKS.with_label_values(&[reason.as_str()]).inc();
    }
}
