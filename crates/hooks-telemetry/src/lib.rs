//! # Hooks Telemetry
//!
//! Logging and metrics for applications built on the hooks crates.
//!
//! ## Components
//!
//! - **Logging**: `tracing-subscriber` with an `EnvFilter` and a pretty or
//!   JSON console layer
//! - **Metrics**: Prometheus counters for bus activity, fed by a
//!   `MetricsObserver` installed on each `BusScope`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hooks_telemetry::{init_telemetry, MetricsObserver, TelemetryConfig};
//!
//! let telemetry = init_telemetry(&TelemetryConfig::from_env())?;
//! let scope = hooks_bus::BusScope::new();
//! scope.set_observer(std::sync::Arc::new(MetricsObserver));
//!
//! // ...
//! println!("{}", telemetry.metrics().gather()?);
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `HOOKS_SERVICE_NAME` | `ui-hooks` | Service name in logs |
//! | `HOOKS_LOG_LEVEL` | `info` | Log filter (falls back to `RUST_LOG`) |
//! | `HOOKS_CONSOLE_OUTPUT` | `true` | Write logs to the console |
//! | `HOOKS_JSON_LOGS` | `false` | JSON instead of pretty logs |

mod config;
mod logging;
mod metrics;

pub use config::TelemetryConfig;
pub use logging::{env_filter, init_logging};
pub use metrics::{
    register_metrics, MetricsHandle, MetricsObserver, EVENTS_EMITTED, HANDLER_FAILURES,
    HANDLER_INVOCATIONS, REJECTED_CHECKS, SUBSCRIPTIONS,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Register metrics and install the global subscriber.
///
/// # Errors
///
/// Any error from `register_metrics` or `init_logging`.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    // Metrics first so nothing is missed once logging is up
    let metrics = register_metrics()?;
    init_logging(config)?;

    Ok(TelemetryGuard {
        metrics,
        service_name: config.service_name.clone(),
    })
}

/// Keeps telemetry handles for the lifetime of the application.
pub struct TelemetryGuard {
    metrics: MetricsHandle,
    service_name: String,
}

impl TelemetryGuard {
    /// The registered metrics.
    #[must_use]
    pub fn metrics(&self) -> &MetricsHandle {
        &self.metrics
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "Shutting down telemetry");
    }
}
