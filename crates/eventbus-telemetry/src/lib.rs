//! # Event Bus Telemetry
//!
//! Observability for the integration event bus.
//!
//! ## Components
//!
//! - **Logs**: `tracing` events through a `tracing-subscriber` registry
//!   (pretty console output in development, JSON in containers)
//! - **Metrics**: Prometheus counters, gauges and histograms for publish,
//!   receive, completion and dispatch latency
//!
//! ## Usage
//!
//! ```rust,ignore
//! use eventbus_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     let config = TelemetryConfig::from_env();
//!     let _guard = init_telemetry(&config).expect("Failed to init telemetry");
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `EVENTBUS_SERVICE_NAME` | `eventbus` | Service name in logs |
//! | `EVENTBUS_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `EVENTBUS_JSON_LOGS` | `false` (`true` in containers) | JSON log lines |
//! | `EVENTBUS_CONSOLE_OUTPUT` | `true` | Emit logs at all |

#![cfg_attr(test, allow(clippy::unwrap_used))]

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::{env_filter, init_logging, StructuredLogger};
pub use metrics::{
    encode_metrics, register_metrics, MetricsHandle, ACTIVE_SUBSCRIPTIONS, DISPATCH_DURATION,
    HANDLER_FAILURES, MESSAGES_ABANDONED, MESSAGES_COMPLETED, MESSAGES_PUBLISHED,
    MESSAGES_RECEIVED,
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

/// Initialize logging and metrics.
///
/// Returns a guard to hold for the lifetime of the application.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    if config.service_name.trim().is_empty() {
        return Err(TelemetryError::Config(
            "service name must not be empty".to_string(),
        ));
    }

    // Metrics first: they never depend on logging.
    let metrics = register_metrics()?;
    let logger = init_logging(config)?;

    Ok(TelemetryGuard {
        service_name: config.service_name.clone(),
        _logger: logger,
        metrics,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    service_name: String,
    _logger: StructuredLogger,
    metrics: MetricsHandle,
}

impl TelemetryGuard {
    /// Registered metrics.
    pub fn metrics(&self) -> &MetricsHandle {
        &self.metrics
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "Shutting down telemetry...");
    }
}

/// Convenience macro for creating a span with event bus context.
///
/// # Example
///
/// ```rust,ignore
/// use eventbus_telemetry::bus_span;
///
/// let _span = bus_span!("dispatch", event_name = "OrderCreated").entered();
/// ```
#[macro_export]
macro_rules! bus_span {
    ($name:expr, $($field:tt)*) => {
        tracing::info_span!($name, $($field)*)
    };
}

/// Convenience macro for recording a metric increment.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}

/// Convenience macro for recording a metric with a value.
#[macro_export]
macro_rules! metric_observe {
    ($metric:expr, $value:expr) => {
        $metric.observe($value)
    };
    ($metric:expr, $labels:expr, $value:expr) => {
        $metric.with_label_values($labels).observe($value)
    };
}
