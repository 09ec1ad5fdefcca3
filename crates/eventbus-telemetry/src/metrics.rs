//! Prometheus metrics for the integration event bus.
//!
//! All metrics follow the naming convention: `eventbus_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., messages_published_total)
//! - **Gauge**: Value that can go up or down (e.g., active_subscriptions)
//! - **Histogram**: Distribution of values (e.g., dispatch_duration_seconds)

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry,
    TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // PUBLISH SIDE
    // =========================================================================

    /// Messages sent to the topic
    pub static ref MESSAGES_PUBLISHED: CounterVec = CounterVec::new(
        Opts::new("eventbus_messages_published_total", "Messages published to the topic"),
        &["event_name"]
    ).expect("metric creation failed");

    // =========================================================================
    // RECEIVE SIDE
    // =========================================================================

    /// Messages pulled from a subscription
    pub static ref MESSAGES_RECEIVED: CounterVec = CounterVec::new(
        Opts::new("eventbus_messages_received_total", "Messages received from subscriptions"),
        &["event_name"]
    ).expect("metric creation failed");

    /// Messages acknowledged after successful dispatch
    pub static ref MESSAGES_COMPLETED: CounterVec = CounterVec::new(
        Opts::new("eventbus_messages_completed_total", "Messages completed after dispatch"),
        &["event_name"]
    ).expect("metric creation failed");

    /// Messages returned to the broker for redelivery
    pub static ref MESSAGES_ABANDONED: CounterVec = CounterVec::new(
        Opts::new("eventbus_messages_abandoned_total", "Messages abandoned for redelivery"),
        &["event_name", "reason"]  // reason: unrouted/handler_failed/timeout/decode
    ).expect("metric creation failed");

    /// Handler failures surfaced to the exception hook
    pub static ref HANDLER_FAILURES: CounterVec = CounterVec::new(
        Opts::new("eventbus_handler_failures_total", "Dispatch failures by event"),
        &["event_name"]
    ).expect("metric creation failed");

    /// Event names with a live receive pump
    pub static ref ACTIVE_SUBSCRIPTIONS: Gauge = Gauge::new(
        "eventbus_active_subscriptions",
        "Number of event names with an active subscription"
    ).expect("metric creation failed");

    /// Time spent dispatching one message to all bound handlers
    pub static ref DISPATCH_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "eventbus_dispatch_duration_seconds",
            "Time spent dispatching a message to its handlers"
        ).buckets(exponential_buckets(0.0005, 2.0, 14).expect("bucket layout"))
    ).expect("metric creation failed");
}

/// Handle proving the bus metrics are registered.
#[derive(Debug, Clone)]
pub struct MetricsHandle {
    registry: Registry,
}

impl MetricsHandle {
    /// Registry holding the bus metrics.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// Register all bus metrics with the global registry.
///
/// Calling this more than once is harmless.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(MESSAGES_PUBLISHED.clone()),
        Box::new(MESSAGES_RECEIVED.clone()),
        Box::new(MESSAGES_COMPLETED.clone()),
        Box::new(MESSAGES_ABANDONED.clone()),
        Box::new(HANDLER_FAILURES.clone()),
        Box::new(ACTIVE_SUBSCRIPTIONS.clone()),
        Box::new(DISPATCH_DURATION.clone()),
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

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics_twice() {
        register_metrics().unwrap();
        register_metrics().unwrap();
    }

    #[test]
    fn test_counter_increment() {
        MESSAGES_PUBLISHED.with_label_values(&["MetricsProbe"]).inc();
        assert!(MESSAGES_PUBLISHED.with_label_values(&["MetricsProbe"]).get() >= 1.0);
    }

    #[test]
    fn test_encode_contains_bus_metrics() {
        register_metrics().unwrap();
        MESSAGES_ABANDONED
            .with_label_values(&["EncodeProbe", "handler_failed"])
            .inc();

        let text = encode_metrics().unwrap();
        assert!(text.contains("eventbus_messages_abandoned_total"));
        assert!(text.contains("EncodeProbe"));
    }

    #[test]
    fn test_histogram_timer() {
        let before = DISPATCH_DURATION.get_sample_count();
        {
            let _timer = time_histogram!(DISPATCH_DURATION);
        }
        assert!(DISPATCH_DURATION.get_sample_count() > before);
    }
}
