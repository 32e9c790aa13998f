use crate::error::{BulwarkError, Result};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use tracing::{debug, info};

/// Metrics service exposing pipeline metrics in Prometheus format
#[derive(Clone)]
pub struct MetricsService {
    handle: Arc<PrometheusHandle>,
}

impl MetricsService {
    /// Install the global Prometheus recorder.
    ///
    /// Fails if a recorder is already installed in this process.
    pub fn new() -> Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            BulwarkError::Internal(format!("Failed to install metrics recorder: {}", e))
        })?;

        Self::register_metrics();

        info!("Metrics service initialized successfully");

        Ok(Self {
            handle: Arc::new(handle),
        })
    }

    /// Register all metrics with descriptions
    fn register_metrics() {
        // Call metrics
        describe_counter!(
            "bulwark_calls_total",
            "Total number of protected calls, by final outcome"
        );
        describe_histogram!(
            "bulwark_call_duration_seconds",
            "End-to-end duration of protected calls in seconds, retries included"
        );
        describe_counter!(
            "bulwark_retry_attempts_total",
            "Total number of retry attempts after a failed first attempt"
        );

        // Circuit breaker metrics
        describe_gauge!(
            "bulwark_circuit_breaker_state",
            "Circuit breaker state (0 = closed, 1 = open, 2 = half-open)"
        );
        describe_counter!(
            "bulwark_circuit_breaker_transitions_total",
            "Total number of circuit breaker state transitions"
        );

        // Admission metrics
        describe_counter!(
            "bulwark_concurrency_rejected_total",
            "Total number of calls rejected because the wait queue was full"
        );
        describe_gauge!(
            "bulwark_in_flight",
            "Number of operations currently holding a concurrency slot"
        );

        debug!("All metrics registered with descriptions");
    }

    /// Get the Prometheus metrics handle
    pub fn handle(&self) -> Arc<PrometheusHandle> {
        self.handle.clone()
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Record the final outcome of a protected call
pub fn record_call_outcome(pipeline: &str, outcome: &str, duration: f64) {
    let labels = [
        ("pipeline", pipeline.to_string()),
        ("outcome", outcome.to_string()),
    ];

    counter!("bulwark_calls_total", &labels).increment(1);
    histogram!("bulwark_call_duration_seconds", &labels).record(duration);
}

/// Record one retry (attempt number 2 or later)
pub fn record_retry_attempt(pipeline: &str, attempt: u32) {
    if attempt < 2 {
        return;
    }
    let labels = [("pipeline", pipeline.to_string())];
    counter!("bulwark_retry_attempts_total", &labels).increment(1);
}

/// Record circuit breaker state
/// State: 0 = Closed, 1 = Open, 2 = HalfOpen
pub fn record_circuit_breaker_state(pipeline: &str, state: u8) {
    let labels = [("pipeline", pipeline.to_string())];
    gauge!("bulwark_circuit_breaker_state", &labels).set(state as f64);
}

/// Record circuit breaker transition
pub fn record_circuit_breaker_transition(pipeline: &str, from_state: &str, to_state: &str) {
    let labels = [
        ("pipeline", pipeline.to_string()),
        ("from", from_state.to_string()),
        ("to", to_state.to_string()),
    ];
    counter!("bulwark_circuit_breaker_transitions_total", &labels).increment(1);
}

/// Record a call turned away by the concurrency limiter
pub fn record_concurrency_rejected(pipeline: &str) {
    let labels = [("pipeline", pipeline.to_string())];
    counter!("bulwark_concurrency_rejected_total", &labels).increment(1);
}

/// Record the number of held concurrency slots
pub fn record_in_flight(pipeline: &str, count: usize) {
    let labels = [("pipeline", pipeline.to_string())];
    gauge!("bulwark_in_flight", &labels).set(count as f64);
}
