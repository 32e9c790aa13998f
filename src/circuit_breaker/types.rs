use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally
    Closed,
    /// Circuit is open, requests are rejected
    Open,
    /// Circuit is half-open, allowing a single probe request
    HalfOpen,
}

impl CircuitState {
    /// Numeric encoding used by the state gauge
    pub fn as_gauge(&self) -> u8 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "Closed"),
            CircuitState::Open => write!(f, "Open"),
            CircuitState::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Fraction of failed calls in the sampling window that opens the circuit
    #[serde(default = "default_failure_ratio_threshold")]
    pub failure_ratio_threshold: f64,

    /// Minimum number of sampled calls before the ratio is evaluated
    #[serde(default = "default_minimum_throughput")]
    pub minimum_throughput: u32,

    /// Length of the rolling sampling window in milliseconds
    #[serde(default = "default_sampling_duration_ms")]
    pub sampling_duration_ms: u64,

    /// Time the circuit stays open before a probe is allowed, in milliseconds
    #[serde(default = "default_break_duration_ms")]
    pub break_duration_ms: u64,

    /// Number of buckets the sampling window is divided into
    #[serde(default = "default_window_buckets")]
    pub window_buckets: u32,
}

fn default_failure_ratio_threshold() -> f64 {
    0.5
}

fn default_minimum_throughput() -> u32 {
    10
}

fn default_sampling_duration_ms() -> u64 {
    30_000
}

fn default_break_duration_ms() -> u64 {
    5_000
}

fn default_window_buckets() -> u32 {
    10
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_ratio_threshold: default_failure_ratio_threshold(),
            minimum_throughput: default_minimum_throughput(),
            sampling_duration_ms: default_sampling_duration_ms(),
            break_duration_ms: default_break_duration_ms(),
            window_buckets: default_window_buckets(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn sampling_duration(&self) -> Duration {
        Duration::from_millis(self.sampling_duration_ms)
    }

    pub fn break_duration(&self) -> Duration {
        Duration::from_millis(self.break_duration_ms)
    }
}

/// Circuit breaker metrics
#[derive(Debug, Clone, Default, Serialize)]
pub struct CircuitBreakerMetrics {
    /// Total number of admitted requests
    pub total_requests: u64,
    /// Number of successful requests
    pub successful_requests: u64,
    /// Number of failed requests (timeouts included)
    pub failed_requests: u64,
    /// Number of requests rejected (circuit open or probe in flight)
    pub rejected_requests: u64,
    /// Number of timeouts
    pub timeout_count: u64,
    /// Number of times circuit opened
    pub circuit_opened_count: u64,
    /// Number of times circuit closed
    pub circuit_closed_count: u64,
    /// Number of times circuit half-opened
    pub circuit_half_opened_count: u64,
}

/// A single state change, delivered to subscribers
#[derive(Debug, Clone)]
pub struct StateTransition {
    /// Name of the breaker that changed state
    pub breaker: String,
    pub from: CircuitState,
    pub to: CircuitState,
    /// Instant of the change according to the breaker's clock
    pub at: Instant,
    /// Wall-clock time the change was observed
    pub timestamp: DateTime<Utc>,
}

/// Subscriber invoked on every state transition
pub type StateListener = Arc<dyn Fn(&StateTransition) + Send + Sync>;
