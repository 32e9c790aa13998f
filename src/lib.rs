//! Resilience pipeline for calls to downstream dependencies: concurrency
//! admission, retries with backoff, per-attempt deadlines and a circuit
//! breaker, composed in that order.

pub mod circuit_breaker;
pub mod clock;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod metrics;
pub mod observability;
pub mod outcome;
pub mod pipeline;
pub mod registry;
pub mod retry;
pub mod timeout;

pub use crate::circuit_breaker::{CircuitBreaker, CircuitState, StateTransition};
pub use crate::config::{BulwarkConfig, PipelineConfig};
pub use crate::error::{BulwarkError, CallError, DependencyError, Result};
pub use crate::outcome::{Outcome, Retryable};
pub use crate::pipeline::{Pipeline, ResilienceLayer};
pub use crate::registry::PipelineRegistry;

use crate::metrics::MetricsService;
use tracing::info;

/// Validate `config`, install the metrics recorder if enabled, and build a
/// registry with a pipeline for every configured dependency.
pub fn init_registry(config: BulwarkConfig) -> Result<(PipelineRegistry, Option<MetricsService>)> {
    config.validate()?;

    let metrics = if config.metrics.enabled {
        Some(MetricsService::new()?)
    } else {
        None
    };

    let registry = PipelineRegistry::new(config)?;
    registry.init_configured();

    info!(
        dependencies = registry.names().len(),
        metrics = metrics.is_some(),
        "Resilience registry ready"
    );

    Ok((registry, metrics))
}
