//! Composed resilience pipeline
//!
//! Layers, outer to inner: concurrency admission (once per call), retry loop,
//! then per attempt a circuit breaker admission and a deadline around the
//! operation. Breaker admission is taken before the deadline starts, and the
//! deadline's verdict is reported back to the breaker, so a timed-out attempt
//! counts as a breaker failure while caller cancellation does not.

pub mod service;

pub use service::{ResilienceLayer, ResilienceService};

use crate::circuit_breaker::{
    CircuitBreaker, CircuitBreakerMetrics, CircuitState, HealthSnapshot, StateListener,
};
use crate::clock::{Clock, SystemClock};
use crate::concurrency::{AcquireError, ConcurrencyLimiter};
use crate::config::PipelineConfig;
use crate::error::{CallError, Result};
use crate::metrics;
use crate::outcome::{Outcome, Retryable};
use crate::retry::RetryPolicy;
use crate::timeout::{Interrupted, TimeoutGuard};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

/// Resilience pipeline protecting one downstream dependency.
///
/// Built once and shared; all mutable state lives inside the breaker and the
/// limiter.
#[derive(Debug)]
pub struct Pipeline {
    name: String,
    config: PipelineConfig,
    limiter: ConcurrencyLimiter,
    retry: RetryPolicy,
    timeout: TimeoutGuard,
    breaker: Arc<CircuitBreaker>,
}

/// Point-in-time view of a pipeline, for status output
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub time_in_state_ms: u64,
    pub in_flight: usize,
    pub queued: usize,
    pub health: HealthSnapshot,
    pub metrics: CircuitBreakerMetrics,
}

impl Pipeline {
    /// Validate `config` and build a pipeline driven by the system clock
    pub fn new(name: impl Into<String>, config: PipelineConfig) -> Result<Self> {
        Self::with_clock(name, config, Arc::new(SystemClock))
    }

    /// Validate `config` and build a pipeline with an injected breaker clock
    pub fn with_clock(
        name: impl Into<String>,
        config: PipelineConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let name = name.into();
        config.validate(&name)?;
        Ok(Self::build(name, config, clock))
    }

    /// Build from an already validated config
    pub(crate) fn build(name: String, config: PipelineConfig, clock: Arc<dyn Clock>) -> Self {
        info!(
            pipeline = %name,
            max_concurrency = config.concurrency.max_concurrency,
            max_retry_attempts = config.retry.max_retry_attempts,
            per_attempt_timeout_ms = config.timeout.per_attempt_timeout_ms,
            "Creating resilience pipeline"
        );

        let breaker = Arc::new(CircuitBreaker::with_clock(
            name.clone(),
            config.circuit_breaker.clone(),
            clock,
        ));

        Self {
            limiter: ConcurrencyLimiter::from_config(name.clone(), &config.concurrency),
            retry: RetryPolicy::new(config.retry.clone()),
            timeout: TimeoutGuard::from_config(&config.timeout),
            breaker,
            config,
            name,
        }
    }

    /// Run `op` through every layer, classifying its errors with [`Retryable`].
    ///
    /// `op` is invoked once per attempt with a token that is cancelled when the
    /// attempt's deadline passes or `cancel` fires.
    pub async fn execute<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        op: F,
    ) -> std::result::Result<T, CallError<E>>
    where
        F: Fn(CancellationToken) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Retryable,
    {
        self.execute_with_predicate(cancel, op, |e: &E| e.is_retryable())
            .await
    }

    /// Run `op` through every layer, classifying its errors with `should_retry`
    pub async fn execute_with_predicate<T, E, F, Fut, P>(
        &self,
        cancel: &CancellationToken,
        op: F,
        should_retry: P,
    ) -> std::result::Result<T, CallError<E>>
    where
        F: Fn(CancellationToken) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let span = info_span!(
            "resilience_call",
            pipeline = %self.name,
            call_id = %Uuid::new_v4()
        );

        self.run(cancel, &op, &should_retry)
            .instrument(span)
            .await
            .into_result()
    }

    async fn run<T, E, F, Fut, P>(
        &self,
        cancel: &CancellationToken,
        op: &F,
        should_retry: &P,
    ) -> Outcome<T, E>
    where
        F: Fn(CancellationToken) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let start = Instant::now();

        let outcome = match self.limiter.acquire(cancel).await {
            Ok(_lease) => {
                self.retry
                    .execute(cancel, move |attempt| {
                        self.attempt(cancel, op, should_retry, attempt)
                    })
                    .await
            }
            Err(AcquireError::Rejected) => {
                metrics::record_concurrency_rejected(&self.name);
                Outcome::ConcurrencyRejected
            }
            Err(AcquireError::Cancelled) => Outcome::Cancelled,
        };

        let elapsed = start.elapsed();
        metrics::record_call_outcome(&self.name, outcome.kind(), elapsed.as_secs_f64());
        debug!(
            outcome = outcome.kind(),
            duration_ms = elapsed.as_millis() as u64,
            "Call finished"
        );

        outcome
    }

    async fn attempt<T, E, F, Fut, P>(
        &self,
        cancel: &CancellationToken,
        op: &F,
        should_retry: &P,
        attempt: u32,
    ) -> Outcome<T, E>
    where
        F: Fn(CancellationToken) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        metrics::record_retry_attempt(&self.name, attempt);

        let Some(permit) = self.breaker.try_acquire() else {
            return Outcome::CircuitOpen;
        };

        match self.timeout.execute(cancel, |token| op(token)).await {
            Ok(Ok(value)) => {
                permit.on_success();
                Outcome::Success(value)
            }
            Ok(Err(e)) => {
                permit.on_failure();
                Outcome::from_error(e, should_retry)
            }
            Err(Interrupted::TimedOut(timeout)) => {
                permit.on_timeout();
                Outcome::TimedOut(timeout)
            }
            Err(Interrupted::Cancelled) => {
                permit.release();
                Outcome::Cancelled
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn timeout_guard(&self) -> &TimeoutGuard {
        &self.timeout
    }

    /// Current breaker state
    pub fn state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Force the breaker closed and clear its sampling window
    pub fn reset_circuit_breaker(&self) {
        self.breaker.reset();
    }

    /// Register a breaker state change subscriber
    pub fn subscribe(&self, listener: StateListener) {
        self.breaker.subscribe(listener);
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            name: self.name.clone(),
            state: self.breaker.state(),
            time_in_state_ms: self.breaker.time_in_state().as_millis() as u64,
            in_flight: self.limiter.in_flight(),
            queued: self.limiter.queued(),
            health: self.breaker.health(),
            metrics: self.breaker.metrics(),
        }
    }
}
