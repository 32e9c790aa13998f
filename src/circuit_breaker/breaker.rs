use super::types::{
    CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState, StateListener, StateTransition,
};
use super::window::{HealthSnapshot, SlidingWindowCounter};
use crate::clock::{Clock, SystemClock};
use crate::error::CallError;
use crate::metrics;
use crate::outcome::Retryable;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Circuit breaker for a single downstream dependency.
///
/// All state lives behind one mutex so that every transition is linearizable;
/// the open-to-half-open check is made lazily when a call asks for admission.
pub struct CircuitBreaker {
    /// Dependency identifier
    name: String,
    /// Configuration
    config: CircuitBreakerConfig,
    /// Time source
    clock: Arc<dyn Clock>,
    /// Current state
    state: Mutex<State>,
    /// State change subscribers
    listeners: RwLock<Vec<StateListener>>,
}

#[derive(Debug)]
struct State {
    /// Current circuit state
    circuit_state: CircuitState,
    /// Time of the last transition
    last_state_change: Instant,
    /// Outcomes sampled while closed
    window: SlidingWindowCounter,
    /// Whether the half-open probe slot is taken
    probe_in_flight: bool,
    /// Bumped on every transition; permits from older generations are stale
    generation: u64,
    /// Metrics
    metrics: CircuitBreakerMetrics,
}

#[derive(Debug, Clone, Copy)]
enum Completion {
    Success,
    Failure { timed_out: bool },
    Released,
}

/// Admission granted by [`CircuitBreaker::try_acquire`].
///
/// Complete it with exactly one of `on_success`, `on_failure`, `on_timeout`
/// or `release`. A permit dropped without completion is released.
#[must_use = "a permit must be completed with its call outcome"]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    probe: bool,
    completed: bool,
}

impl CallPermit<'_> {
    /// Whether this permit is the half-open probe
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn on_success(mut self) {
        self.complete(Completion::Success);
    }

    pub fn on_failure(mut self) {
        self.complete(Completion::Failure { timed_out: false });
    }

    /// Attempt exceeded its deadline; counted as a failure
    pub fn on_timeout(mut self) {
        self.complete(Completion::Failure { timed_out: true });
    }

    /// Give the admission back without recording an outcome (caller cancellation)
    pub fn release(mut self) {
        self.complete(Completion::Released);
    }

    fn complete(&mut self, completion: Completion) {
        self.completed = true;
        self.breaker.complete(self.generation, self.probe, completion);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.breaker.complete(self.generation, self.probe, Completion::Released);
        }
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker driven by the system clock
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::with_clock(name, config, Arc::new(SystemClock))
    }

    /// Create a new circuit breaker with an injected clock
    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let name = name.into();
        info!(
            breaker = %name,
            failure_ratio_threshold = config.failure_ratio_threshold,
            minimum_throughput = config.minimum_throughput,
            sampling_duration_ms = config.sampling_duration_ms,
            break_duration_ms = config.break_duration_ms,
            "Creating circuit breaker"
        );

        let now = clock.now();
        let window = SlidingWindowCounter::new(config.sampling_duration(), config.window_buckets);

        Self {
            config,
            clock,
            state: Mutex::new(State {
                circuit_state: CircuitState::Closed,
                last_state_change: now,
                window,
                probe_in_flight: false,
                generation: 0,
                metrics: CircuitBreakerMetrics::default(),
            }),
            listeners: RwLock::new(Vec::new()),
            name,
        }
    }

    /// Ask for admission of one call.
    ///
    /// Returns `None` when the circuit is open and the break duration has not
    /// elapsed, or when the half-open probe slot is already taken.
    pub fn try_acquire(&self) -> Option<CallPermit<'_>> {
        let now = self.clock.now();
        let mut transition = None;

        let admitted = {
            let mut state = self.state.lock();

            match state.circuit_state {
                CircuitState::Closed => {
                    state.metrics.total_requests += 1;
                    Some((state.generation, false))
                }
                CircuitState::Open => {
                    let elapsed = now.saturating_duration_since(state.last_state_change);
                    if elapsed >= self.config.break_duration() {
                        transition = Some(self.transition(&mut state, CircuitState::HalfOpen, now));
                        state.probe_in_flight = true;
                        state.metrics.total_requests += 1;
                        debug!(breaker = %self.name, "Allowing half-open probe request");
                        Some((state.generation, true))
                    } else {
                        state.metrics.rejected_requests += 1;
                        debug!(
                            breaker = %self.name,
                            time_remaining = ?self.config.break_duration() - elapsed,
                            "Circuit breaker open, rejecting request"
                        );
                        None
                    }
                }
                CircuitState::HalfOpen => {
                    if state.probe_in_flight {
                        state.metrics.rejected_requests += 1;
                        debug!(breaker = %self.name, "Probe already in flight, rejecting");
                        None
                    } else {
                        state.probe_in_flight = true;
                        state.metrics.total_requests += 1;
                        debug!(breaker = %self.name, "Allowing half-open probe request");
                        Some((state.generation, true))
                    }
                }
            }
        };

        if let Some(transition) = transition {
            self.notify(transition);
        }

        admitted.map(|(generation, probe)| CallPermit {
            breaker: self,
            generation,
            probe,
            completed: false,
        })
    }

    /// Run `op` under the breaker: reject fast when open, otherwise record
    /// the outcome. Errors are classified through [`Retryable`].
    pub async fn execute<T, E, F, Fut>(&self, op: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable,
    {
        let permit = self.try_acquire().ok_or(CallError::CircuitOpen)?;

        match op().await {
            Ok(value) => {
                permit.on_success();
                Ok(value)
            }
            Err(e) => {
                permit.on_failure();
                if e.is_retryable() {
                    Err(CallError::Transient(e))
                } else {
                    Err(CallError::Permanent(e))
                }
            }
        }
    }

    /// Force the circuit closed and clear the sampling window
    pub fn reset(&self) {
        let now = self.clock.now();

        let transition = {
            let mut state = self.state.lock();
            if state.circuit_state == CircuitState::Closed {
                state.window.clear();
                None
            } else {
                Some(self.transition(&mut state, CircuitState::Closed, now))
            }
        };

        info!(breaker = %self.name, "Circuit breaker manually reset");

        if let Some(transition) = transition {
            self.notify(transition);
        }
    }

    /// Force the circuit open; it half-opens again after the break duration
    pub fn trip(&self) {
        let now = self.clock.now();

        let transition = {
            let mut state = self.state.lock();
            if state.circuit_state == CircuitState::Open {
                None
            } else {
                Some(self.transition(&mut state, CircuitState::Open, now))
            }
        };

        warn!(breaker = %self.name, "Circuit breaker manually tripped");

        if let Some(transition) = transition {
            self.notify(transition);
        }
    }

    /// Register a state change subscriber
    pub fn subscribe(&self, listener: StateListener) {
        self.listeners.write().push(listener);
    }

    /// Get current state
    pub fn state(&self) -> CircuitState {
        self.state.lock().circuit_state
    }

    /// Get metrics
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        self.state.lock().metrics.clone()
    }

    /// Outcomes currently inside the sampling window
    pub fn health(&self) -> HealthSnapshot {
        let now = self.clock.now();
        self.state.lock().window.health(now)
    }

    /// Time since the last state transition
    pub fn time_in_state(&self) -> Duration {
        let now = self.clock.now();
        now.saturating_duration_since(self.state.lock().last_state_change)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn complete(&self, generation: u64, probe: bool, completion: Completion) {
        let now = self.clock.now();
        let mut transition = None;

        {
            let mut state = self.state.lock();
            let current = state.generation == generation;

            match completion {
                Completion::Released => {
                    if probe && current && state.circuit_state == CircuitState::HalfOpen {
                        state.probe_in_flight = false;
                        debug!(breaker = %self.name, "Half-open probe released without outcome");
                    }
                }
                Completion::Success => {
                    state.metrics.successful_requests += 1;

                    if !current {
                        debug!(breaker = %self.name, "Ignoring success from earlier state");
                    } else {
                        match state.circuit_state {
                            CircuitState::Closed => state.window.record_success(now),
                            CircuitState::HalfOpen if probe => {
                                debug!(breaker = %self.name, "Half-open probe request succeeded");
                                transition =
                                    Some(self.transition(&mut state, CircuitState::Closed, now));
                            }
                            _ => {}
                        }
                    }
                }
                Completion::Failure { timed_out } => {
                    state.metrics.failed_requests += 1;
                    if timed_out {
                        state.metrics.timeout_count += 1;
                    }

                    if !current {
                        debug!(breaker = %self.name, "Ignoring failure from earlier state");
                    } else {
                        match state.circuit_state {
                            CircuitState::Closed => {
                                state.window.record_failure(now);
                                let health = state.window.health(now);

                                debug!(
                                    breaker = %self.name,
                                    failures = health.failures,
                                    total = health.total,
                                    failure_ratio = health.failure_ratio,
                                    "Request failed in closed state"
                                );

                                if health.total >= u64::from(self.config.minimum_throughput)
                                    && health.failure_ratio >= self.config.failure_ratio_threshold
                                {
                                    transition =
                                        Some(self.transition(&mut state, CircuitState::Open, now));
                                }
                            }
                            CircuitState::HalfOpen if probe => {
                                warn!(
                                    breaker = %self.name,
                                    "Half-open probe request failed, reopening circuit"
                                );
                                transition =
                                    Some(self.transition(&mut state, CircuitState::Open, now));
                            }
                            _ => {}
                        }
                    }
                }
            }
        }

        if let Some(transition) = transition {
            self.notify(transition);
        }
    }

    /// Move to `to`; caller holds the state lock
    fn transition(&self, state: &mut State, to: CircuitState, now: Instant) -> StateTransition {
        let from = state.circuit_state;

        state.circuit_state = to;
        state.last_state_change = now;
        state.generation += 1;
        state.probe_in_flight = false;

        match to {
            CircuitState::Open => {
                state.metrics.circuit_opened_count += 1;
                warn!(breaker = %self.name, from = %from, "Circuit breaker opening");
            }
            CircuitState::HalfOpen => {
                state.metrics.circuit_half_opened_count += 1;
                info!(
                    breaker = %self.name,
                    break_duration = ?self.config.break_duration(),
                    "Circuit breaker transitioning to half-open"
                );
            }
            CircuitState::Closed => {
                state.window.clear();
                state.metrics.circuit_closed_count += 1;
                info!(breaker = %self.name, from = %from, "Circuit breaker closing");
            }
        }

        StateTransition {
            breaker: self.name.clone(),
            from,
            to,
            at: now,
            timestamp: Utc::now(),
        }
    }

    /// Publish a transition; runs outside the state lock
    fn notify(&self, transition: StateTransition) {
        metrics::record_circuit_breaker_transition(
            &self.name,
            &transition.from.to_string(),
            &transition.to.to_string(),
        );
        metrics::record_circuit_breaker_state(&self.name, transition.to.as_gauge());

        let listeners = self.listeners.read().clone();
        for listener in listeners.iter() {
            listener(&transition);
        }
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}
