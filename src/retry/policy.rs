use super::schedule::BackoffSchedule;
use super::types::RetryConfig;
use crate::error::CallError;
use crate::outcome::Outcome;
use backoff::backoff::Backoff;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Retry loop with linear or exponential backoff.
///
/// Immutable after construction and shared read-only across calls; each
/// call gets its own backoff schedule.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a new retry policy
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Upper bound on attempts, first attempt included
    pub fn max_attempts(&self) -> u32 {
        self.config.max_retry_attempts.saturating_add(1)
    }

    /// Fresh delay schedule for one call
    pub fn backoff(&self) -> BackoffSchedule {
        BackoffSchedule::from_config(&self.config)
    }

    /// Run `attempt` until it produces a non-retryable outcome or the retry
    /// budget is spent.
    ///
    /// `attempt` receives the 1-based attempt number. Only transient failures
    /// and timeouts are retried. Cancellation of `cancel` is checked before
    /// every attempt and interrupts any backoff wait, yielding
    /// [`Outcome::Cancelled`]. When retries are exhausted the last outcome is
    /// returned unchanged.
    pub async fn execute<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut attempt: F,
    ) -> Outcome<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Outcome<T, E>>,
    {
        let mut backoff = self.backoff();
        let mut attempt_number = 0;

        loop {
            if cancel.is_cancelled() {
                debug!(attempt = attempt_number, "Cancelled before attempt");
                return Outcome::Cancelled;
            }

            attempt_number += 1;
            debug!(
                attempt = attempt_number,
                max_retries = self.config.max_retry_attempts,
                "Executing attempt"
            );

            let outcome = attempt(attempt_number).await;

            if !outcome.is_retryable() {
                if outcome.is_success() {
                    if attempt_number > 1 {
                        debug!(attempt = attempt_number, "Request succeeded after retries");
                    }
                } else {
                    debug!(
                        attempt = attempt_number,
                        outcome = outcome.kind(),
                        "Outcome not retryable"
                    );
                }
                return outcome;
            }

            if attempt_number > self.config.max_retry_attempts {
                warn!(
                    attempt = attempt_number,
                    max_retries = self.config.max_retry_attempts,
                    outcome = outcome.kind(),
                    "Request failed after max retries"
                );
                return outcome;
            }

            let wait = backoff
                .next_backoff()
                .unwrap_or_else(|| self.config.max_delay());
            debug!(
                attempt = attempt_number,
                wait_ms = wait.as_millis() as u64,
                outcome = outcome.kind(),
                "Attempt failed, retrying after backoff"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(attempt = attempt_number, "Cancelled during backoff");
                    return Outcome::Cancelled;
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Retry a plain fallible operation, classifying errors with `should_retry`
    pub async fn execute_with_predicate<T, E, F, Fut, P>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
        should_retry: P,
    ) -> Result<T, CallError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let should_retry = &should_retry;

        self.execute(cancel, |_| {
            let fut = op();
            async move { Outcome::classify(fut.await, should_retry) }
        })
        .await
        .into_result()
    }
}
