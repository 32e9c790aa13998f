use super::types::{BackoffType, RetryConfig};
use backoff::{backoff::Backoff, ExponentialBackoff, ExponentialBackoffBuilder};
use rand::Rng;
use std::time::Duration;

/// Jitter range applied to each delay: factor in [1 - J, 1 + J)
const JITTER_SPREAD: f64 = 0.5;

/// Delay schedule for one retry sequence
#[derive(Debug)]
pub enum BackoffSchedule {
    Linear(LinearBackoff),
    Exponential(ExponentialBackoff),
}

impl BackoffSchedule {
    pub fn from_config(config: &RetryConfig) -> Self {
        match config.backoff_type {
            BackoffType::Linear => BackoffSchedule::Linear(LinearBackoff::new(
                config.base_delay(),
                config.max_delay(),
                config.jitter,
            )),
            BackoffType::Exponential => {
                let randomization_factor = if config.jitter { JITTER_SPREAD } else { 0.0 };
                BackoffSchedule::Exponential(
                    ExponentialBackoffBuilder::new()
                        .with_initial_interval(config.base_delay())
                        .with_max_interval(config.max_delay())
                        .with_multiplier(2.0)
                        .with_randomization_factor(randomization_factor)
                        .with_max_elapsed_time(None) // attempts are bounded by the policy
                        .build(),
                )
            }
        }
    }
}

impl Backoff for BackoffSchedule {
    fn reset(&mut self) {
        match self {
            BackoffSchedule::Linear(b) => b.reset(),
            BackoffSchedule::Exponential(b) => b.reset(),
        }
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        match self {
            BackoffSchedule::Linear(b) => b.next_backoff(),
            BackoffSchedule::Exponential(b) => b.next_backoff(),
        }
    }
}

/// Linearly growing delay: `base * n` for the n-th retry, capped at `max`
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    base: Duration,
    max: Duration,
    jitter: bool,
    attempt: u32,
}

impl LinearBackoff {
    pub fn new(base: Duration, max: Duration, jitter: bool) -> Self {
        Self {
            base,
            max,
            jitter,
            attempt: 0,
        }
    }
}

impl Backoff for LinearBackoff {
    fn reset(&mut self) {
        self.attempt = 0;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        self.attempt = self.attempt.saturating_add(1);
        let delay = self.base.saturating_mul(self.attempt).min(self.max);

        if self.jitter {
            let factor = rand::thread_rng().gen_range((1.0 - JITTER_SPREAD)..(1.0 + JITTER_SPREAD));
            Some(delay.mul_f64(factor))
        } else {
            Some(delay)
        }
    }
}
