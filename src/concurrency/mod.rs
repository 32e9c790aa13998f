use crate::metrics;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Concurrency limiter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Maximum number of operations in flight
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Maximum number of callers waiting for a slot
    #[serde(default = "default_max_queue_length")]
    pub max_queue_length: usize,
}

fn default_max_concurrency() -> usize {
    64
}

fn default_max_queue_length() -> usize {
    128
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            max_queue_length: default_max_queue_length(),
        }
    }
}

/// Why a slot could not be acquired
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireError {
    #[error("Concurrency limit reached and wait queue is full")]
    Rejected,

    #[error("Cancelled while waiting for a concurrency slot")]
    Cancelled,
}

#[derive(Debug)]
struct Shared {
    name: String,
    max_concurrency: usize,
    semaphore: Arc<Semaphore>,
    queued: AtomicUsize,
}

impl Shared {
    fn in_flight(&self) -> usize {
        self.max_concurrency
            .saturating_sub(self.semaphore.available_permits())
    }
}

/// Bounded counting semaphore with a bounded wait queue
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    shared: Arc<Shared>,
    max_queue_length: usize,
}

/// A held concurrency slot; released when dropped
#[derive(Debug)]
pub struct Lease {
    permit: Option<OwnedSemaphorePermit>,
    shared: Arc<Shared>,
}

impl Drop for Lease {
    fn drop(&mut self) {
        drop(self.permit.take());
        metrics::record_in_flight(&self.shared.name, self.shared.in_flight());
    }
}

/// Decrements the queue length when the waiter leaves, however it leaves
struct QueueSlot<'a>(&'a AtomicUsize);

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl ConcurrencyLimiter {
    pub fn new(name: impl Into<String>, max_concurrency: usize, max_queue_length: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                max_concurrency,
                semaphore: Arc::new(Semaphore::new(max_concurrency)),
                queued: AtomicUsize::new(0),
            }),
            max_queue_length,
        }
    }

    pub fn from_config(name: impl Into<String>, config: &ConcurrencyConfig) -> Self {
        Self::new(name, config.max_concurrency, config.max_queue_length)
    }

    /// Take a slot only if one is free right now
    pub fn try_acquire(&self) -> Option<Lease> {
        self.shared
            .semaphore
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| self.lease(permit))
    }

    /// Take a slot, waiting in the queue if necessary.
    ///
    /// Returns [`AcquireError::Rejected`] without waiting when the queue is
    /// already full, and [`AcquireError::Cancelled`] if `cancel` fires first.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<Lease, AcquireError> {
        if cancel.is_cancelled() {
            return Err(AcquireError::Cancelled);
        }

        if let Some(lease) = self.try_acquire() {
            return Ok(lease);
        }

        let ahead = self.shared.queued.fetch_add(1, Ordering::AcqRel);
        let _slot = QueueSlot(&self.shared.queued);

        if ahead >= self.max_queue_length {
            debug!(
                limiter = %self.shared.name,
                max_concurrency = self.shared.max_concurrency,
                max_queue_length = self.max_queue_length,
                "Concurrency limit reached, rejecting"
            );
            return Err(AcquireError::Rejected);
        }

        debug!(
            limiter = %self.shared.name,
            position = ahead + 1,
            "Waiting for concurrency slot"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AcquireError::Cancelled),
            permit = self.shared.semaphore.clone().acquire_owned() => {
                // The semaphore is never closed
                permit.map(|p| self.lease(p)).map_err(|_| AcquireError::Rejected)
            }
        }
    }

    /// Slots currently held
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight()
    }

    /// Callers currently waiting for a slot
    pub fn queued(&self) -> usize {
        self.shared.queued.load(Ordering::Acquire)
    }

    pub fn max_concurrency(&self) -> usize {
        self.shared.max_concurrency
    }

    pub fn max_queue_length(&self) -> usize {
        self.max_queue_length
    }

    fn lease(&self, permit: OwnedSemaphorePermit) -> Lease {
        let lease = Lease {
            permit: Some(permit),
            shared: self.shared.clone(),
        };
        metrics::record_in_flight(&self.shared.name, self.shared.in_flight());
        lease
    }
}
