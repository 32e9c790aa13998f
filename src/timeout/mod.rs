use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Deadline applied to each individual attempt, in milliseconds
    #[serde(default = "default_per_attempt_timeout_ms")]
    pub per_attempt_timeout_ms: u64,
}

fn default_per_attempt_timeout_ms() -> u64 {
    30_000
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            per_attempt_timeout_ms: default_per_attempt_timeout_ms(),
        }
    }
}

impl TimeoutConfig {
    pub fn per_attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.per_attempt_timeout_ms)
    }
}

/// Why an attempt did not run to completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    /// The guard's deadline elapsed
    TimedOut(Duration),
    /// The caller's token was cancelled
    Cancelled,
}

/// Bounds the wall-clock duration of a single attempt
#[derive(Debug, Clone, Copy)]
pub struct TimeoutGuard {
    per_attempt_timeout: Duration,
}

impl TimeoutGuard {
    pub fn new(per_attempt_timeout: Duration) -> Self {
        Self {
            per_attempt_timeout,
        }
    }

    pub fn from_config(config: &TimeoutConfig) -> Self {
        Self::new(config.per_attempt_timeout())
    }

    pub fn per_attempt_timeout(&self) -> Duration {
        self.per_attempt_timeout
    }

    /// Run `op` with a token that is cancelled when the deadline passes or
    /// `cancel` fires. The token is also cancelled once this call returns,
    /// so work the operation spawned with it winds down.
    pub async fn execute<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        op: F,
    ) -> Result<T, Interrupted>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = T>,
    {
        let attempt_token = cancel.child_token();
        let _cancel_on_exit = attempt_token.clone().drop_guard();

        let fut = op(attempt_token);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Attempt cancelled by caller");
                Err(Interrupted::Cancelled)
            }
            result = fut => Ok(result),
            _ = tokio::time::sleep(self.per_attempt_timeout) => {
                debug!(
                    timeout_ms = self.per_attempt_timeout.as_millis() as u64,
                    "Attempt exceeded deadline"
                );
                Err(Interrupted::TimedOut(self.per_attempt_timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_completes_within_deadline() {
        let guard = TimeoutGuard::new(Duration::from_millis(200));
        let cancel = CancellationToken::new();

        let result = guard
            .execute(&cancel, |_token| async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                42
            })
            .await;

        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn test_times_out_promptly() {
        let guard = TimeoutGuard::new(Duration::from_millis(100));
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let result = guard
            .execute(&cancel, |_token| async {
                tokio::time::sleep(Duration::from_millis(500)).await;
            })
            .await;

        let elapsed = start.elapsed();
        assert_eq!(result, Err(Interrupted::TimedOut(Duration::from_millis(100))));
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_operation_observes_deadline_cancellation() {
        let guard = TimeoutGuard::new(Duration::from_millis(50));
        let cancel = CancellationToken::new();
        let (tx, rx) = tokio::sync::oneshot::channel();

        let result = guard
            .execute(&cancel, |token| async move {
                // Spawned work outlives the attempt future but sees the token
                tokio::spawn(async move {
                    token.cancelled().await;
                    let _ = tx.send(());
                });
                tokio::time::sleep(Duration::from_secs(5)).await;
            })
            .await;

        assert!(matches!(result, Err(Interrupted::TimedOut(_))));
        tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .expect("spawned work should observe cancellation")
            .expect("sender should not be dropped");
    }

    #[tokio::test]
    async fn test_caller_cancellation_is_distinct_from_timeout() {
        let guard = TimeoutGuard::new(Duration::from_secs(5));
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result = guard
            .execute(&cancel, |token| async move {
                token.cancelled().await;
            })
            .await;

        assert_eq!(result, Err(Interrupted::Cancelled));
    }

    #[test]
    fn test_default_config() {
        let config = TimeoutConfig::default();
        assert_eq!(config.per_attempt_timeout(), Duration::from_secs(30));
        assert_eq!(
            TimeoutGuard::from_config(&config).per_attempt_timeout(),
            Duration::from_secs(30)
        );
    }
}
