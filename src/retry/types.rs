use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Shape of the delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffType {
    /// `base_delay * attempt`
    Linear,
    /// `base_delay * 2^(attempt - 1)`
    Exponential,
}

impl std::fmt::Display for BackoffType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackoffType::Linear => write!(f, "linear"),
            BackoffType::Exponential => write!(f, "exponential"),
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Number of retries after the first attempt
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,

    /// Base backoff delay in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound for the backoff delay in milliseconds (before jitter)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Backoff shape
    #[serde(default = "default_backoff_type")]
    pub backoff_type: BackoffType,

    /// Multiply each delay by a random factor in [0.5, 1.5)
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

fn default_max_retry_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    200
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_backoff_type() -> BackoffType {
    BackoffType::Exponential
}

fn default_jitter() -> bool {
    true
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: default_max_retry_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_type: default_backoff_type(),
            jitter: default_jitter(),
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retry_attempts, 3);
        assert_eq!(config.base_delay_ms, 200);
        assert_eq!(config.max_delay_ms, 30_000);
        assert_eq!(config.backoff_type, BackoffType::Exponential);
        assert!(config.jitter);
    }

    #[test]
    fn test_backoff_type_serde() {
        let parsed: BackoffType = serde_yaml::from_str("linear").unwrap();
        assert_eq!(parsed, BackoffType::Linear);
        assert_eq!(serde_yaml::to_string(&BackoffType::Exponential).unwrap().trim(), "exponential");
    }
}
