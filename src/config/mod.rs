use crate::circuit_breaker::CircuitBreakerConfig;
use crate::concurrency::ConcurrencyConfig;
use crate::error::{BulwarkError, Result};
use crate::retry::RetryConfig;
use crate::timeout::TimeoutConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Main configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulwarkConfig {
    /// Log output configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Prometheus exporter configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Settings for dependencies without an entry of their own
    #[serde(default)]
    pub defaults: PipelineConfig,
    /// Per-dependency settings, keyed by dependency name.
    /// An entry replaces `defaults` entirely for that dependency.
    #[serde(default)]
    pub dependencies: BTreeMap<String, PipelineConfig>,
}

/// Settings for one resilience pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub timeout: TimeoutConfig,
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence when set
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

/// Log line format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Metrics exporter configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Install the Prometheus recorder at startup
    #[serde(default)]
    pub enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl BulwarkConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BulwarkError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| BulwarkError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.defaults.validate("defaults")?;

        for (name, pipeline) in &self.dependencies {
            if name.trim().is_empty() {
                return Err(BulwarkError::Config(
                    "Dependency name cannot be empty".to_string(),
                ));
            }
            pipeline.validate(name)?;
        }

        Ok(())
    }

    /// Settings that apply to `dependency`
    pub fn pipeline_config(&self, dependency: &str) -> &PipelineConfig {
        self.dependencies
            .get(dependency)
            .unwrap_or(&self.defaults)
    }
}

impl PipelineConfig {
    /// Validate configuration; `name` identifies the pipeline in error messages
    pub fn validate(&self, name: &str) -> Result<()> {
        let cb = &self.circuit_breaker;

        if !(cb.failure_ratio_threshold > 0.0 && cb.failure_ratio_threshold <= 1.0) {
            return Err(BulwarkError::Config(format!(
                "Failure ratio threshold must be in (0, 1] for pipeline: {}",
                name
            )));
        }
        if cb.minimum_throughput == 0 {
            return Err(BulwarkError::Config(format!(
                "Minimum throughput must be > 0 for pipeline: {}",
                name
            )));
        }
        if cb.sampling_duration_ms == 0 {
            return Err(BulwarkError::Config(format!(
                "Sampling duration must be > 0 for pipeline: {}",
                name
            )));
        }
        if cb.window_buckets == 0 || cb.sampling_duration_ms < u64::from(cb.window_buckets) {
            return Err(BulwarkError::Config(format!(
                "Window buckets must be between 1 and the sampling duration in ms for pipeline: {}",
                name
            )));
        }

        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(BulwarkError::Config(format!(
                "Retry base delay must not exceed max delay for pipeline: {}",
                name
            )));
        }

        if self.timeout.per_attempt_timeout_ms == 0 {
            return Err(BulwarkError::Config(format!(
                "Per-attempt timeout must be > 0 for pipeline: {}",
                name
            )));
        }

        if self.concurrency.max_concurrency == 0 {
            return Err(BulwarkError::Config(format!(
                "Max concurrency must be > 0 for pipeline: {}",
                name
            )));
        }

        if self.concurrency.max_concurrency > tokio::sync::Semaphore::MAX_PERMITS {
            return Err(BulwarkError::Config(format!(
                "Max concurrency must be <= {} for pipeline: {}",
                tokio::sync::Semaphore::MAX_PERMITS,
                name
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::BackoffType;
    use std::io::Write;

    #[test]
    fn test_parse_valid_config() {
        let yaml = r#"
logging:
  level: "bulwark=debug"
  format: json

metrics:
  enabled: true

defaults:
  circuit_breaker:
    failure_ratio_threshold: 0.25
    minimum_throughput: 20
  retry:
    max_retry_attempts: 5
    backoff_type: linear
    jitter: false

dependencies:
  orders-db:
    timeout:
      per_attempt_timeout_ms: 250
    concurrency:
      max_concurrency: 8
      max_queue_length: 16
"#;

        let config = BulwarkConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.logging.level, "bulwark=debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.metrics.enabled);

        assert_eq!(config.defaults.circuit_breaker.failure_ratio_threshold, 0.25);
        assert_eq!(config.defaults.circuit_breaker.minimum_throughput, 20);
        assert_eq!(config.defaults.retry.max_retry_attempts, 5);
        assert_eq!(config.defaults.retry.backoff_type, BackoffType::Linear);
        assert!(!config.defaults.retry.jitter);

        let orders = config.pipeline_config("orders-db");
        assert_eq!(orders.timeout.per_attempt_timeout_ms, 250);
        assert_eq!(orders.concurrency.max_concurrency, 8);
        assert_eq!(orders.concurrency.max_queue_length, 16);
        // Entry replaces defaults
        assert_eq!(orders.retry.max_retry_attempts, 3);

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_values() {
        let config = BulwarkConfig::from_yaml("{}").unwrap();

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert!(!config.metrics.enabled);
        assert!(config.dependencies.is_empty());

        let defaults = &config.defaults;
        assert_eq!(defaults.circuit_breaker.failure_ratio_threshold, 0.5);
        assert_eq!(defaults.circuit_breaker.minimum_throughput, 10);
        assert_eq!(defaults.circuit_breaker.sampling_duration_ms, 30_000);
        assert_eq!(defaults.circuit_breaker.break_duration_ms, 5_000);
        assert_eq!(defaults.retry.max_retry_attempts, 3);
        assert_eq!(defaults.retry.base_delay_ms, 200);
        assert_eq!(defaults.retry.backoff_type, BackoffType::Exponential);
        assert_eq!(defaults.timeout.per_attempt_timeout_ms, 30_000);
        assert_eq!(defaults.concurrency.max_concurrency, 64);
        assert_eq!(defaults.concurrency.max_queue_length, 128);

        // Unknown dependency falls back to defaults
        assert_eq!(
            config
                .pipeline_config("anything")
                .concurrency
                .max_concurrency,
            64
        );
    }

    #[test]
    fn test_validate_failure_ratio() {
        let mut config = PipelineConfig::default();

        config.circuit_breaker.failure_ratio_threshold = 0.0;
        assert!(config.validate("test").is_err());

        config.circuit_breaker.failure_ratio_threshold = 1.5;
        assert!(config.validate("test").is_err());

        config.circuit_breaker.failure_ratio_threshold = 1.0;
        assert!(config.validate("test").is_ok());
    }

    #[test]
    fn test_validate_window() {
        let mut config = PipelineConfig::default();
        config.circuit_breaker.minimum_throughput = 0;
        assert!(config.validate("test").is_err());

        let mut config = PipelineConfig::default();
        config.circuit_breaker.sampling_duration_ms = 0;
        assert!(config.validate("test").is_err());

        let mut config = PipelineConfig::default();
        config.circuit_breaker.sampling_duration_ms = 5;
        config.circuit_breaker.window_buckets = 10;
        assert!(config.validate("test").is_err());

        config.circuit_breaker.window_buckets = 0;
        assert!(config.validate("test").is_err());
    }

    #[test]
    fn test_validate_retry_timeout_concurrency() {
        let mut config = PipelineConfig::default();
        config.retry.base_delay_ms = 60_000;
        assert!(config.validate("test").is_err());

        let mut config = PipelineConfig::default();
        config.timeout.per_attempt_timeout_ms = 0;
        assert!(config.validate("test").is_err());

        let mut config = PipelineConfig::default();
        config.concurrency.max_concurrency = 0;
        assert!(config.validate("test").is_err());

        let mut config = PipelineConfig::default();
        config.concurrency.max_concurrency = usize::MAX;
        let err = config.validate("test").unwrap_err();
        assert!(err.to_string().contains("Max concurrency"));

        // An empty queue only means "reject when saturated"
        let mut config = PipelineConfig::default();
        config.concurrency.max_queue_length = 0;
        assert!(config.validate("test").is_ok());
    }

    #[test]
    fn test_validate_empty_dependency_name() {
        let mut config = BulwarkConfig::default();
        config
            .dependencies
            .insert("  ".to_string(), PipelineConfig::default());

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Dependency name"));
    }

    #[test]
    fn test_validation_error_names_dependency() {
        let mut config = BulwarkConfig::default();
        let mut broken = PipelineConfig::default();
        broken.timeout.per_attempt_timeout_ms = 0;
        config.dependencies.insert("payments-api".to_string(), broken);

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("payments-api"));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "dependencies:\n  search:\n    retry:\n      max_retry_attempts: 1"
        )
        .unwrap();

        let config = BulwarkConfig::from_file(file.path()).unwrap();
        assert_eq!(
            config.pipeline_config("search").retry.max_retry_attempts,
            1
        );
    }

    #[test]
    fn test_from_file_missing() {
        let err = BulwarkConfig::from_file("/nonexistent/bulwark.yaml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_from_yaml_invalid() {
        let err = BulwarkConfig::from_yaml("defaults: [1, 2").unwrap_err();
        assert!(matches!(err, BulwarkError::Config(_)));
    }
}
