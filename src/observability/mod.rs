use crate::config::{LogFormat, LoggingConfig};
use crate::error::{BulwarkError, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Build the log filter: `RUST_LOG` when set, else the configured level
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            BulwarkError::Config(format!("Invalid log level '{}': {}", config.level, e))
        }),
    }
}

/// Initialize the global tracing subscriber.
///
/// Fails if the level directive is invalid or a subscriber is already set.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = env_filter(config)?;

    let installed = match config.format {
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(true)
            .try_init(),
    };

    installed.map_err(|e| BulwarkError::Internal(format!("Failed to install subscriber: {}", e)))?;

    info!(format = ?config.format, level = %config.level, "Tracing initialized");

    Ok(())
}
