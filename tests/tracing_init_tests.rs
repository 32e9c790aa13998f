// Installs the global subscriber, so it lives in its own test binary
use bulwark::config::{LogFormat, LoggingConfig};
use bulwark::observability::init_tracing;

#[test]
fn test_tracing_installs_once() {
    let config = LoggingConfig {
        level: "warn".to_string(),
        format: LogFormat::Compact,
    };

    assert!(init_tracing(&config).is_ok());
    assert!(init_tracing(&config).is_err());
}
