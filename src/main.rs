use bulwark::{config::BulwarkConfig, init_registry, observability::init_tracing};
use std::env;
use std::process;

fn main() {
    // Get config file path from command line or use default
    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "config/bulwark.yaml".to_string());

    // Load configuration
    let config = match BulwarkConfig::from_file(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from {}: {}", config_path, e);
            eprintln!("Usage: bulwark [config_file]");
            process::exit(1);
        }
    };

    if let Err(e) = init_tracing(&config.logging) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    let (registry, _metrics) = match init_registry(config) {
        Ok(initialized) => initialized,
        Err(e) => {
            eprintln!("Invalid configuration in {}: {}", config_path, e);
            process::exit(1);
        }
    };

    let pipelines: Vec<_> = registry
        .snapshots()
        .into_iter()
        .map(|snapshot| {
            let config = registry.config().pipeline_config(&snapshot.name);
            serde_json::json!({ "status": snapshot, "config": config })
        })
        .collect();

    let summary = serde_json::json!({
        "config_file": config_path,
        "defaults": registry.config().defaults,
        "pipelines": pipelines,
    });

    match serde_json::to_string_pretty(&summary) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("Failed to render summary: {}", e);
            process::exit(1);
        }
    }
}
