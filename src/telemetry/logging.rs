//! Logging configuration and initialization.
//!
//! RUST_LOG takes priority, then the config file setting, then `info`.

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Logging settings from the config file.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,
    /// Output format: pretty, compact, json
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Initializes the logging system. Safe to call more than once; later
/// calls are no-ops.
pub fn init_logging(config: Option<&LogConfig>) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(level_directive(config))
    };

    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.map(|c| c.format.as_str()).unwrap_or("pretty") {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        "compact" => registry
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init(),
        _ => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };

    let _ = result;
}

fn level_directive(config: Option<&LogConfig>) -> &'static str {
    let level = config.map(|c| c.level.as_str()).unwrap_or("info");
    match level.to_lowercase().as_str() {
        "error" => "error",
        "warn" => "warn",
        "info" => "info",
        "debug" => "debug",
        "trace" => "trace",
        _ => "info",
    }
}
