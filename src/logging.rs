//! # Structured Logging Module
//!
//! Environment-aware console logging using the tracing ecosystem. Logs go to stdout so the
//! monitor behaves well inside a container; `MONITOR_LOG_FORMAT=json` switches to one JSON
//! object per line for log shippers.

use std::io::IsTerminal;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = resolve_log_level(&environment, std::env::var("RUST_LOG").ok());
        let json = std::env::var("MONITOR_LOG_FORMAT")
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let use_ansi = IsTerminal::is_terminal(&std::io::stdout());

        let json_layer = json.then(|| {
            fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_filter(EnvFilter::new(&log_level))
        });
        let console_layer = (!json).then(|| {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(use_ansi)
                .with_filter(EnvFilter::new(&log_level))
        });

        let subscriber = tracing_subscriber::registry()
            .with(json_layer)
            .with(console_layer);

        if subscriber.try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        } else {
            tracing::info!(
                environment = %environment,
                log_level = %log_level,
                json,
                "Structured logging initialized"
            );
        }
    });
}

/// Get current environment from environment variables
pub(crate) fn get_environment() -> String {
    std::env::var("MONITOR_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Explicit filter wins; otherwise derive the level from the environment name
fn resolve_log_level(environment: &str, explicit: Option<String>) -> String {
    if let Some(level) = explicit.filter(|level| !level.trim().is_empty()) {
        return level.to_lowercase();
    }

    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}
