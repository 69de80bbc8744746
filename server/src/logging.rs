//! Structured logging initialization.
//!
//! The `RUST_LOG` environment variable takes precedence over the level in
//! the configuration file.

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the logging subsystem for the node process.
pub fn init(config: &LoggingConfig) {
    let filter = match std::env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => EnvFilter::new(config.level.as_str()),
    };

    let registry = tracing_subscriber::registry().with(filter);

    match (config.format, config.timestamps) {
        (LogFormat::Pretty, true) => registry
            .with(base_layer(config).with_ansi(true))
            .init(),
        (LogFormat::Pretty, false) => registry
            .with(base_layer(config).with_ansi(true).without_time())
            .init(),
        (LogFormat::Compact, true) => registry
            .with(base_layer(config).compact().with_ansi(true))
            .init(),
        (LogFormat::Compact, false) => registry
            .with(base_layer(config).compact().with_ansi(true).without_time())
            .init(),
        (LogFormat::Json, true) => registry.with(base_layer(config).json()).init(),
        (LogFormat::Json, false) => registry
            .with(base_layer(config).json().without_time())
            .init(),
    }
}

fn base_layer<S>(config: &LoggingConfig) -> fmt::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_target(config.target)
        .with_thread_names(config.thread_names)
}
