//! Tracing initialization for the pipeline binary and tests.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Initialize tracing with defaults (`RUST_LOG` respected, `info` fallback).
pub fn init_tracing() {
    init_tracing_with(&LoggingConfig::default());
}

/// Initialize tracing from configuration. Safe to call more than once; later
/// calls are no-ops.
pub fn init_tracing_with(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    if config.json {
        let _ = fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}
