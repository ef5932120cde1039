//! # Tracing Setup
//!
//! Installs the process-wide `tracing` subscriber.
//!
//! ## Log Levels
//! - `RUST_LOG=debug` - Show debug messages
//! - `RUST_LOG=agent_db=trace` - Show trace for the ledger only
//! - Otherwise `[logging] level` from the service config

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Builds the filter: `RUST_LOG` when set, else the configured directives.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initializes the tracing subscriber. Returns false when one was already
/// installed, which happens in tests and when an embedding service set up
/// its own.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let filter = env_filter(config);

    let result = if config.pretty {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .pretty()
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };

    result.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let config = LoggingConfig::default();
        init_tracing(&config);
        assert!(!init_tracing(&config));
    }

    #[test]
    fn test_bad_directive_falls_back() {
        let config = LoggingConfig {
            level: "agent_db=[".to_string(),
            pretty: false,
        };
        // Must not panic.
        let _ = env_filter(&config);
    }
}
