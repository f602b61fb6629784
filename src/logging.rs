//! Tracing subscriber initialization.
//!
//! One subscriber per process, configured from the immutable [`Config`]:
//! `LOG_LEVEL` drives the filter, `STRUCTURED_LOGS_JSON` switches the
//! formatter. Initialization is idempotent so tests and embedders can
//! call it freely.

use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Initializes the global tracing subscriber from configuration.
///
/// A second call is a no-op.
pub fn init(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_filter()));

    if config.structured_logs_json {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_target(false)
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let config = Config::default();
        init(&config);
        init(&config);
    }

    #[test]
    fn test_init_json_variant() {
        let config = Config {
            structured_logs_json: true,
            ..Config::default()
        };
        init(&config);
    }
}
