//! Logging configuration for the client.

use tracing::info;
use tracing_subscriber::EnvFilter;

/// Environment variable that overrides the configured log filter.
pub const LOG_ENV: &str = "ALPHASTRAT_LOG";

/// Build the filter used by [`init_logging`]: `ALPHASTRAT_LOG` wins, then `level`.
pub fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the logging system.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(level: &str) {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(build_filter(level))
        .with_target(true)
        .try_init()
        .is_ok();

    if installed {
        info!(level, "Logging initialized");
    }
}

/// Initialize test logging (for use in tests)
#[cfg(test)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::{debug, error, warn};

    #[test]
    fn test_logging() {
        // Visual test - run with `cargo test -- --nocapture` to see the output
        init_logging("debug");
        init_logging("debug");

        error!("This is an error message");
        warn!("This is a warning message");
        info!("This is an info message");
        debug!("This is a debug message");
    }

    #[test]
    fn test_test_logging() {
        init_test_logging();
        debug!("This debug message should only appear in test output with --nocapture");
    }

    #[test]
    fn env_override_wins_over_level() {
        temp_env::with_var(LOG_ENV, Some("warn"), || {
            assert_eq!(build_filter("debug").to_string(), "warn");
        });
        temp_env::with_var(LOG_ENV, None::<&str>, || {
            assert_eq!(build_filter("debug").to_string(), "debug");
        });
    }
}
