//! Logging initialization and configuration.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter used when neither `RUST_LOG` nor the configuration provides one.
pub const DEFAULT_LOG_FILTER: &str = "info,viewer=debug";

/// Initialize the logging system with tracing.
///
/// `RUST_LOG` takes precedence over `filter`. An unparsable `filter` falls
/// back to [`DEFAULT_LOG_FILTER`]. Calling this more than once is harmless;
/// only the first subscriber is installed.
///
/// # Example
/// ```
/// viewer_core::init_logging("info");
/// tracing::info!("Viewer starting");
/// ```
pub fn init_logging(filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_twice_does_not_panic() {
        init_logging("debug");
        init_logging("not a [valid filter");
    }
}
