//! Process-wide logging initialization.
//!
//! `RUST_LOG` wins over the configured default directive. Initialization
//! happens once in the binary's setup path; calling it twice is an error.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Logging initialization error.
#[derive(Debug, thiserror::Error)]
pub enum LoggingSetupError {
    /// A global subscriber was already installed.
    #[error("failed to initialize logging: {0}")]
    Init(String),
}

/// Install the global subscriber.
///
/// `default_directive` is used when `RUST_LOG` is unset. With `json` the
/// output is one JSON object per line for log shippers.
///
/// # Errors
/// Returns an error if a global subscriber is already set.
pub fn init_logging(default_directive: &str, json: bool) -> Result<(), LoggingSetupError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true).with_filter(filter))
            .try_init()
            .map_err(|e| LoggingSetupError::Init(e.to_string()))
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_filter(filter))
            .try_init()
            .map_err(|e| LoggingSetupError::Init(e.to_string()))
    }
}
