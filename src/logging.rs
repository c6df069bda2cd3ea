// Logging setup
// Installs the tracing subscriber used by the CLI; library code only emits events

use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Failed to install tracing subscriber: {0}")]
    InitFailed(String),
}

fn default_filter(verbose: bool) -> EnvFilter {
    let directive = if verbose {
        "flight_booking_engine=debug,info"
    } else {
        "flight_booking_engine=info"
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive))
}

/// `RUST_LOG` overrides the default filter. JSON output is meant for log shippers.
pub fn init_tracing(verbose: bool, json: bool) -> Result<(), LoggingError> {
    let registry = tracing_subscriber::registry().with(default_filter(verbose));

    let result = if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .json()
                    .with_current_span(true),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .compact(),
            )
            .try_init()
    };

    result.map_err(|e| LoggingError::InitFailed(e.to_string()))
}
