//! Logging setup.

use thiserror::Error;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    InvalidFilter(#[from] ParseError),

    #[error("a global subscriber is already installed: {0}")]
    AlreadyInstalled(#[from] SetGlobalDefaultError),
}

/// Parse a log filter directive such as `info` or `bus_core=debug,warn`.
pub fn env_filter(directive: &str) -> Result<EnvFilter, TelemetryError> {
    Ok(EnvFilter::try_new(directive)?)
}

/// Install the global fmt subscriber.
pub fn init_logging(directive: &str) -> Result<(), TelemetryError> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter(directive)?)
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
