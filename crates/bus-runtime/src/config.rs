//! Runtime configuration.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `BUS_LOG_LEVEL` | `info` |
//! | `BUS_ADDRESS` | `loopback://localhost/` |
//! | `BUS_CONCURRENCY_LIMIT` | number of logical CPUs |
//! | `BUS_DRAIN_TIMEOUT_MS` | `30000` |
//! | `BUS_SCOPE_NAME` | `message` |

use std::time::Duration;

use bus_core::{InMemoryTransportConfig, DEFAULT_SCOPE_NAME};
use thiserror::Error;
use tracing::warn;

/// Invalid runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("BUS_CONCURRENCY_LIMIT must be greater than zero")]
    ZeroConcurrency,

    #[error("BUS_SCOPE_NAME must not be empty")]
    EmptyScopeName,

    #[error("BUS_ADDRESS must not be empty")]
    EmptyAddress,
}

/// Settings for the runtime binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Log filter directive, e.g. `info` or `bus_core=debug`.
    pub log_level: String,
    pub transport: InMemoryTransportConfig,
    /// Tag given to every message scope.
    pub scope_name: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            transport: InMemoryTransportConfig::default(),
            scope_name: DEFAULT_SCOPE_NAME.to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Load from `BUS_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` in place of the process environment.
    ///
    /// Unparseable numbers are logged and the default is kept.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(level) = lookup("BUS_LOG_LEVEL") {
            config.log_level = level;
        }
        if let Some(address) = lookup("BUS_ADDRESS") {
            config.transport.address = address;
        }
        if let Some(limit) = lookup("BUS_CONCURRENCY_LIMIT") {
            match limit.parse() {
                Ok(limit) => config.transport.concurrency_limit = limit,
                Err(_) => warn!(value = %limit, "BUS_CONCURRENCY_LIMIT is not a number"),
            }
        }
        if let Some(timeout) = lookup("BUS_DRAIN_TIMEOUT_MS") {
            match timeout.parse() {
                Ok(ms) => config.transport.drain_timeout = Duration::from_millis(ms),
                Err(_) => warn!(value = %timeout, "BUS_DRAIN_TIMEOUT_MS is not a number"),
            }
        }
        if let Some(name) = lookup("BUS_SCOPE_NAME") {
            config.scope_name = name;
        }

        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transport.concurrency_limit == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.scope_name.is_empty() {
            return Err(ConfigError::EmptyScopeName);
        }
        if self.transport.address.is_empty() {
            return Err(ConfigError::EmptyAddress);
        }
        Ok(())
    }
}
