//! # Transport Configuration
//!
//! Settings for the in-memory transport host. All values have sane
//! defaults; the concurrency limit follows the number of logical CPUs.

use std::time::Duration;

/// Address reported by the default in-memory host.
pub const DEFAULT_ADDRESS: &str = "loopback://localhost/";

/// How long a stopping host waits for in-flight deliveries.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// In-memory transport configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InMemoryTransportConfig {
    /// Host address (diagnostic only).
    pub address: String,
    /// Maximum deliveries processed in parallel across all endpoints.
    pub concurrency_limit: usize,
    /// Time allowed for in-flight deliveries to finish on stop.
    pub drain_timeout: Duration,
}

impl InMemoryTransportConfig {
    #[must_use]
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit;
        self
    }

    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }
}

impl Default for InMemoryTransportConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            concurrency_limit: num_cpus::get().max(1),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}
