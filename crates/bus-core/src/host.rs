//! # Transport Hosts
//!
//! A host is one transport's runtime unit. The bus starts and stops all of
//! its hosts together through a [`HostCollection`]:
//!
//! | Operation | Policy |
//! |-----------|--------|
//! | `start_all` | all-or-nothing: on failure, stop started hosts in reverse order |
//! | `stop_all` | best effort: stop every host, report every failure |
//!
//! Hosts are identified by object identity. They are never looked up by name.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::errors::{HostError, HostStartError, HostStopError};

/// Lifecycle state of a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostStatus {
    /// Constructed, never started.
    Created,
    /// Starting up.
    Starting,
    /// Accepting deliveries.
    Running,
    /// No longer accepting deliveries; draining in-flight ones.
    Stopping,
    /// Stopped; may be started again.
    Stopped,
    /// A lifecycle operation failed.
    Faulted,
}

/// Contract every transport host implements.
#[async_trait]
pub trait BusHost: Send + Sync {
    /// Diagnostic address, e.g. `loopback://localhost/`.
    fn address(&self) -> &str;

    fn status(&self) -> HostStatus;

    async fn start(&self) -> Result<(), HostError>;

    async fn stop(&self) -> Result<(), HostError>;
}

/// Ordered, append-only set of hosts.
#[derive(Clone, Default)]
pub struct HostCollection {
    hosts: Vec<Arc<dyn BusHost>>,
}

impl HostCollection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a host. Adding the same host again is a no-op.
    ///
    /// Returns `true` if the host was not already present.
    pub fn add(&mut self, host: Arc<dyn BusHost>) -> bool {
        if self.contains(&host) {
            return false;
        }
        self.hosts.push(host);
        true
    }

    #[must_use]
    pub fn contains(&self, host: &Arc<dyn BusHost>) -> bool {
        self.hosts
            .iter()
            .any(|existing| std::ptr::addr_eq(Arc::as_ptr(existing), Arc::as_ptr(host)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn BusHost>> {
        self.hosts.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Start every host in insertion order.
    ///
    /// If a host fails, the hosts already started are stopped in reverse
    /// order before the failure is returned.
    pub async fn start_all(&self) -> Result<(), HostStartError> {
        let mut started: Vec<&Arc<dyn BusHost>> = Vec::with_capacity(self.hosts.len());

        for host in &self.hosts {
            info!(host = host.address(), "[Hosts] Starting");
            match host.start().await {
                Ok(()) => started.push(host),
                Err(failure) => {
                    error!(
                        host = host.address(),
                        error = %failure,
                        "[Hosts] Start failed, rolling back"
                    );
                    let mut rollback_failures = Vec::new();
                    for running in started.iter().rev() {
                        if let Err(e) = running.stop().await {
                            warn!(
                                host = running.address(),
                                error = %e,
                                "[Hosts] Rollback stop failed"
                            );
                            rollback_failures.push(e);
                        }
                    }
                    return Err(HostStartError {
                        failure,
                        rollback_failures,
                    });
                }
            }
        }

        Ok(())
    }

    /// Stop every host, collecting failures instead of stopping early.
    pub async fn stop_all(&self) -> Result<(), HostStopError> {
        let mut failures = Vec::new();

        for host in &self.hosts {
            info!(host = host.address(), "[Hosts] Stopping");
            if let Err(e) = host.stop().await {
                warn!(host = host.address(), error = %e, "[Hosts] Stop failed");
                failures.push(e);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(HostStopError { failures })
        }
    }
}

impl fmt::Debug for HostCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.hosts.iter().map(|h| h.address()))
            .finish()
    }
}
