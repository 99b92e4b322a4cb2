//! # Bus Handle
//!
//! The product of a build. Immutable apart from its hosts' lifecycle.

use std::fmt;
use std::sync::Arc;

use tracing::{info, instrument};

use crate::envelope::Envelope;
use crate::errors::BusError;
use crate::host::{BusHost, HostCollection};
use crate::pipe::MessagePublisher;
use crate::scope::ScopeProvider;
use crate::transport::{InMemoryHost, SendTransportProvider};

/// A built, runnable bus.
pub struct Bus {
    hosts: HostCollection,
    host: Arc<InMemoryHost>,
    /// Keeps the transport alive for the publisher's weak reference.
    send_transport: Arc<dyn SendTransportProvider>,
    publisher: Arc<MessagePublisher>,
    scope_provider: Option<Arc<dyn ScopeProvider>>,
}

impl Bus {
    pub(crate) fn new(
        hosts: HostCollection,
        host: Arc<InMemoryHost>,
        send_transport: Arc<dyn SendTransportProvider>,
        publisher: Arc<MessagePublisher>,
        scope_provider: Option<Arc<dyn ScopeProvider>>,
    ) -> Self {
        Self {
            hosts,
            host,
            send_transport,
            publisher,
            scope_provider,
        }
    }

    /// Start every host. All-or-nothing; see [`HostCollection::start_all`].
    #[instrument(skip_all, fields(hosts = self.hosts.len()))]
    pub async fn start(&self) -> Result<(), BusError> {
        self.hosts.start_all().await?;
        info!(address = %self.address(), "Bus started");
        Ok(())
    }

    /// Stop every host, reporting every failure.
    #[instrument(skip_all, fields(hosts = self.hosts.len()))]
    pub async fn stop(&self) -> Result<(), BusError> {
        self.hosts.stop_all().await?;
        info!(address = %self.address(), "Bus stopped");
        Ok(())
    }

    /// Send to a single receive endpoint.
    pub fn send(&self, destination: &str, envelope: Envelope) -> Result<(), BusError> {
        Ok(self.publisher.send(destination, envelope)?)
    }

    /// Publish to every endpoint handling the envelope's message type.
    pub fn publish(&self, envelope: Envelope) -> Result<usize, BusError> {
        Ok(self.publisher.publish(envelope)?)
    }

    #[must_use]
    pub fn hosts(&self) -> &HostCollection {
        &self.hosts
    }

    #[must_use]
    pub fn in_memory_host(&self) -> &Arc<InMemoryHost> {
        &self.host
    }

    #[must_use]
    pub fn send_transport(&self) -> &Arc<dyn SendTransportProvider> {
        &self.send_transport
    }

    #[must_use]
    pub fn scope_provider(&self) -> Option<&Arc<dyn ScopeProvider>> {
        self.scope_provider.as_ref()
    }

    #[must_use]
    pub fn address(&self) -> &str {
        self.host.address()
    }
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("address", &self.address())
            .field("hosts", &self.hosts)
            .field("scoped", &self.scope_provider.is_some())
            .finish_non_exhaustive()
    }
}
