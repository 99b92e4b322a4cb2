//! # Bus Builders
//!
//! Specifications mutate a builder; the builder then freezes everything it
//! collected into a [`Bus`]. [`BusBuilder`] is the capability set every
//! transport offers. [`InMemoryBusBuilder`] adds access to the in-memory
//! host and the send transport.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::bus::Bus;
use crate::endpoint::ReceiveEndpointDefinition;
use crate::errors::ConfigurationError;
use crate::host::{BusHost, HostCollection};
use crate::pipe::{ConsumePipe, EnvelopeFilter, MessagePublisher, PipeConfiguration};
use crate::scope::ScopeProvider;
use crate::transport::{InMemoryHost, SendTransportProvider};

/// Transport-agnostic builder capabilities.
pub trait BusBuilder: Send {
    /// Queue a receive endpoint. Queue names must be unique per bus.
    fn add_receive_endpoint(
        &mut self,
        definition: ReceiveEndpointDefinition,
    ) -> Result<(), ConfigurationError>;

    /// Track a host for coordinated start/stop. Returns `false` if the host
    /// was already tracked.
    fn add_host(&mut self, host: Arc<dyn BusHost>) -> bool;

    fn add_consume_filter(&mut self, filter: Arc<dyn EnvelopeFilter>);

    fn add_send_filter(&mut self, filter: Arc<dyn EnvelopeFilter>);

    fn add_publish_filter(&mut self, filter: Arc<dyn EnvelopeFilter>);

    fn hosts(&self) -> &HostCollection;
}

/// Builder for a bus whose receive endpoints live on an [`InMemoryHost`].
pub struct InMemoryBusBuilder {
    host: Arc<InMemoryHost>,
    send_transport: Arc<dyn SendTransportProvider>,
    hosts: HostCollection,
    endpoints: Vec<ReceiveEndpointDefinition>,
    queue_names: HashSet<String>,
    pipes: PipeConfiguration,
    scope_provider: Option<Arc<dyn ScopeProvider>>,
}

impl InMemoryBusBuilder {
    /// Start from `hosts`; `host` is added to them if not already present.
    pub fn new(
        host: Arc<InMemoryHost>,
        send_transport: Arc<dyn SendTransportProvider>,
        hosts: HostCollection,
    ) -> Self {
        let mut hosts = hosts;
        let in_memory: Arc<dyn BusHost> = host.clone();
        hosts.add(in_memory);
        Self {
            host,
            send_transport,
            hosts,
            endpoints: Vec::new(),
            queue_names: HashSet::new(),
            pipes: PipeConfiguration::default(),
            scope_provider: None,
        }
    }

    /// Builder using `host` as its only host and as the send transport.
    pub fn with_host(host: Arc<InMemoryHost>) -> Self {
        let send_transport: Arc<dyn SendTransportProvider> = host.clone();
        Self::new(host, send_transport, HostCollection::new())
    }

    #[must_use]
    pub fn with_pipes(mut self, pipes: PipeConfiguration) -> Self {
        self.pipes = pipes;
        self
    }

    #[must_use]
    pub fn with_scope_provider(mut self, provider: Option<Arc<dyn ScopeProvider>>) -> Self {
        self.scope_provider = provider;
        self
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
    pub fn pipes(&self) -> &PipeConfiguration {
        &self.pipes
    }

    #[must_use]
    pub fn endpoints(&self) -> &[ReceiveEndpointDefinition] {
        &self.endpoints
    }

    /// Connect the collected endpoints and freeze the result into a bus.
    ///
    /// Does not validate; callers validate before building. Fails without
    /// connecting anything if a queue name is already taken on the host.
    pub fn build(self) -> Result<Bus, ConfigurationError> {
        let Self {
            host,
            send_transport,
            hosts,
            endpoints,
            pipes,
            scope_provider,
            ..
        } = self;

        if let Some(taken) = endpoints.iter().find(|e| host.has_endpoint(e.queue_name())) {
            return Err(ConfigurationError::DuplicateEndpoint(taken.queue_name().to_string()));
        }

        let publisher = Arc::new(MessagePublisher::new(&send_transport, &pipes));
        let endpoint_count = endpoints.len();
        for definition in endpoints {
            let pipe = Arc::new(ConsumePipe::new(
                pipes.consume.clone(),
                scope_provider.clone(),
                Some(Arc::clone(&publisher)),
            ));
            host.connect_endpoint(definition.into_endpoint(pipe))?;
        }

        info!(
            hosts = hosts.len(),
            endpoints = endpoint_count,
            scoped = scope_provider.is_some(),
            "Bus built"
        );
        Ok(Bus::new(hosts, host, send_transport, publisher, scope_provider))
    }
}

impl BusBuilder for InMemoryBusBuilder {
    fn add_receive_endpoint(
        &mut self,
        definition: ReceiveEndpointDefinition,
    ) -> Result<(), ConfigurationError> {
        if !self.queue_names.insert(definition.queue_name().to_string()) {
            return Err(ConfigurationError::DuplicateEndpoint(
                definition.queue_name().to_string(),
            ));
        }
        debug!(queue = %definition.queue_name(), "Receive endpoint added");
        self.endpoints.push(definition);
        Ok(())
    }

    fn add_host(&mut self, host: Arc<dyn BusHost>) -> bool {
        self.hosts.add(host)
    }

    fn add_consume_filter(&mut self, filter: Arc<dyn EnvelopeFilter>) {
        self.pipes.consume.push(filter);
    }

    fn add_send_filter(&mut self, filter: Arc<dyn EnvelopeFilter>) {
        self.pipes.send.push(filter);
    }

    fn add_publish_filter(&mut self, filter: Arc<dyn EnvelopeFilter>) {
        self.pipes.publish.push(filter);
    }

    fn hosts(&self) -> &HostCollection {
        &self.hosts
    }
}

impl fmt::Debug for InMemoryBusBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryBusBuilder")
            .field("host", &self.host.address())
            .field("hosts", &self.hosts)
            .field("endpoints", &self.endpoints)
            .field("pipes", &self.pipes)
            .finish_non_exhaustive()
    }
}
