//! # In-Memory Bus Configurator
//!
//! Collects specifications and settings without side effects, then replays
//! the specifications against an [`InMemoryBusBuilder`] on [`build`].
//!
//! ```text
//!  receive_endpoint / add_specification      validate()    build()
//!          │                                     │            │
//!          ▼                                     ▼            ▼
//!   [spec 1, spec 2, ...]  ──────────────▶ results      builder ◀─ apply(spec 1..n)
//!                                                             │
//!                                                             ▼
//!                                                            Bus
//! ```
//!
//! A configurator builds at most one bus. After a successful build every
//! mutation, and a second build, fail with [`ConfigurationError::AlreadyBuilt`].
//!
//! [`build`]: InMemoryBusConfigurator::build

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::builder::InMemoryBusBuilder;
use crate::bus::Bus;
use crate::config::InMemoryTransportConfig;
use crate::endpoint::ReceiveEndpointConfigurator;
use crate::envelope::Envelope;
use crate::errors::ConfigurationError;
use crate::host::{BusHost, HostCollection};
use crate::one_shot::OneShot;
use crate::pipe::{EnvelopeFilter, PipeConfiguration};
use crate::scope::{
    ContainerScopeProvider, Resolver, ScopeConfigurationHook, ScopeProvider, ScopeRegistrations,
};
use crate::specification::{
    BusFactorySpecification, InMemoryBusFactorySpecification, SpecificationAdapter,
};
use crate::transport::{InMemoryHost, SendTransportProvider};
use crate::validation::{has_errors, ValidationResult};
use crate::DEFAULT_SCOPE_NAME;

const SOURCE: &str = "bus";

/// Specification registry and settings for an in-memory bus.
pub struct InMemoryBusConfigurator {
    specifications: Vec<Box<dyn InMemoryBusFactorySpecification>>,
    queue_names: Vec<String>,
    transport: InMemoryTransportConfig,
    host: Option<Arc<InMemoryHost>>,
    default_host: Option<Arc<InMemoryHost>>,
    send_transport: Option<Arc<dyn SendTransportProvider>>,
    hosts: HostCollection,
    pipes: PipeConfiguration,
    scope_resolver: Option<Arc<dyn Resolver>>,
    scope_name: String,
    scope_hook: OneShot<ScopeConfigurationHook>,
    built: bool,
}

impl InMemoryBusConfigurator {
    #[must_use]
    pub fn new() -> Self {
        Self::with_transport_config(InMemoryTransportConfig::default())
    }

    #[must_use]
    pub fn with_transport_config(transport: InMemoryTransportConfig) -> Self {
        Self {
            specifications: Vec::new(),
            queue_names: Vec::new(),
            transport,
            host: None,
            default_host: None,
            send_transport: None,
            hosts: HostCollection::new(),
            pipes: PipeConfiguration::default(),
            scope_resolver: None,
            scope_name: DEFAULT_SCOPE_NAME.to_string(),
            scope_hook: OneShot::new("scope configuration hook"),
            built: false,
        }
    }

    fn ensure_mutable(&self) -> Result<(), ConfigurationError> {
        if self.built {
            return Err(ConfigurationError::AlreadyBuilt);
        }
        Ok(())
    }

    /// Register a transport-agnostic specification.
    pub fn add_specification<S>(&mut self, specification: S) -> Result<(), ConfigurationError>
    where
        S: BusFactorySpecification + 'static,
    {
        self.add_in_memory_specification(SpecificationAdapter::new(Box::new(specification)))
    }

    /// Register an in-memory specification.
    pub fn add_in_memory_specification<S>(
        &mut self,
        specification: S,
    ) -> Result<(), ConfigurationError>
    where
        S: InMemoryBusFactorySpecification + 'static,
    {
        self.ensure_mutable()?;
        self.specifications.push(Box::new(specification));
        Ok(())
    }

    /// Configure a receive endpoint named `queue_name`.
    pub fn receive_endpoint<F>(
        &mut self,
        queue_name: impl Into<String>,
        configure: F,
    ) -> Result<(), ConfigurationError>
    where
        F: FnOnce(&mut ReceiveEndpointConfigurator),
    {
        self.ensure_mutable()?;
        let mut endpoint = ReceiveEndpointConfigurator::new(queue_name);
        configure(&mut endpoint);
        self.queue_names.push(endpoint.queue_name().to_string());
        self.add_specification(endpoint)
    }

    /// Limit for the host created at build time. Has no effect on a host
    /// supplied through [`set_host`](Self::set_host).
    pub fn set_concurrency_limit(&mut self, limit: usize) -> Result<(), ConfigurationError> {
        self.ensure_mutable()?;
        if let Some(host) = &self.default_host {
            warn!(
                current = host.concurrency_limit(),
                requested = limit,
                "Default host already created by an earlier build attempt; limit unchanged"
            );
        }
        self.transport.concurrency_limit = limit;
        Ok(())
    }

    #[must_use]
    pub fn concurrency_limit(&self) -> usize {
        self.transport.concurrency_limit
    }

    pub fn set_drain_timeout(&mut self, timeout: Duration) -> Result<(), ConfigurationError> {
        self.ensure_mutable()?;
        self.transport.drain_timeout = timeout;
        Ok(())
    }

    /// Use `host` as the in-memory host and send transport.
    pub fn set_host(&mut self, host: Arc<InMemoryHost>) -> Result<(), ConfigurationError> {
        self.ensure_mutable()?;
        let as_host: Arc<dyn BusHost> = host.clone();
        let as_transport: Arc<dyn SendTransportProvider> = host.clone();
        self.hosts.add(as_host);
        self.send_transport = Some(as_transport);
        self.host = Some(host);
        Ok(())
    }

    /// Track an additional host. Returns `false` if it was already tracked.
    pub fn add_host(&mut self, host: Arc<dyn BusHost>) -> Result<bool, ConfigurationError> {
        self.ensure_mutable()?;
        Ok(self.hosts.add(host))
    }

    pub fn set_send_transport_provider(
        &mut self,
        provider: Arc<dyn SendTransportProvider>,
    ) -> Result<(), ConfigurationError> {
        self.ensure_mutable()?;
        self.send_transport = Some(provider);
        Ok(())
    }

    /// Open one scope per consumed message, created from `resolver`.
    pub fn use_message_scope(
        &mut self,
        resolver: Arc<dyn Resolver>,
    ) -> Result<(), ConfigurationError> {
        self.ensure_mutable()?;
        self.scope_resolver = Some(resolver);
        Ok(())
    }

    pub fn set_scope_name(&mut self, name: impl Into<String>) -> Result<(), ConfigurationError> {
        self.ensure_mutable()?;
        let name = name.into();
        if name.is_empty() {
            return Err(ConfigurationError::MissingArgument("scope_name"));
        }
        self.scope_name = name;
        Ok(())
    }

    /// Customize every message scope. Can be set once.
    pub fn set_scope_configuration_hook<F>(&mut self, hook: F) -> Result<(), ConfigurationError>
    where
        F: Fn(&mut ScopeRegistrations, &Envelope) + Send + Sync + 'static,
    {
        self.ensure_mutable()?;
        self.scope_hook.set(Arc::new(hook))
    }

    pub fn add_consume_filter(
        &mut self,
        filter: Arc<dyn EnvelopeFilter>,
    ) -> Result<(), ConfigurationError> {
        self.ensure_mutable()?;
        self.pipes.consume.push(filter);
        Ok(())
    }

    pub fn add_send_filter(
        &mut self,
        filter: Arc<dyn EnvelopeFilter>,
    ) -> Result<(), ConfigurationError> {
        self.ensure_mutable()?;
        self.pipes.send.push(filter);
        Ok(())
    }

    pub fn add_publish_filter(
        &mut self,
        filter: Arc<dyn EnvelopeFilter>,
    ) -> Result<(), ConfigurationError> {
        self.ensure_mutable()?;
        self.pipes.publish.push(filter);
        Ok(())
    }

    /// The in-memory host the next build will use, if already decided.
    #[must_use]
    pub fn host(&self) -> Option<&Arc<InMemoryHost>> {
        self.host.as_ref().or(self.default_host.as_ref())
    }

    #[must_use]
    pub fn specification_count(&self) -> usize {
        self.specifications.len()
    }

    #[must_use]
    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Report configuration problems: registry checks first, then every
    /// specification in registration order. Has no side effects.
    #[must_use]
    pub fn validate(&self) -> Vec<ValidationResult> {
        let mut results = Vec::new();

        if self.transport.concurrency_limit == 0 {
            results.push(ValidationResult::error(
                SOURCE,
                "concurrency limit must be greater than zero",
            ));
        }
        if self.transport.drain_timeout.is_zero() {
            results.push(ValidationResult::warning(
                SOURCE,
                "a zero drain timeout aborts in-flight deliveries on stop",
            ));
        }

        let mut seen = HashSet::new();
        for name in &self.queue_names {
            if !name.is_empty() && !seen.insert(name.as_str()) {
                results.push(ValidationResult::error(
                    SOURCE,
                    format!("receive endpoint `{name}` is configured more than once"),
                ));
            }
        }

        if self.scope_hook.is_set() && self.scope_resolver.is_none() {
            results.push(ValidationResult::warning(
                SOURCE,
                "scope configuration hook is set but message scopes are not enabled",
            ));
        }

        for specification in &self.specifications {
            results.extend(specification.validate());
        }

        results
    }

    /// Apply every specification in registration order and build the bus.
    ///
    /// Does not validate. Creates the default host on first use only, so a
    /// failed build can be retried without creating another host.
    #[instrument(skip_all, fields(specifications = self.specifications.len()))]
    pub fn build(&mut self) -> Result<Bus, ConfigurationError> {
        self.ensure_mutable()?;

        let host = self.bound_host();
        let send_transport = match &self.send_transport {
            Some(provider) => Arc::clone(provider),
            None => {
                let as_transport: Arc<dyn SendTransportProvider> = host.clone();
                as_transport
            }
        };
        let scope_provider = self.scope_resolver.as_ref().map(|resolver| {
            let provider: Arc<dyn ScopeProvider> = Arc::new(ContainerScopeProvider::new(
                Arc::clone(resolver),
                self.scope_name.clone(),
                self.scope_hook.get().cloned(),
            ));
            provider
        });

        let mut builder = InMemoryBusBuilder::new(host, send_transport, self.hosts.clone())
            .with_pipes(self.pipes.clone())
            .with_scope_provider(scope_provider);

        for (index, specification) in self.specifications.iter().enumerate() {
            if let Err(e) = specification.apply(&mut builder) {
                warn!(index, error = %e, "Specification failed to apply");
                return Err(e);
            }
        }

        let bus = builder.build()?;
        self.built = true;
        Ok(bus)
    }

    fn bound_host(&mut self) -> Arc<InMemoryHost> {
        if let Some(host) = &self.host {
            return Arc::clone(host);
        }
        let transport = &self.transport;
        let host = self.default_host.get_or_insert_with(|| {
            info!(
                address = %transport.address,
                concurrency_limit = transport.concurrency_limit,
                "Creating default in-memory host"
            );
            Arc::new(InMemoryHost::new(transport.clone()))
        });
        Arc::clone(host)
    }
}

impl Default for InMemoryBusConfigurator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InMemoryBusConfigurator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryBusConfigurator")
            .field("specifications", &self.specifications.len())
            .field("transport", &self.transport)
            .field("hosts", &self.hosts)
            .field("scope_name", &self.scope_name)
            .field("scoped", &self.scope_resolver.is_some())
            .field("built", &self.built)
            .finish_non_exhaustive()
    }
}

/// Configure, validate and build an in-memory bus in one call.
///
/// Fails with [`ConfigurationError::Invalid`] if validation reports any
/// error; warnings are logged.
pub fn create_in_memory_bus<F>(configure: F) -> Result<Bus, ConfigurationError>
where
    F: FnOnce(&mut InMemoryBusConfigurator) -> Result<(), ConfigurationError>,
{
    let mut configurator = InMemoryBusConfigurator::new();
    configure(&mut configurator)?;

    let results = configurator.validate();
    if has_errors(&results) {
        return Err(ConfigurationError::Invalid(results));
    }
    for warning in &results {
        warn!(source = %warning.source(), "{}", warning.message());
    }
    debug!(specifications = configurator.specification_count(), "Configuration valid");

    configurator.build()
}
