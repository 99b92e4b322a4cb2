//! # Mediator
//!
//! In-process dispatch without a transport. Every message sent through a
//! [`Mediator`] runs inline in the caller's task, inside its own message
//! scope, and the handler outcome goes straight back to the caller.
//!
//! Handlers can send and publish onward only when a send transport has been
//! attached with [`MediatorConfigurator::set_send_transport`].

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::endpoint::ReceiveEndpointConfigurator;
use crate::envelope::Envelope;
use crate::errors::{BusError, ConfigurationError, TransportError};
use crate::one_shot::OneShot;
use crate::pipe::{ConsumePipe, MessagePublisher, PipeConfiguration};
use crate::scope::{
    ContainerScopeProvider, Resolver, ScopeConfigurationHook, ScopeProvider, ScopeRegistrations,
};
use crate::specification::BusFactorySpecification;
use crate::transport::{ReceiveEndpoint, SendTransportProvider};
use crate::validation::ValidationResult;
use crate::DEFAULT_SCOPE_NAME;

const MEDIATOR_ENDPOINT: &str = "mediator";

type ConfigureFn = Box<dyn FnOnce(&mut ReceiveEndpointConfigurator) + Send>;

/// Registers a mediator against a container.
pub struct MediatorConfigurator {
    resolver: Arc<dyn Resolver>,
    scope_name: String,
    scope_hook: OneShot<ScopeConfigurationHook>,
    configure: OneShot<ConfigureFn>,
    send_transport: OneShot<Arc<dyn SendTransportProvider>>,
}

impl MediatorConfigurator {
    pub fn new(resolver: Arc<dyn Resolver>) -> Self {
        Self {
            resolver,
            scope_name: DEFAULT_SCOPE_NAME.to_string(),
            scope_hook: OneShot::new("scope configuration hook"),
            configure: OneShot::new("mediator configuration"),
            send_transport: OneShot::new("mediator send transport"),
        }
    }

    #[must_use]
    pub fn scope_name(&self) -> &str {
        &self.scope_name
    }

    pub fn set_scope_name(&mut self, name: impl Into<String>) -> Result<(), ConfigurationError> {
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
        self.scope_hook.set(Arc::new(hook))
    }

    /// Register the mediator's handlers. Can be set once; runs at build.
    pub fn configure_mediator<F>(&mut self, configure: F) -> Result<(), ConfigurationError>
    where
        F: FnOnce(&mut ReceiveEndpointConfigurator) + Send + 'static,
    {
        self.configure.set(Box::new(configure))
    }

    /// Route handler `send`/`publish` calls through `transport`. Can be set
    /// once. The mediator keeps the transport alive.
    pub fn set_send_transport(
        &mut self,
        transport: Arc<dyn SendTransportProvider>,
    ) -> Result<(), ConfigurationError> {
        self.send_transport.set(transport)
    }

    /// Build the mediator and its scope provider.
    ///
    /// Validation warnings are logged; errors fail the build.
    pub fn build(mut self) -> Result<Mediator, ConfigurationError> {
        let mut endpoint = ReceiveEndpointConfigurator::new(MEDIATOR_ENDPOINT);
        if let Some(configure) = self.configure.take() {
            configure(&mut endpoint);
        }

        let results = endpoint.validate();
        if results.iter().any(ValidationResult::is_error) {
            return Err(ConfigurationError::Invalid(results));
        }
        for warning in &results {
            debug!(source = %warning.source(), "{}", warning.message());
        }

        let scope_provider: Arc<dyn ScopeProvider> = Arc::new(ContainerScopeProvider::new(
            self.resolver,
            self.scope_name,
            self.scope_hook.take(),
        ));
        let send_transport = self.send_transport.take();
        let publisher = send_transport.as_ref().map(|transport| {
            Arc::new(MessagePublisher::new(transport, &PipeConfiguration::default()))
        });
        let pipe = Arc::new(ConsumePipe::new(
            Vec::new(),
            Some(Arc::clone(&scope_provider)),
            publisher,
        ));

        info!(
            handlers = endpoint.handler_count(),
            scope_name = %scope_provider.scope_name(),
            can_publish = send_transport.is_some(),
            "Mediator built"
        );
        Ok(Mediator {
            endpoint: endpoint.definition().clone().into_endpoint(pipe),
            scope_provider,
            _send_transport: send_transport,
        })
    }
}

impl fmt::Debug for MediatorConfigurator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediatorConfigurator")
            .field("scope_name", &self.scope_name)
            .field("scope_hook", &self.scope_hook.is_set())
            .field("configured", &self.configure.is_set())
            .field("send_transport", &self.send_transport.is_set())
            .finish_non_exhaustive()
    }
}

/// Inline, scoped message dispatch.
///
/// Without a send transport, handler calls to [`ConsumeContext::send`] and
/// [`ConsumeContext::publish`] fail with [`TransportError::NoPublisher`].
///
/// [`ConsumeContext::send`]: crate::handler::ConsumeContext::send
/// [`ConsumeContext::publish`]: crate::handler::ConsumeContext::publish
pub struct Mediator {
    endpoint: ReceiveEndpoint,
    scope_provider: Arc<dyn ScopeProvider>,
    _send_transport: Option<Arc<dyn SendTransportProvider>>,
}

impl Mediator {
    /// Run the handlers for `envelope` in a fresh message scope.
    ///
    /// Fails with [`TransportError::NoHandler`] when nothing handles the type.
    pub async fn send(&self, envelope: Envelope) -> Result<(), BusError> {
        let handlers = self
            .endpoint
            .handlers_for(&envelope.message_type)
            .ok_or_else(|| TransportError::NoHandler(envelope.message_type.clone()))?;
        self.endpoint.pipe().dispatch(envelope, handlers).await
    }

    #[must_use]
    pub fn handles(&self, message_type: &str) -> bool {
        self.endpoint.handles(message_type)
    }

    /// The mediator's only scope provider.
    #[must_use]
    pub fn scope_provider(&self) -> &Arc<dyn ScopeProvider> {
        &self.scope_provider
    }
}

impl fmt::Debug for Mediator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mediator")
            .field("endpoint", &self.endpoint)
            .field("scope_name", &self.scope_provider.scope_name())
            .finish()
    }
}
