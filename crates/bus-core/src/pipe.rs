//! # Consume / Send / Publish Pipes
//!
//! The execution path for a single message is intentionally small: an
//! ordered list of [`EnvelopeFilter`]s, then (for consumption) one message
//! scope wrapped around the handler chain.

use std::fmt;
use std::sync::{Arc, Weak};

use tracing::{debug, warn};

use crate::envelope::Envelope;
use crate::errors::{BusError, TransportError};
use crate::handler::{ConsumeContext, MessageHandler};
use crate::scope::ScopeProvider;
use crate::transport::SendTransportProvider;

/// Mutates an envelope as it passes through a pipe.
pub trait EnvelopeFilter: Send + Sync {
    fn apply(&self, envelope: &mut Envelope);
}

impl<F> EnvelopeFilter for F
where
    F: Fn(&mut Envelope) + Send + Sync,
{
    fn apply(&self, envelope: &mut Envelope) {
        self(envelope);
    }
}

/// Filters contributed to the consume, send and publish pipes.
#[derive(Clone, Default)]
pub struct PipeConfiguration {
    pub consume: Vec<Arc<dyn EnvelopeFilter>>,
    pub send: Vec<Arc<dyn EnvelopeFilter>>,
    pub publish: Vec<Arc<dyn EnvelopeFilter>>,
}

impl fmt::Debug for PipeConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeConfiguration")
            .field("consume", &self.consume.len())
            .field("send", &self.send.len())
            .field("publish", &self.publish.len())
            .finish()
    }
}

fn run_filters(filters: &[Arc<dyn EnvelopeFilter>], envelope: &mut Envelope) {
    for filter in filters {
        filter.apply(envelope);
    }
}

/// Outbound side of a bus: send and publish through their pipes.
///
/// Holds the send transport weakly; endpoints hold publishers for nested
/// sends, and the transport owns the endpoints.
pub struct MessagePublisher {
    transport: Weak<dyn SendTransportProvider>,
    send_filters: Vec<Arc<dyn EnvelopeFilter>>,
    publish_filters: Vec<Arc<dyn EnvelopeFilter>>,
}

impl MessagePublisher {
    pub fn new(transport: &Arc<dyn SendTransportProvider>, pipes: &PipeConfiguration) -> Self {
        Self {
            transport: Arc::downgrade(transport),
            send_filters: pipes.send.clone(),
            publish_filters: pipes.publish.clone(),
        }
    }

    pub fn send(&self, destination: &str, mut envelope: Envelope) -> Result<(), TransportError> {
        let transport = self.transport.upgrade().ok_or(TransportError::TransportClosed)?;
        run_filters(&self.send_filters, &mut envelope);
        envelope.destination = destination.to_string();
        debug!(
            destination,
            message_id = %envelope.message_id,
            message_type = %envelope.message_type,
            "Sending"
        );
        transport.deliver(destination, envelope)
    }

    pub fn publish(&self, mut envelope: Envelope) -> Result<usize, TransportError> {
        let transport = self.transport.upgrade().ok_or(TransportError::TransportClosed)?;
        run_filters(&self.publish_filters, &mut envelope);
        let message_type = envelope.message_type.clone();
        let receivers = transport.publish(envelope)?;
        if receivers == 0 {
            warn!(message_type = %message_type, "Published message had no receivers");
        }
        Ok(receivers)
    }
}

/// Inbound side: filters, one message scope, then the handler chain.
pub struct ConsumePipe {
    filters: Vec<Arc<dyn EnvelopeFilter>>,
    scope_provider: Option<Arc<dyn ScopeProvider>>,
    publisher: Option<Arc<MessagePublisher>>,
}

impl ConsumePipe {
    pub fn new(
        filters: Vec<Arc<dyn EnvelopeFilter>>,
        scope_provider: Option<Arc<dyn ScopeProvider>>,
        publisher: Option<Arc<MessagePublisher>>,
    ) -> Self {
        Self {
            filters,
            scope_provider,
            publisher,
        }
    }

    #[must_use]
    pub fn scope_provider(&self) -> Option<&Arc<dyn ScopeProvider>> {
        self.scope_provider.as_ref()
    }

    /// Run `handlers` for `envelope` inside a fresh message scope.
    ///
    /// Handlers run in order and the first failure ends the chain. The scope
    /// is released after the chain finishes, whatever the outcome; if this
    /// future is dropped mid-chain, the scope is released on drop.
    pub async fn dispatch(
        &self,
        mut envelope: Envelope,
        handlers: &[Arc<dyn MessageHandler>],
    ) -> Result<(), BusError> {
        run_filters(&self.filters, &mut envelope);

        let scope = match &self.scope_provider {
            Some(provider) => Some(provider.open(&envelope)?),
            None => None,
        };

        let context = ConsumeContext::new(
            envelope,
            scope.as_ref().map(|s| s.view()),
            self.publisher.clone(),
        );

        let mut outcome = Ok(());
        for handler in handlers {
            if let Err(e) = handler.handle(&context).await {
                outcome = Err(BusError::Handler(e));
                break;
            }
        }

        drop(context);
        if let Some(scope) = scope {
            scope.close();
        }
        outcome
    }
}

impl fmt::Debug for ConsumePipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumePipe")
            .field("filters", &self.filters.len())
            .field("scoped", &self.scope_provider.is_some())
            .field("publisher", &self.publisher.is_some())
            .finish()
    }
}
