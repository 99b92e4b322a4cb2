//! # Message Handlers
//!
//! Handlers receive a [`ConsumeContext`]: the envelope, a view of the
//! message scope (when the bus uses message scopes) and a publisher for
//! follow-up messages.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::envelope::Envelope;
use crate::errors::{HandlerError, TransportError};
use crate::pipe::MessagePublisher;
use crate::scope::ScopeView;

/// Handles one message type on a receive endpoint.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, context: &ConsumeContext) -> Result<(), HandlerError>;
}

/// Adapter turning an async closure into a [`MessageHandler`].
pub struct HandlerFn<F> {
    f: F,
}

/// Wrap an async closure as a handler.
///
/// ```rust,ignore
/// let handler = handler_fn(|context: ConsumeContext| async move {
///     let order: SubmitOrder = context.decode()?;
///     Ok(())
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn MessageHandler>
where
    F: Fn(ConsumeContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(HandlerFn { f })
}

#[async_trait]
impl<F, Fut> MessageHandler for HandlerFn<F>
where
    F: Fn(ConsumeContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    async fn handle(&self, context: &ConsumeContext) -> Result<(), HandlerError> {
        (self.f)(context.clone()).await
    }
}

/// Everything a handler can see about the message it is consuming.
#[derive(Clone)]
pub struct ConsumeContext {
    envelope: Envelope,
    scope: Option<ScopeView>,
    publisher: Option<Arc<MessagePublisher>>,
}

impl ConsumeContext {
    pub fn new(
        envelope: Envelope,
        scope: Option<ScopeView>,
        publisher: Option<Arc<MessagePublisher>>,
    ) -> Self {
        Self {
            envelope,
            scope,
            publisher,
        }
    }

    #[must_use]
    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    #[must_use]
    pub fn message_type(&self) -> &str {
        &self.envelope.message_type
    }

    /// Decode the body, mapping failures to a [`HandlerError`].
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        self.envelope
            .decode()
            .map_err(|e| HandlerError::new(self.message_type(), e.to_string()))
    }

    /// The message scope, if the bus opens one per message.
    #[must_use]
    pub fn scope(&self) -> Option<&ScopeView> {
        self.scope.as_ref()
    }

    /// Resolve a dependency from the message scope.
    #[must_use]
    pub fn resolve<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.scope.as_ref().and_then(ScopeView::resolve::<T>)
    }

    /// Send a follow-up message to a queue.
    pub fn send(&self, destination: &str, envelope: Envelope) -> Result<(), TransportError> {
        self.publisher()?.send(destination, envelope)
    }

    /// Publish a follow-up message to every interested endpoint.
    pub fn publish(&self, envelope: Envelope) -> Result<usize, TransportError> {
        self.publisher()?.publish(envelope)
    }

    fn publisher(&self) -> Result<&MessagePublisher, TransportError> {
        self.publisher
            .as_deref()
            .ok_or(TransportError::NoPublisher)
    }
}

impl fmt::Debug for ConsumeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumeContext")
            .field("envelope", &self.envelope)
            .field("scope", &self.scope)
            .field("publisher", &self.publisher.is_some())
            .finish()
    }
}
