//! Receive endpoint configuration.

use std::fmt;
use std::sync::Arc;

use crate::builder::BusBuilder;
use crate::errors::ConfigurationError;
use crate::handler::MessageHandler;
use crate::pipe::ConsumePipe;
use crate::specification::BusFactorySpecification;
use crate::transport::ReceiveEndpoint;
use crate::validation::ValidationResult;

/// Queue name plus handlers, ready to be connected to a transport.
#[derive(Clone)]
pub struct ReceiveEndpointDefinition {
    queue_name: String,
    handlers: Vec<(String, Arc<dyn MessageHandler>)>,
}

impl ReceiveEndpointDefinition {
    #[must_use]
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    #[must_use]
    pub fn message_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.iter().map(|(t, _)| t.as_str()).collect();
        types.sort_unstable();
        types.dedup();
        types
    }

    /// Bind the definition to a consume pipe.
    #[must_use]
    pub fn into_endpoint(self, pipe: Arc<ConsumePipe>) -> ReceiveEndpoint {
        self.handlers
            .into_iter()
            .fold(ReceiveEndpoint::new(self.queue_name, pipe), |endpoint, (message_type, handler)| {
                endpoint.with_handler(message_type, handler)
            })
    }
}

impl fmt::Debug for ReceiveEndpointDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceiveEndpointDefinition")
            .field("queue_name", &self.queue_name)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// Configures one receive endpoint; registered as a specification.
#[derive(Clone)]
pub struct ReceiveEndpointConfigurator {
    definition: ReceiveEndpointDefinition,
}

impl ReceiveEndpointConfigurator {
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            definition: ReceiveEndpointDefinition {
                queue_name: queue_name.into(),
                handlers: Vec::new(),
            },
        }
    }

    /// Handle `message_type` on this endpoint.
    pub fn handler(
        &mut self,
        message_type: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
    ) -> &mut Self {
        self.definition.handlers.push((message_type.into(), handler));
        self
    }

    #[must_use]
    pub fn queue_name(&self) -> &str {
        &self.definition.queue_name
    }

    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.definition.handlers.len()
    }

    #[must_use]
    pub fn definition(&self) -> &ReceiveEndpointDefinition {
        &self.definition
    }

    fn source(&self) -> String {
        if self.definition.queue_name.is_empty() {
            "receive endpoint".to_string()
        } else {
            format!("receive endpoint `{}`", self.definition.queue_name)
        }
    }
}

impl BusFactorySpecification for ReceiveEndpointConfigurator {
    fn validate(&self) -> Vec<ValidationResult> {
        let mut results = Vec::new();
        let source = self.source();

        if self.definition.queue_name.trim().is_empty() {
            results.push(ValidationResult::error(&source, "queue name must not be empty"));
        }
        if self.definition.handlers.is_empty() {
            results.push(ValidationResult::warning(&source, "no handlers are configured"));
        }
        if self.definition.handlers.iter().any(|(t, _)| t.is_empty()) {
            results.push(ValidationResult::error(
                &source,
                "handler message type must not be empty",
            ));
        }

        results
    }

    fn apply(&self, builder: &mut dyn BusBuilder) -> Result<(), ConfigurationError> {
        builder.add_receive_endpoint(self.definition.clone())
    }
}

impl fmt::Debug for ReceiveEndpointConfigurator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.definition, f)
    }
}
