//! # Message Envelope
//!
//! Everything that travels through the bus is wrapped in an [`Envelope`].
//! The body is an opaque JSON document; handlers decode it into their own
//! types with [`Envelope::decode`].

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A message plus its ambient context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique id of this message.
    pub message_id: Uuid,
    /// Correlation id linking a conversation of messages.
    pub correlation_id: Option<Uuid>,
    /// Logical message type used for routing to handlers.
    pub message_type: String,
    /// Queue the envelope was sent to. Empty until sent or published.
    pub destination: String,
    /// Free-form headers.
    pub headers: HashMap<String, String>,
    /// Message body.
    pub body: serde_json::Value,
}

impl Envelope {
    /// Create an envelope with a fresh message id.
    pub fn new(message_type: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            correlation_id: None,
            message_type: message_type.into(),
            destination: String::new(),
            headers: HashMap::new(),
            body,
        }
    }

    /// Serialize `message` into the body of a new envelope.
    pub fn from_message<T: Serialize>(
        message_type: impl Into<String>,
        message: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(message_type, serde_json::to_value(message)?))
    }

    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// Decode the body into a concrete message type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.body.clone())
    }

    /// Build a follow-up message that inherits this envelope's correlation.
    ///
    /// The correlation id falls back to this message's id.
    #[must_use]
    pub fn follow_up(&self, message_type: impl Into<String>, body: serde_json::Value) -> Self {
        let mut next = Self::new(message_type, body);
        next.correlation_id = Some(self.correlation_id.unwrap_or(self.message_id));
        next
    }
}
