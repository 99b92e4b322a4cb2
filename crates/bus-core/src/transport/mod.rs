//! # Transports
//!
//! Only the in-memory transport lives here. Other transports plug in by
//! implementing [`crate::BusHost`] and [`SendTransportProvider`].

pub mod in_memory;

pub use in_memory::{InMemoryHost, ReceiveEndpoint};

use crate::envelope::Envelope;
use crate::errors::TransportError;

/// Moves envelopes to receive endpoints.
pub trait SendTransportProvider: Send + Sync {
    /// Deliver to the endpoint named `destination`.
    fn deliver(&self, destination: &str, envelope: Envelope) -> Result<(), TransportError>;

    /// Deliver a copy to every endpoint handling the envelope's message type.
    ///
    /// Returns the number of endpoints the envelope was delivered to.
    fn publish(&self, envelope: Envelope) -> Result<usize, TransportError>;
}
