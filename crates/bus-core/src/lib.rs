//! # Bus Core - Bus Assembly and Message Scopes
//!
//! Builds a runnable message bus from deferred configuration fragments and
//! gives every consumed message its own disposable resolution scope.
//!
//! ## Build Protocol
//!
//! ```text
//! ┌────────────────────────┐   build()   ┌────────────────────┐
//! │ InMemoryBusConfigurator│ ──────────▶ │ InMemoryBusBuilder │
//! │  specifications [1..n] │  apply 1..n │  hosts, endpoints  │
//! └────────────────────────┘             └─────────┬──────────┘
//!                                                  │ build()
//!                                                  ▼
//!                                   ┌──────────────────────────┐
//!                                   │ Bus                      │
//!                                   │  HostCollection          │
//!                                   │  start_all / stop_all    │
//!                                   └──────────────────────────┘
//! ```
//!
//! ## Message Scopes
//!
//! ```text
//!  envelope ──▶ ConsumePipe ──open──▶ ScopeProvider ──▶ child of root scope
//!                   │                                        │
//!                   └── handlers (ScopeView) ──── close ─────┘
//! ```
//!
//! - **One scope per delivery:** opened before the first handler, released
//!   exactly once after the last, on success, failure or cancellation.
//! - **Shared root:** every message scope descends from a single lazily
//!   created root scope.
//! - **Deferred configuration:** nothing is applied until `build()`; a
//!   configurator builds at most one bus.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod builder;
pub mod bus;
pub mod config;
pub mod configurator;
pub mod endpoint;
pub mod envelope;
pub mod errors;
pub mod handler;
pub mod host;
pub mod mediator;
mod one_shot;
pub mod pipe;
pub mod scope;
pub mod specification;
pub mod transport;
pub mod validation;

// Re-export main types
pub use builder::{BusBuilder, InMemoryBusBuilder};
pub use bus::Bus;
pub use config::{InMemoryTransportConfig, DEFAULT_ADDRESS, DEFAULT_DRAIN_TIMEOUT};
pub use configurator::{create_in_memory_bus, InMemoryBusConfigurator};
pub use endpoint::{ReceiveEndpointConfigurator, ReceiveEndpointDefinition};
pub use envelope::Envelope;
pub use errors::{
    BusError, ConfigurationError, HandlerError, HostError, HostStartError, HostStopError,
    ScopeCreationError, TransportError,
};
pub use handler::{handler_fn, ConsumeContext, MessageHandler};
pub use host::{BusHost, HostCollection, HostStatus};
pub use mediator::{Mediator, MediatorConfigurator};
pub use pipe::{ConsumePipe, EnvelopeFilter, MessagePublisher, PipeConfiguration};
pub use scope::{
    ContainerScopeProvider, MessageScope, Resolver, RootScopeProvider, ScopeConfigurationHook,
    ScopeHandle, ScopeId, ScopeProvider, ScopeRegistrations, ScopeView, ServiceContainer,
};
pub use specification::{
    specification_fn, BusFactorySpecification, FnSpecification, InMemoryBusFactorySpecification,
    SpecificationAdapter,
};
pub use transport::{InMemoryHost, ReceiveEndpoint, SendTransportProvider};
pub use validation::{has_errors, ValidationKind, ValidationResult};

/// Tag given to message scopes unless configured otherwise.
pub const DEFAULT_SCOPE_NAME: &str = "message";

/// Tag of the root scope every message scope descends from.
pub const ROOT_SCOPE_NAME: &str = "root";
