//! # Message Scopes
//!
//! Every inbound message gets its own disposable resolution scope, parented
//! on a single long-lived root scope.
//!
//! - [`resolver`]: the container port the bus talks to
//! - [`root`]: lazily resolved, cached root scope
//! - [`provider`]: opens and releases one scope per message
//! - [`container`]: a small in-process resolver

pub mod container;
pub mod provider;
pub mod resolver;
pub mod root;

pub use container::ServiceContainer;
pub use provider::{
    ContainerScopeProvider, MessageScope, ScopeConfigurationHook, ScopeProvider, ScopeView,
};
pub use resolver::{Instance, Resolver, ScopeHandle, ScopeId, ScopeRegistrations};
pub use root::RootScopeProvider;
