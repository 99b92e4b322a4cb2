//! Per-message scope provider.
//!
//! ```text
//!   dispatch ──open(envelope)──▶ ScopeProvider
//!                                 │  registrations + hook
//!                                 ▼
//!                     Resolver::create_child_scope(root)
//!                                 │
//!   handlers ◀── ScopeView ── MessageScope ──drop/close──▶ Resolver::dispose
//! ```
//!
//! A [`MessageScope`] is an RAII guard: it disposes its scope exactly once,
//! on `close()` or on drop, so handler errors, panics and cancelled
//! deliveries all release the scope.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::envelope::Envelope;
use crate::errors::ScopeCreationError;
use crate::scope::resolver::{Resolver, ScopeHandle, ScopeId, ScopeRegistrations};
use crate::scope::root::RootScopeProvider;

/// Customizes each message scope before it is created.
///
/// Supplied once at configuration time and invoked on every open.
pub type ScopeConfigurationHook = Arc<dyn Fn(&mut ScopeRegistrations, &Envelope) + Send + Sync>;

/// Produces one disposable scope per inbound message.
pub trait ScopeProvider: Send + Sync {
    /// Open a scope for `envelope`. Nothing needs releasing on error.
    fn open(&self, envelope: &Envelope) -> Result<MessageScope, ScopeCreationError>;

    /// Diagnostic tag given to every scope this provider opens.
    fn scope_name(&self) -> &str;
}

/// Scope provider backed by a [`Resolver`], parenting every scope on the
/// root scope of its [`RootScopeProvider`].
pub struct ContainerScopeProvider {
    root: RootScopeProvider,
    scope_name: String,
    configure: Option<ScopeConfigurationHook>,
}

impl ContainerScopeProvider {
    pub fn new(
        resolver: Arc<dyn Resolver>,
        scope_name: impl Into<String>,
        configure: Option<ScopeConfigurationHook>,
    ) -> Self {
        Self {
            root: RootScopeProvider::new(resolver),
            scope_name: scope_name.into(),
            configure,
        }
    }

    pub fn root(&self) -> &RootScopeProvider {
        &self.root
    }
}

impl ScopeProvider for ContainerScopeProvider {
    fn open(&self, envelope: &Envelope) -> Result<MessageScope, ScopeCreationError> {
        let parent = self.root.current()?;

        let mut registrations = ScopeRegistrations::new();
        registrations.insert(envelope.clone());
        if let Some(configure) = &self.configure {
            configure(&mut registrations, envelope);
        }

        let resolver = self.root.resolver();
        let handle = resolver.create_child_scope(parent, &self.scope_name, registrations)?;
        debug!(
            scope = %handle.id(),
            tag = %self.scope_name,
            message_id = %envelope.message_id,
            "Message scope opened"
        );

        Ok(MessageScope::new(Arc::clone(resolver), handle))
    }

    fn scope_name(&self) -> &str {
        &self.scope_name
    }
}

impl fmt::Debug for ContainerScopeProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerScopeProvider")
            .field("scope_name", &self.scope_name)
            .field("configured", &self.configure.is_some())
            .finish_non_exhaustive()
    }
}

/// Exclusive ownership of one open message scope.
pub struct MessageScope {
    resolver: Arc<dyn Resolver>,
    handle: ScopeHandle,
    released: bool,
}

impl MessageScope {
    pub fn new(resolver: Arc<dyn Resolver>, handle: ScopeHandle) -> Self {
        Self {
            resolver,
            handle,
            released: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> ScopeId {
        self.handle.id()
    }

    #[must_use]
    pub fn handle(&self) -> &ScopeHandle {
        &self.handle
    }

    #[must_use]
    pub fn resolve<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.resolver.resolve_typed::<T>(&self.handle)
    }

    /// A non-owning view handed to handlers.
    #[must_use]
    pub fn view(&self) -> ScopeView {
        ScopeView {
            resolver: Arc::clone(&self.resolver),
            handle: self.handle.clone(),
        }
    }

    /// Release the scope now.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.resolver.dispose(&self.handle);
        debug!(scope = %self.handle.id(), "Message scope released");
    }
}

impl Drop for MessageScope {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for MessageScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageScope")
            .field("handle", &self.handle)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

/// Resolution access to a message scope without ownership.
///
/// Resolving through a view after its scope was released yields `None`
/// for anything scoped to that message.
#[derive(Clone)]
pub struct ScopeView {
    resolver: Arc<dyn Resolver>,
    handle: ScopeHandle,
}

impl ScopeView {
    #[must_use]
    pub fn id(&self) -> ScopeId {
        self.handle.id()
    }

    #[must_use]
    pub fn tag(&self) -> &str {
        self.handle.tag()
    }

    #[must_use]
    pub fn resolve<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.resolver.resolve_typed::<T>(&self.handle)
    }
}

impl fmt::Debug for ScopeView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeView")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}
