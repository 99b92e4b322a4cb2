//! Root scope provider.
//!
//! One per bus (or mediator). The root scope is resolved lazily the first
//! time a message scope needs a parent, then cached until the provider is
//! dropped, at which point it is disposed.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::debug;

use crate::errors::ScopeCreationError;
use crate::scope::resolver::{Resolver, ScopeHandle};

pub struct RootScopeProvider {
    resolver: Arc<dyn Resolver>,
    root: OnceCell<ScopeHandle>,
}

impl RootScopeProvider {
    pub fn new(resolver: Arc<dyn Resolver>) -> Self {
        Self {
            resolver,
            root: OnceCell::new(),
        }
    }

    /// The root scope, resolved on first use.
    ///
    /// Concurrent first callers race on a single initialization; a failed
    /// resolution is not cached and the next call retries.
    pub fn current(&self) -> Result<&ScopeHandle, ScopeCreationError> {
        self.root.get_or_try_init(|| {
            let root = self.resolver.root_scope()?;
            debug!(scope = %root.id(), "Root scope resolved");
            Ok(root)
        })
    }

    /// Whether the root scope has been resolved yet.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.root.get().is_some()
    }

    pub fn resolver(&self) -> &Arc<dyn Resolver> {
        &self.resolver
    }
}

impl Drop for RootScopeProvider {
    fn drop(&mut self) {
        let Some(root) = self.root.take() else {
            return;
        };
        debug!(scope = %root.id(), "Disposing root scope");
        self.resolver.dispose(&root);
    }
}

impl std::fmt::Debug for RootScopeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootScopeProvider")
            .field("root", &self.root.get())
            .finish_non_exhaustive()
    }
}
