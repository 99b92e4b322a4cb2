//! A small in-process [`Resolver`].
//!
//! Supports singletons (shared by every scope), scoped factories (one
//! instance per scope, created on first resolution and dropped with the
//! scope) and per-scope registrations supplied when a scope is opened.
//! Resolution looks in the scope, then its ancestors, then singletons.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::errors::ScopeCreationError;
use crate::scope::resolver::{Instance, Resolver, ScopeHandle, ScopeId, ScopeRegistrations};
use crate::ROOT_SCOPE_NAME;

type ScopedFactory = Arc<dyn Fn(&ScopeHandle) -> Instance + Send + Sync>;

struct ScopeEntry {
    handle: ScopeHandle,
    values: HashMap<TypeId, Instance>,
}

#[derive(Default)]
pub struct ServiceContainer {
    singletons: RwLock<HashMap<TypeId, Instance>>,
    scoped: RwLock<HashMap<TypeId, ScopedFactory>>,
    scopes: RwLock<HashMap<ScopeId, ScopeEntry>>,
    roots_created: AtomicUsize,
    children_created: AtomicUsize,
    disposed: AtomicUsize,
}

impl ServiceContainer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a value shared by every scope.
    pub fn register_singleton<T: Any + Send + Sync>(&self, value: T) {
        self.singletons
            .write()
            .insert(TypeId::of::<T>(), Arc::new(value));
    }

    /// Register an already shared value for every scope.
    pub fn register_shared<T: Any + Send + Sync>(&self, value: Arc<T>) {
        self.singletons.write().insert(TypeId::of::<T>(), value);
    }

    /// Register a factory producing one `T` per scope.
    pub fn register_scoped<T, F>(&self, factory: F)
    where
        T: Any + Send + Sync,
        F: Fn(&ScopeHandle) -> T + Send + Sync + 'static,
    {
        let erased: ScopedFactory =
            Arc::new(move |scope: &ScopeHandle| -> Instance { Arc::new(factory(scope)) });
        self.scoped.write().insert(TypeId::of::<T>(), erased);
    }

    /// Number of scopes currently alive (root included).
    #[must_use]
    pub fn live_scopes(&self) -> usize {
        self.scopes.read().len()
    }

    #[must_use]
    pub fn roots_created(&self) -> usize {
        self.roots_created.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn children_created(&self) -> usize {
        self.children_created.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn disposed(&self) -> usize {
        self.disposed.load(Ordering::SeqCst)
    }

    fn lookup(&self, scope: ScopeId, type_id: TypeId) -> Option<Instance> {
        let scopes = self.scopes.read();
        let mut cursor = scopes.get(&scope);
        while let Some(entry) = cursor {
            if let Some(instance) = entry.values.get(&type_id) {
                return Some(Arc::clone(instance));
            }
            cursor = entry.handle.parent().and_then(|parent| scopes.get(&parent));
        }
        None
    }
}

impl Resolver for ServiceContainer {
    fn root_scope(&self) -> Result<ScopeHandle, ScopeCreationError> {
        let handle = ScopeHandle::root(ROOT_SCOPE_NAME);
        self.scopes.write().insert(
            handle.id(),
            ScopeEntry {
                handle: handle.clone(),
                values: HashMap::new(),
            },
        );
        self.roots_created.fetch_add(1, Ordering::SeqCst);
        Ok(handle)
    }

    fn create_child_scope(
        &self,
        parent: &ScopeHandle,
        tag: &str,
        registrations: ScopeRegistrations,
    ) -> Result<ScopeHandle, ScopeCreationError> {
        let mut scopes = self.scopes.write();
        if !scopes.contains_key(&parent.id()) {
            return Err(ScopeCreationError::ChildScope {
                tag: tag.to_string(),
                reason: format!("parent scope {} is not alive", parent.id()),
            });
        }

        let handle = ScopeHandle::child(registrations.scope_id(), tag, parent);
        scopes.insert(
            handle.id(),
            ScopeEntry {
                handle: handle.clone(),
                values: registrations.into_values(),
            },
        );
        self.children_created.fetch_add(1, Ordering::SeqCst);
        Ok(handle)
    }

    fn resolve(&self, scope: &ScopeHandle, type_id: TypeId) -> Option<Instance> {
        if let Some(instance) = self.lookup(scope.id(), type_id) {
            return Some(instance);
        }

        let factory = self.scoped.read().get(&type_id).cloned();
        if let Some(factory) = factory {
            // Run the factory unlocked; it may resolve from the container itself.
            let created = factory(scope);
            let mut scopes = self.scopes.write();
            let entry = scopes.get_mut(&scope.id())?;
            let instance = entry.values.entry(type_id).or_insert(created);
            return Some(Arc::clone(instance));
        }

        self.singletons.read().get(&type_id).cloned()
    }

    fn dispose(&self, scope: &ScopeHandle) {
        // Dropping the entry drops every scoped instance it owns.
        let removed = self.scopes.write().remove(&scope.id());
        match removed {
            Some(_) => {
                self.disposed.fetch_add(1, Ordering::SeqCst);
                debug!(scope = %scope.id(), tag = scope.tag(), "Scope disposed");
            }
            None => warn!(scope = %scope.id(), "Dispose called for unknown scope"),
        }
    }
}
