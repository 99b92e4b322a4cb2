//! Container port.
//!
//! The bus never resolves dependencies itself. It talks to a [`Resolver`]
//! through opaque [`ScopeHandle`]s, so any container that can produce a
//! child scope and resolve typed values from it can back message scopes.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::errors::ScopeCreationError;

/// A resolved dependency.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Identity of a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(Uuid);

impl ScopeId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ScopeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque reference to a scope owned by a [`Resolver`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeHandle {
    id: ScopeId,
    tag: Arc<str>,
    parent: Option<ScopeId>,
}

impl ScopeHandle {
    /// Handle for a root scope.
    pub fn root(tag: &str) -> Self {
        Self {
            id: ScopeId::new(),
            tag: Arc::from(tag),
            parent: None,
        }
    }

    /// Handle for a child of `parent`, using a pre-allocated id.
    pub fn child(id: ScopeId, tag: &str, parent: &ScopeHandle) -> Self {
        Self {
            id,
            tag: Arc::from(tag),
            parent: Some(parent.id),
        }
    }

    #[must_use]
    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// Diagnostic tag (the provider's scope name for message scopes).
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    #[must_use]
    pub fn parent(&self) -> Option<ScopeId> {
        self.parent
    }
}

/// Values registered into a scope while it is being opened.
///
/// The provider registers the consumed [`crate::Envelope`]; the scope
/// configuration hook may add more. The id is fixed up front so the hook
/// can see which scope it is configuring.
pub struct ScopeRegistrations {
    scope_id: ScopeId,
    values: HashMap<TypeId, Instance>,
}

impl ScopeRegistrations {
    #[must_use]
    pub fn new() -> Self {
        Self {
            scope_id: ScopeId::new(),
            values: HashMap::new(),
        }
    }

    /// Id the scope will carry once created.
    #[must_use]
    pub fn scope_id(&self) -> ScopeId {
        self.scope_id
    }

    /// Register a value, replacing any previous value of the same type.
    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) {
        self.values.insert(TypeId::of::<T>(), Arc::new(value));
    }

    pub fn insert_arc<T: Any + Send + Sync>(&mut self, value: Arc<T>) {
        self.values.insert(TypeId::of::<T>(), value);
    }

    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.values
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|instance| instance.downcast::<T>().ok())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Hand the registered values to the container.
    pub fn into_values(self) -> HashMap<TypeId, Instance> {
        self.values
    }
}

impl Default for ScopeRegistrations {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ScopeRegistrations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeRegistrations")
            .field("scope_id", &self.scope_id)
            .field("values", &self.values.len())
            .finish()
    }
}

/// Dependency resolution container.
///
/// Implementations must allow `create_child_scope`, `resolve` and `dispose`
/// to be called concurrently from independent dispatch workers.
pub trait Resolver: Send + Sync {
    /// Produce the long-lived root scope. Called once per root provider.
    fn root_scope(&self) -> Result<ScopeHandle, ScopeCreationError>;

    /// Create a child of `parent` holding `registrations`.
    ///
    /// The returned handle must carry `registrations.scope_id()`.
    fn create_child_scope(
        &self,
        parent: &ScopeHandle,
        tag: &str,
        registrations: ScopeRegistrations,
    ) -> Result<ScopeHandle, ScopeCreationError>;

    /// Resolve a value of type `type_id` visible from `scope`.
    fn resolve(&self, scope: &ScopeHandle, type_id: TypeId) -> Option<Instance>;

    /// Release everything the scope acquired.
    fn dispose(&self, scope: &ScopeHandle);
}

impl dyn Resolver {
    /// Typed convenience over [`Resolver::resolve`].
    pub fn resolve_typed<T: Any + Send + Sync>(&self, scope: &ScopeHandle) -> Option<Arc<T>> {
        self.resolve(scope, TypeId::of::<T>())
            .and_then(|instance| instance.downcast::<T>().ok())
    }
}
