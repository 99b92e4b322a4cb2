//! # Bus Specifications
//!
//! A specification is a deferred configuration action: it can report
//! problems through `validate()` and later mutates a builder through
//! `apply()`. Nothing happens when a specification is registered.
//!
//! Two flavours exist:
//!
//! - [`BusFactorySpecification`] only needs the generic [`BusBuilder`]
//!   capabilities and works with any transport.
//! - [`InMemoryBusFactorySpecification`] needs the in-memory builder.
//!
//! [`SpecificationAdapter`] lets a generic specification stand in wherever
//! an in-memory one is required.

use std::fmt;

use crate::builder::{BusBuilder, InMemoryBusBuilder};
use crate::errors::ConfigurationError;
use crate::validation::ValidationResult;

/// Transport-agnostic configuration fragment.
pub trait BusFactorySpecification: Send + Sync {
    fn validate(&self) -> Vec<ValidationResult>;

    fn apply(&self, builder: &mut dyn BusBuilder) -> Result<(), ConfigurationError>;
}

/// Configuration fragment for the in-memory transport.
pub trait InMemoryBusFactorySpecification: Send + Sync {
    fn validate(&self) -> Vec<ValidationResult>;

    fn apply(&self, builder: &mut InMemoryBusBuilder) -> Result<(), ConfigurationError>;
}

/// Presents a [`BusFactorySpecification`] as an in-memory one.
pub struct SpecificationAdapter {
    inner: Box<dyn BusFactorySpecification>,
}

impl SpecificationAdapter {
    pub fn new(inner: Box<dyn BusFactorySpecification>) -> Self {
        Self { inner }
    }
}

impl InMemoryBusFactorySpecification for SpecificationAdapter {
    fn validate(&self) -> Vec<ValidationResult> {
        self.inner.validate()
    }

    fn apply(&self, builder: &mut InMemoryBusBuilder) -> Result<(), ConfigurationError> {
        self.inner.apply(builder)
    }
}

impl fmt::Debug for SpecificationAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpecificationAdapter").finish_non_exhaustive()
    }
}

type ApplyFn = Box<dyn Fn(&mut InMemoryBusBuilder) -> Result<(), ConfigurationError> + Send + Sync>;

/// Closure-backed in-memory specification that never reports problems.
pub struct FnSpecification {
    apply: ApplyFn,
}

/// Wrap a closure as an in-memory specification.
pub fn specification_fn<F>(apply: F) -> FnSpecification
where
    F: Fn(&mut InMemoryBusBuilder) -> Result<(), ConfigurationError> + Send + Sync + 'static,
{
    FnSpecification {
        apply: Box::new(apply),
    }
}

impl InMemoryBusFactorySpecification for FnSpecification {
    fn validate(&self) -> Vec<ValidationResult> {
        Vec::new()
    }

    fn apply(&self, builder: &mut InMemoryBusBuilder) -> Result<(), ConfigurationError> {
        (self.apply)(builder)
    }
}

impl fmt::Debug for FnSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSpecification").finish_non_exhaustive()
    }
}
