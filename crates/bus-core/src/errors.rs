//! # Error Types
//!
//! Errors raised while configuring, building and running a bus.
//!
//! Validation problems are *reported* through [`crate::ValidationResult`]
//! and never raised; everything here is returned from the call that
//! violated a contract or failed at runtime.

use std::fmt;

use thiserror::Error;

use crate::validation::ValidationResult;

/// Errors raised synchronously by configurators and builders.
#[derive(Debug, Clone, Error)]
pub enum ConfigurationError {
    /// An apply-once value was set a second time.
    #[error("{0} has already been configured")]
    AlreadyConfigured(&'static str),

    /// The configurator already produced a bus and cannot be mutated or rebuilt.
    #[error("the configurator has already built a bus")]
    AlreadyBuilt,

    /// A required argument was empty.
    #[error("required argument `{0}` was not supplied")]
    MissingArgument(&'static str),

    /// Validation reported at least one error-level result.
    #[error("configuration is invalid: {}", summarize(.0))]
    Invalid(Vec<ValidationResult>),

    /// Two receive endpoints share the same queue name.
    #[error("receive endpoint `{0}` is already registered")]
    DuplicateEndpoint(String),

    /// Endpoints can only be connected while the host is not running.
    #[error("host {0} is running or stopping")]
    HostRunning(String),
}

fn summarize(results: &[ValidationResult]) -> String {
    results
        .iter()
        .filter(|r| r.is_error())
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// The container could not produce a scope.
#[derive(Debug, Clone, Error)]
pub enum ScopeCreationError {
    /// The root scope could not be resolved.
    #[error("root scope unavailable: {0}")]
    RootUnavailable(String),

    /// A child scope could not be created under the root.
    #[error("failed to create `{tag}` scope: {reason}")]
    ChildScope { tag: String, reason: String },
}

/// Failure of a single host's lifecycle operation.
#[derive(Debug, Clone, Error)]
pub enum HostError {
    /// The host failed to start.
    #[error("host {address} failed to start: {reason}")]
    StartFailed { address: String, reason: String },

    /// The host failed to stop cleanly.
    #[error("host {address} failed to stop: {reason}")]
    StopFailed { address: String, reason: String },

    /// In-flight deliveries did not drain in time and were abandoned.
    #[error("host {address} abandoned {abandoned} in-flight deliveries after drain timeout")]
    DrainTimeout { address: String, abandoned: usize },
}

/// Combined start failed; hosts started before the failure were stopped again.
#[derive(Debug, Clone)]
pub struct HostStartError {
    /// The failure that aborted the combined start.
    pub failure: HostError,
    /// Failures raised while stopping the hosts that had already started.
    pub rollback_failures: Vec<HostError>,
}

impl fmt::Display for HostStartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bus start failed: {}", self.failure)?;
        if !self.rollback_failures.is_empty() {
            write!(f, " (rollback: {})", join(&self.rollback_failures))?;
        }
        Ok(())
    }
}

impl std::error::Error for HostStartError {}

/// One or more hosts failed to stop cleanly. Every host was still asked to stop.
#[derive(Debug, Clone)]
pub struct HostStopError {
    pub failures: Vec<HostError>,
}

impl fmt::Display for HostStopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} host(s) failed to stop: {}",
            self.failures.len(),
            join(&self.failures)
        )
    }
}

impl std::error::Error for HostStopError {}

fn join(errors: &[HostError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors from moving an envelope to its destination.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No receive endpoint is connected under this queue name.
    #[error("no receive endpoint named `{0}`")]
    UnknownQueue(String),

    /// The send transport was dropped together with its bus.
    #[error("send transport is no longer available")]
    TransportClosed,

    /// Send/publish is not available in this context.
    #[error("no publisher is attached to this context")]
    NoPublisher,

    /// The mediator has no handler for the message type.
    #[error("no handler registered for message type `{0}`")]
    NoHandler(String),
}

/// A message handler failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("handler for `{message_type}` failed: {reason}")]
pub struct HandlerError {
    pub message_type: String,
    pub reason: String,
}

impl HandlerError {
    pub fn new(message_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            message_type: message_type.into(),
            reason: reason.into(),
        }
    }
}

/// Umbrella error for bus operations.
#[derive(Debug, Clone, Error)]
pub enum BusError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Scope(#[from] ScopeCreationError),

    #[error(transparent)]
    HostStart(#[from] HostStartError),

    #[error(transparent)]
    HostStop(#[from] HostStopError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Handler(#[from] HandlerError),
}
