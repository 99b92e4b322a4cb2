//! # Validation Results
//!
//! Configuration problems are collected lazily by `validate()` calls and
//! reported as values. Building with unresolved errors is a caller
//! contract violation, not something the builder re-checks.

use std::fmt;

/// Severity of a validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationKind {
    /// The bus cannot work as configured.
    Error,
    /// The bus works, but probably not as intended.
    Warning,
}

/// A single finding reported by a configurator or specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    kind: ValidationKind,
    source: String,
    message: String,
}

impl ValidationResult {
    pub fn error(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ValidationKind::Error, source, message)
    }

    pub fn warning(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ValidationKind::Warning, source, message)
    }

    fn new(kind: ValidationKind, source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            source: source.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ValidationKind {
        self.kind
    }

    /// Name of the specification that produced this result.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.kind == ValidationKind::Error
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ValidationKind::Error => "error",
            ValidationKind::Warning => "warning",
        };
        write!(f, "[{kind}] {}: {}", self.source, self.message)
    }
}

/// True when any result is error-level.
#[must_use]
pub fn has_errors(results: &[ValidationResult]) -> bool {
    results.iter().any(ValidationResult::is_error)
}
