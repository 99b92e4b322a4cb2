//! Apply-once configuration values.

use crate::errors::ConfigurationError;

/// A value that may be set at most once.
///
/// The marker stays set after the value is taken, so a consumed value
/// cannot be replaced.
pub(crate) struct OneShot<T> {
    name: &'static str,
    value: Option<T>,
    set: bool,
}

impl<T> OneShot<T> {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            value: None,
            set: false,
        }
    }

    pub(crate) fn set(&mut self, value: T) -> Result<(), ConfigurationError> {
        if self.set {
            return Err(ConfigurationError::AlreadyConfigured(self.name));
        }
        self.set = true;
        self.value = Some(value);
        Ok(())
    }

    pub(crate) fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub(crate) fn take(&mut self) -> Option<T> {
        self.value.take()
    }

    pub(crate) fn is_set(&self) -> bool {
        self.set
    }
}
