//! Domain error model.

use thiserror::Error;

/// Result type used by business-rule checks.
pub type ValidationResult<T = ()> = Result<T, ValidationError>;

/// A business-rule violation on input data.
///
/// This is the only failure the domain layer produces on its own. It carries a
/// human-readable message meant to be shown to the caller unchanged.
/// Infrastructure failures belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// An identifier could not be parsed from its textual form.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid identifier: {0}")]
pub struct InvalidId(pub String);
