//! Event model error types.

use thiserror::Error;

/// Errors raised while constructing security events.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    /// A mandatory field was not supplied to the builder.
    #[error("Security event is missing required field: {field}")]
    MissingField {
        /// Name of the missing field.
        field: &'static str,
    },

    /// A severity string could not be parsed.
    #[error("Unknown severity level: {0}")]
    UnknownSeverity(String),

    /// An event type string could not be parsed.
    #[error("Unknown security event type: {0}")]
    UnknownEventType(String),
}

impl EventError {
    /// Creates a new `MissingField` error.
    #[must_use]
    pub fn missing_field(field: &'static str) -> Self {
        Self::MissingField { field }
    }
}

/// Result alias for event model operations.
pub type EventResult<T> = Result<T, EventError>;
