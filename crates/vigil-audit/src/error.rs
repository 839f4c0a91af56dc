//! Audit pipeline error types.
//!
//! None of these ever reach a request caller. They surface only from the
//! fallible internals (`AuditWriter::try_write`, sinks, publishers) and are
//! logged and dropped by the logger entry points.

/// Errors that can occur while recording or publishing audit events.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// The audit sink failed to persist or read a record.
    #[error("Audit storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
    },

    /// The alert fanout rejected an event.
    #[error("Alert publish error: {message}")]
    Publish {
        /// Description of the publish failure.
        message: String,
    },

    /// No record exists with the given persisted id.
    #[error("Audit record not found: {id}")]
    NotFound {
        /// The persisted id that was looked up.
        id: u64,
    },

    /// The audit configuration is invalid.
    #[error("Audit configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },
}

impl AuditError {
    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Publish` error.
    #[must_use]
    pub fn publish(message: impl Into<String>) -> Self {
        Self::Publish {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}
