//! Guard error types.
//!
//! Every expected validation failure maps to one [`GuardError`] variant.
//! `Display` and [`GuardError::public_message`] never include principal or
//! resource ids; the audit event is the only place those are recorded.

/// Failures returned by validation stages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardError {
    /// No credential accompanied the request.
    #[error("Authentication required")]
    AuthenticationMissing,

    /// The credential is not of the expected kind.
    #[error("Invalid credential type")]
    AuthenticationTypeInvalid,

    /// The credential subject is not a positive integer principal id.
    #[error("Invalid credential subject")]
    AuthenticationSubjectInvalid,

    /// The credential principal differs from the principal named in the path.
    #[error("Access denied")]
    IdentityMismatch,

    /// The principal already holds the maximum number of live sessions.
    #[error("Too many active sessions")]
    SessionCapExceeded,

    /// A stage failed for a reason the caller must not see.
    ///
    /// `detail` is logged server-side only.
    #[error("Internal error")]
    UnexpectedStageFailure { stage: String, detail: String },
}

impl GuardError {
    /// Creates an unexpected stage failure.
    #[must_use]
    pub fn unexpected(stage: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::UnexpectedStageFailure {
            stage: stage.into(),
            detail: detail.into(),
        }
    }

    /// Caller-safe message for this error.
    #[must_use]
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::AuthenticationMissing => "authentication required",
            Self::AuthenticationTypeInvalid | Self::AuthenticationSubjectInvalid => {
                "invalid authentication"
            }
            Self::IdentityMismatch => "access denied",
            Self::SessionCapExceeded => "too many active sessions",
            Self::UnexpectedStageFailure { .. } => "internal error",
        }
    }

    /// Returns the error category for logging and monitoring.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::AuthenticationMissing
            | Self::AuthenticationTypeInvalid
            | Self::AuthenticationSubjectInvalid => ErrorCategory::Authentication,
            Self::IdentityMismatch => ErrorCategory::Authorization,
            Self::SessionCapExceeded => ErrorCategory::Session,
            Self::UnexpectedStageFailure { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns `true` if the failure indicates an active attack.
    #[must_use]
    pub fn is_attack_signal(&self) -> bool {
        matches!(self, Self::IdentityMismatch)
    }

    /// Guard failures are never retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        false
    }
}

/// Categories of guard errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Credential missing or malformed.
    Authentication,
    /// Credential valid but not allowed to act on the target.
    Authorization,
    /// Session cap enforcement.
    Session,
    /// Internal failures.
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::Session => "session",
            Self::Internal => "internal",
        }
    }
}

/// Type alias for guard results.
pub type GuardResult<T> = Result<T, GuardError>;
