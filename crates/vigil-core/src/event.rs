//! Security event model.
//!
//! A [`SecurityEvent`] is created by a validation stage at decision time and
//! never mutated afterwards. Fields are private; the only way to obtain an
//! event is through [`SecurityEventBuilder::build`], which rejects events
//! without a type or severity.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{EventError, EventResult};
use crate::severity::SeverityLevel;

/// Ordered key/value details attached to an event.
pub type EventDetails = IndexMap<String, Value>;

// ============================================================================
// Event Types
// ============================================================================

/// Kind of security decision recorded by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityEventType {
    /// Request carried no credential.
    MissingAuthentication,
    /// Credential was not a verified token.
    InvalidTokenType,
    /// Token subject claim is not a positive integer.
    InvalidTokenSubject,
    /// Token principal differs from the principal addressed in the path.
    PathParameterManipulation,
    /// Identity binding passed.
    SecurityValidationSuccess,
    /// A new session would exceed the per-principal cap.
    ConcurrentSessionViolation,
    /// A new session was admitted into the registry.
    SessionRegistered,
    /// A session was explicitly revoked.
    SessionRevoked,
    /// A stage failed in an unexpected way.
    UnexpectedStageFailure,
}

impl SecurityEventType {
    /// Returns the canonical upper snake case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventType::MissingAuthentication => "MISSING_AUTHENTICATION",
            SecurityEventType::InvalidTokenType => "INVALID_TOKEN_TYPE",
            SecurityEventType::InvalidTokenSubject => "INVALID_TOKEN_SUBJECT",
            SecurityEventType::PathParameterManipulation => "PATH_PARAMETER_MANIPULATION",
            SecurityEventType::SecurityValidationSuccess => "SECURITY_VALIDATION_SUCCESS",
            SecurityEventType::ConcurrentSessionViolation => "CONCURRENT_SESSION_VIOLATION",
            SecurityEventType::SessionRegistered => "SESSION_REGISTERED",
            SecurityEventType::SessionRevoked => "SESSION_REVOKED",
            SecurityEventType::UnexpectedStageFailure => "UNEXPECTED_STAGE_FAILURE",
        }
    }

    /// Severity normally attached to this event type.
    pub fn default_severity(&self) -> SeverityLevel {
        match self {
            SecurityEventType::MissingAuthentication
            | SecurityEventType::InvalidTokenType
            | SecurityEventType::InvalidTokenSubject
            | SecurityEventType::ConcurrentSessionViolation => SeverityLevel::High,
            SecurityEventType::PathParameterManipulation
            | SecurityEventType::UnexpectedStageFailure => SeverityLevel::Critical,
            SecurityEventType::SessionRevoked => SeverityLevel::Low,
            SecurityEventType::SecurityValidationSuccess | SecurityEventType::SessionRegistered => {
                SeverityLevel::Info
            }
        }
    }
}

impl fmt::Display for SecurityEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecurityEventType {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MISSING_AUTHENTICATION" => Ok(SecurityEventType::MissingAuthentication),
            "INVALID_TOKEN_TYPE" => Ok(SecurityEventType::InvalidTokenType),
            "INVALID_TOKEN_SUBJECT" => Ok(SecurityEventType::InvalidTokenSubject),
            "PATH_PARAMETER_MANIPULATION" => Ok(SecurityEventType::PathParameterManipulation),
            "SECURITY_VALIDATION_SUCCESS" => Ok(SecurityEventType::SecurityValidationSuccess),
            "CONCURRENT_SESSION_VIOLATION" => Ok(SecurityEventType::ConcurrentSessionViolation),
            "SESSION_REGISTERED" => Ok(SecurityEventType::SessionRegistered),
            "SESSION_REVOKED" => Ok(SecurityEventType::SessionRevoked),
            "UNEXPECTED_STAGE_FAILURE" => Ok(SecurityEventType::UnexpectedStageFailure),
            other => Err(EventError::UnknownEventType(other.to_string())),
        }
    }
}

// ============================================================================
// Security Event
// ============================================================================

/// Immutable record of a single security decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    event_id: Uuid,
    event_type: SecurityEventType,
    severity: SeverityLevel,
    principal_id: Option<i64>,
    session_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
    details: EventDetails,
    request_id: Option<String>,
    client_ip: Option<String>,
    user_agent: Option<String>,
}

impl SecurityEvent {
    /// Starts an empty builder. Type and severity must be supplied before `build`.
    pub fn builder() -> SecurityEventBuilder {
        SecurityEventBuilder::default()
    }

    /// Starts a builder with the type set and its default severity applied.
    pub fn typed(event_type: SecurityEventType) -> SecurityEventBuilder {
        SecurityEventBuilder::default()
            .event_type(event_type)
            .severity(event_type.default_severity())
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn event_type(&self) -> SecurityEventType {
        self.event_type
    }

    pub fn severity(&self) -> SeverityLevel {
        self.severity
    }

    pub fn principal_id(&self) -> Option<i64> {
        self.principal_id
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }

    pub fn details(&self) -> &EventDetails {
        &self.details
    }

    /// Looks up a single detail value.
    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details.get(key)
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn client_ip(&self) -> Option<&str> {
        self.client_ip.as_deref()
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }
}

/// Builder for [`SecurityEvent`].
#[derive(Debug, Clone, Default)]
pub struct SecurityEventBuilder {
    event_type: Option<SecurityEventType>,
    severity: Option<SeverityLevel>,
    principal_id: Option<i64>,
    session_id: Option<String>,
    timestamp: Option<OffsetDateTime>,
    details: EventDetails,
    request_id: Option<String>,
    client_ip: Option<String>,
    user_agent: Option<String>,
}

impl SecurityEventBuilder {
    /// Set the event type.
    pub fn event_type(mut self, event_type: SecurityEventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    /// Set the severity.
    pub fn severity(mut self, severity: SeverityLevel) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Set the principal the event concerns.
    pub fn principal_id(mut self, principal_id: i64) -> Self {
        self.principal_id = Some(principal_id);
        self
    }

    /// Set the session id.
    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Set the decision timestamp. Defaults to the current UTC time.
    pub fn timestamp(mut self, timestamp: OffsetDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Append a detail entry, preserving insertion order.
    pub fn detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Append every entry of `details`, preserving their order.
    pub fn details(mut self, details: EventDetails) -> Self {
        self.details.extend(details);
        self
    }

    /// Set the request correlation id.
    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Set the client address.
    pub fn client_ip(mut self, client_ip: impl Into<String>) -> Self {
        self.client_ip = Some(client_ip.into());
        self
    }

    /// Set the client user agent.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Builds the event.
    ///
    /// # Errors
    ///
    /// Returns `EventError::MissingField` if the type or severity was never set.
    pub fn build(self) -> EventResult<SecurityEvent> {
        let event_type = self
            .event_type
            .ok_or_else(|| EventError::missing_field("type"))?;
        let severity = self
            .severity
            .ok_or_else(|| EventError::missing_field("severity"))?;

        Ok(SecurityEvent {
            event_id: Uuid::new_v4(),
            event_type,
            severity,
            principal_id: self.principal_id,
            session_id: self.session_id,
            timestamp: self.timestamp.unwrap_or_else(OffsetDateTime::now_utc),
            details: self.details,
            request_id: self.request_id,
            client_ip: self.client_ip,
            user_agent: self.user_agent,
        })
    }
}
