//! Ambient request context handed to every validation stage.
//!
//! The credential has already been verified upstream. Stages only read the
//! claims it carries.

use serde::{Deserialize, Serialize};
use vigil_core::SecurityEventBuilder;

/// Kind of credential attached to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    #[default]
    None,
    /// A bearer value the guard cannot introspect.
    Opaque,
    /// A signed token whose claims were verified upstream.
    VerifiedToken,
}

impl CredentialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Opaque => "opaque",
            Self::VerifiedToken => "verified_token",
        }
    }
}

/// Transport-verified identity proof attached to a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialContext {
    pub present: bool,
    pub kind: CredentialKind,
    /// Subject claim, expected to be the decimal principal id.
    pub subject_claim: String,
    /// Token id claim (`jti`).
    pub token_id_claim: Option<String>,
    /// Custom session claim (`sid`).
    pub session_claim: Option<String>,
    /// Raw credential value, used only to derive a session fingerprint.
    pub raw_credential: Option<String>,
}

impl CredentialContext {
    /// No credential attached.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A verified token carrying `subject`.
    pub fn verified_token(subject: impl Into<String>) -> Self {
        Self {
            present: true,
            kind: CredentialKind::VerifiedToken,
            subject_claim: subject.into(),
            ..Self::default()
        }
    }

    /// An opaque credential.
    pub fn opaque(raw: impl Into<String>) -> Self {
        Self {
            present: true,
            kind: CredentialKind::Opaque,
            raw_credential: Some(raw.into()),
            ..Self::default()
        }
    }

    pub fn with_token_id(mut self, jti: impl Into<String>) -> Self {
        self.token_id_claim = Some(jti.into());
        self
    }

    pub fn with_session_claim(mut self, sid: impl Into<String>) -> Self {
        self.session_claim = Some(sid.into());
        self
    }

    pub fn with_raw_credential(mut self, raw: impl Into<String>) -> Self {
        self.raw_credential = Some(raw.into());
        self
    }

    /// Parses the subject claim as a positive principal id.
    ///
    /// Only plain ASCII digits are accepted; signs, whitespace and values
    /// that overflow `i64` are rejected.
    pub fn subject_principal_id(&self) -> Option<i64> {
        let subject = self.subject_claim.as_str();
        if subject.is_empty() || !subject.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        subject.parse::<i64>().ok().filter(|id| *id > 0)
    }
}

/// Request metadata copied into every event a stage emits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    pub request_id: Option<String>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestMeta {
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_client_ip(mut self, client_ip: impl Into<String>) -> Self {
        self.client_ip = Some(client_ip.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Copies the metadata onto an event builder.
    pub fn apply(&self, mut builder: SecurityEventBuilder) -> SecurityEventBuilder {
        if let Some(request_id) = &self.request_id {
            builder = builder.request_id(request_id.clone());
        }
        if let Some(client_ip) = &self.client_ip {
            builder = builder.client_ip(client_ip.clone());
        }
        if let Some(user_agent) = &self.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        builder
    }
}

/// Everything a stage can see about the request besides the command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub credential: CredentialContext,
    pub meta: RequestMeta,
}

impl RequestContext {
    pub fn new(credential: CredentialContext) -> Self {
        Self {
            credential,
            meta: RequestMeta::default(),
        }
    }

    pub fn with_meta(mut self, meta: RequestMeta) -> Self {
        self.meta = meta;
        self
    }
}
