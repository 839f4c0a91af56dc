//! Guard configuration.
//!
//! # Example (TOML)
//!
//! ```toml
//! [guard]
//! stages = ["identity_binding", "concurrent_session"]
//!
//! [guard.identity]
//! expected_credential_kind = "verified_token"
//!
//! [guard.session]
//! max_concurrent_sessions = 3
//! session_ttl = "30m"
//! sweep_interval = "1m"
//! ```
//!
//! Durations accept whole seconds as well (`session_ttl = 1800`), which is
//! what `VIGIL__GUARD__SESSION__SESSION_TTL=1800` produces.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chain::StageId;
use crate::context::CredentialKind;

/// Longest accepted session TTL.
pub const MAX_SESSION_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Errors that can occur when validating configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Validation pipeline configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Built-in stages to include, in execution order. Omitted stages are
    /// never constructed.
    pub stages: Vec<StageId>,

    pub identity: IdentityConfig,

    pub session: SessionConfig,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            stages: StageId::ALL.to_vec(),
            identity: IdentityConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl GuardConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for stage in &self.stages {
            if !seen.insert(stage) {
                return Err(ConfigError::InvalidValue(format!(
                    "stage '{stage}' listed more than once"
                )));
            }
        }
        self.session.validate()
    }

    pub fn includes(&self, stage: StageId) -> bool {
        self.stages.contains(&stage)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Credential kind the identity stage accepts.
    pub expected_credential_kind: CredentialKind,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            expected_credential_kind: CredentialKind::VerifiedToken,
        }
    }
}

/// Session cap configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum live sessions per principal.
    pub max_concurrent_sessions: usize,

    /// Idle time after which a session is purged.
    #[serde(with = "seconds_or_humantime")]
    pub session_ttl: Duration,

    /// Interval of the background expiry sweep.
    #[serde(with = "seconds_or_humantime")]
    pub sweep_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: 3,
            session_ttl: Duration::from_secs(1800),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_sessions == 0 {
            return Err(ConfigError::InvalidValue(
                "max_concurrent_sessions must be > 0".to_string(),
            ));
        }
        if self.session_ttl.is_zero() {
            return Err(ConfigError::InvalidValue(
                "session_ttl must be > 0".to_string(),
            ));
        }
        if self.session_ttl > MAX_SESSION_TTL {
            return Err(ConfigError::InvalidValue(format!(
                "session_ttl must be at most {}",
                humantime_serde::re::humantime::format_duration(MAX_SESSION_TTL)
            )));
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "sweep_interval must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Whole seconds or a humantime string in; humantime string out.
mod seconds_or_humantime {
    use std::time::Duration;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        humantime_serde::serialize(value, serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(text) => match text.trim().parse::<u64>() {
                Ok(secs) => Ok(Duration::from_secs(secs)),
                Err(_) => humantime_serde::re::humantime::parse_duration(text.trim())
                    .map_err(|e| D::Error::custom(format!("invalid duration '{text}': {e}"))),
            },
        }
    }
}
