//! Tamper-evidence checksums over a canonical event projection.
//!
//! The checksum covers only the canonical fields: event type, principal id,
//! timestamp and request id. A verifier that recomputes it from a stored
//! record detects any retroactive edit to those fields. It is not a secret
//! and provides no confidentiality.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384, Sha512};
use vigil_core::SecurityEvent;

use crate::error::AuditError;

/// Field separator used in the canonical projection.
const SEPARATOR: char = '|';

/// Hash algorithm used for record checksums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChecksumAlgorithm {
    #[default]
    #[serde(rename = "sha256", alias = "SHA-256", alias = "sha-256")]
    Sha256,
    #[serde(rename = "sha384", alias = "SHA-384", alias = "sha-384")]
    Sha384,
    #[serde(rename = "sha512", alias = "SHA-512", alias = "sha-512")]
    Sha512,
}

impl ChecksumAlgorithm {
    /// Returns the algorithm identifier as written in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Sha256 => "SHA-256",
            ChecksumAlgorithm::Sha384 => "SHA-384",
            ChecksumAlgorithm::Sha512 => "SHA-512",
        }
    }

    /// Hashes `input` and returns the lowercase hex digest.
    pub fn digest_hex(&self, input: &[u8]) -> String {
        match self {
            ChecksumAlgorithm::Sha256 => hex::encode(Sha256::digest(input)),
            ChecksumAlgorithm::Sha384 => hex::encode(Sha384::digest(input)),
            ChecksumAlgorithm::Sha512 => hex::encode(Sha512::digest(input)),
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "").as_str() {
            "sha256" => Ok(ChecksumAlgorithm::Sha256),
            "sha384" => Ok(ChecksumAlgorithm::Sha384),
            "sha512" => Ok(ChecksumAlgorithm::Sha512),
            _ => Err(AuditError::configuration(format!(
                "Unsupported checksum algorithm: '{s}'. Must be SHA-256, SHA-384 or SHA-512"
            ))),
        }
    }
}

/// Builds the canonical projection `type|principal_id|timestamp_nanos|request_id`.
///
/// Absent principal or request ids project to an empty field.
pub fn canonical_projection(event: &SecurityEvent) -> String {
    let principal = event
        .principal_id()
        .map(|id| id.to_string())
        .unwrap_or_default();

    format!(
        "{ty}{SEPARATOR}{principal}{SEPARATOR}{ts}{SEPARATOR}{request}",
        ty = event.event_type().as_str(),
        ts = event.timestamp().unix_timestamp_nanos(),
        request = event.request_id().unwrap_or_default(),
    )
}

/// Computes the checksum of an event with the given algorithm.
pub fn compute_checksum(algorithm: ChecksumAlgorithm, event: &SecurityEvent) -> String {
    algorithm.digest_hex(canonical_projection(event).as_bytes())
}
