//! Audit records as handed to and returned from an [`AuditSink`](crate::sink::AuditSink).

use serde::{Deserialize, Serialize};
use vigil_core::SecurityEvent;

use crate::checksum::{ChecksumAlgorithm, compute_checksum};

/// A sealed event that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub event: SecurityEvent,
    pub checksum: String,
    pub algorithm: ChecksumAlgorithm,
}

impl AuditEntry {
    /// Computes the checksum for `event` and attaches it.
    pub fn seal(event: SecurityEvent, algorithm: ChecksumAlgorithm) -> Self {
        let checksum = compute_checksum(algorithm, &event);
        Self {
            event,
            checksum,
            algorithm,
        }
    }

    /// Attaches the id assigned by the sink.
    pub fn into_record(self, id: u64) -> AuditRecord {
        AuditRecord {
            id,
            event: self.event,
            checksum: self.checksum,
            algorithm: self.algorithm,
        }
    }
}

/// A persisted audit record: event, checksum and the sink-assigned id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: u64,
    pub event: SecurityEvent,
    pub checksum: String,
    pub algorithm: ChecksumAlgorithm,
}

impl AuditRecord {
    /// Recomputes the checksum from the canonical fields and compares it to the stored one.
    #[must_use]
    pub fn verify(&self) -> bool {
        compute_checksum(self.algorithm, &self.event) == self.checksum
    }
}
