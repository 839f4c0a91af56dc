//! Audit pipeline configuration.
//!
//! # Example (TOML)
//!
//! ```toml
//! [audit]
//! checksum_algorithm = "SHA-256"
//! queue_capacity = 1024
//! workers = 2
//! alert_min_severity = "high"
//!
//! [audit.overflow_policy]
//! mode = "block"
//! timeout = "20ms"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use vigil_core::SeverityLevel;

use crate::alert::DEFAULT_ALERT_BUFFER;
use crate::checksum::ChecksumAlgorithm;
use crate::error::AuditError;

/// Behaviour of the background queue when it is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest pending event below HIGH severity to make room.
    /// HIGH and CRITICAL events are only displaced by events of the same rank.
    #[default]
    DropOldest,
    /// Wait up to `timeout` for space, then drop the new event.
    Block {
        #[serde(with = "humantime_serde")]
        timeout: Duration,
    },
}

/// Audit configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Persist and fan out events. When disabled, events are only mirrored
    /// to the process log.
    pub enabled: bool,

    /// Checksum algorithm for tamper evidence.
    pub checksum_algorithm: ChecksumAlgorithm,

    /// Maximum number of events waiting for a background worker.
    pub queue_capacity: usize,

    /// Number of background workers draining the queue.
    pub workers: usize,

    /// What to do when the queue is full.
    pub overflow_policy: OverflowPolicy,

    /// Minimum severity routed to the alert fanout.
    pub alert_min_severity: SeverityLevel,

    /// Broadcast buffer for alert subscribers.
    pub alert_buffer: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            checksum_algorithm: ChecksumAlgorithm::Sha256,
            queue_capacity: 1024,
            workers: 2,
            overflow_policy: OverflowPolicy::DropOldest,
            alert_min_severity: SeverityLevel::High,
            alert_buffer: DEFAULT_ALERT_BUFFER,
        }
    }
}

impl AuditConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Configuration` if the queue capacity, worker
    /// count or alert buffer is zero, or a blocking overflow policy has a
    /// zero timeout.
    pub fn validate(&self) -> Result<(), AuditError> {
        if self.queue_capacity == 0 {
            return Err(AuditError::configuration("queue_capacity must be > 0"));
        }

        if self.workers == 0 {
            return Err(AuditError::configuration("workers must be > 0"));
        }

        if self.alert_buffer == 0 {
            return Err(AuditError::configuration("alert_buffer must be > 0"));
        }

        if let OverflowPolicy::Block { timeout } = self.overflow_policy
            && timeout.is_zero()
        {
            return Err(AuditError::configuration(
                "overflow_policy.timeout must be > 0 when mode = \"block\"",
            ));
        }

        Ok(())
    }
}
