//! Severity taxonomy for security events.
//!
//! Severity drives two things downstream: the level at which an event is
//! mirrored to the process log, and whether it is routed to the alert fanout.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EventError;

/// Severity of a security event.
///
/// Variants are declared in ascending order so the derived `Ord` gives
/// `Info < Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityLevel {
    /// Baseline monitoring (successful validations).
    Info,
    /// Noteworthy but benign.
    Low,
    /// Suspicious, worth reviewing.
    Medium,
    /// Likely misuse (missing credentials, session cap breaches).
    High,
    /// Active attack signal or internal failure.
    Critical,
}

impl SeverityLevel {
    /// All levels in ascending order.
    pub const ALL: [SeverityLevel; 5] = [
        SeverityLevel::Info,
        SeverityLevel::Low,
        SeverityLevel::Medium,
        SeverityLevel::High,
        SeverityLevel::Critical,
    ];

    /// Returns the canonical upper-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SeverityLevel::Info => "INFO",
            SeverityLevel::Low => "LOW",
            SeverityLevel::Medium => "MEDIUM",
            SeverityLevel::High => "HIGH",
            SeverityLevel::Critical => "CRITICAL",
        }
    }

    /// Returns `true` if an event of this severity reaches the given alert threshold.
    #[must_use]
    pub fn requires_alert(&self, min: SeverityLevel) -> bool {
        *self >= min
    }
}

impl fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeverityLevel {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INFO" => Ok(SeverityLevel::Info),
            "LOW" => Ok(SeverityLevel::Low),
            "MEDIUM" => Ok(SeverityLevel::Medium),
            "HIGH" => Ok(SeverityLevel::High),
            "CRITICAL" => Ok(SeverityLevel::Critical),
            _ => Err(EventError::UnknownSeverity(s.to_string())),
        }
    }
}
