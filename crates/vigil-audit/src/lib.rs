//! # vigil-audit
//!
//! Tamper-evident, severity-classified security audit logging.
//!
//! Every security decision made by the validation pipeline is turned into a
//! [`SecurityEvent`](vigil_core::SecurityEvent) and handed to a
//! [`SecurityAuditLogger`]. The default implementation, [`AuditService`]:
//!
//! 1. mirrors the event to the process log (`warn` for HIGH/CRITICAL,
//!    `info` for MEDIUM, `debug` otherwise)
//! 2. seals it with a checksum over its canonical fields
//! 3. persists it through an [`AuditSink`]
//! 4. publishes it to an [`AlertPublisher`] when it reaches the alert threshold
//!
//! Failures in steps 3 and 4 are logged and swallowed. Audit logging never
//! fails the request that produced the event.
//!
//! ## Modules
//!
//! - [`checksum`] - canonical projection and digest
//! - [`record`] - sealed entries and persisted records
//! - [`sink`] - storage port and in-memory sink
//! - [`alert`] - alert fanout port and broadcast publisher
//! - [`writer`] - persistence/integrity adapter
//! - [`queue`] - bounded background queue
//! - [`logger`] - logger port and [`AuditService`]
//! - [`testing`] - test doubles

pub mod alert;
pub mod checksum;
pub mod config;
pub mod error;
pub mod logger;
pub mod queue;
pub mod record;
pub mod sink;
pub mod testing;
pub mod writer;

pub use alert::{AlertPublisher, BroadcastAlertPublisher, DynAlertPublisher, NoopAlertPublisher};
pub use checksum::{ChecksumAlgorithm, canonical_projection, compute_checksum};
pub use config::{AuditConfig, OverflowPolicy};
pub use error::AuditError;
pub use logger::{AuditService, DynAuditLogger, SecurityAuditLogger};
pub use queue::{AuditQueue, EnqueueOutcome, QueueStats};
pub use record::{AuditEntry, AuditRecord};
pub use sink::{AuditSink, DynAuditSink, InMemoryAuditSink};
pub use writer::AuditWriter;

/// Type alias for audit results.
pub type AuditResult<T> = Result<T, AuditError>;
