//! Persistence and integrity adapter.
//!
//! [`AuditWriter`] performs the actual work behind every logger entry point:
//! mirror to the process log, seal with a checksum, persist, and fan out.
//! Both the synchronous path and the background queue workers call into it.

use tracing::{debug, error, info, warn};
use vigil_core::{SecurityEvent, SeverityLevel};

use crate::AuditResult;
use crate::alert::DynAlertPublisher;
use crate::checksum::ChecksumAlgorithm;
use crate::record::{AuditEntry, AuditRecord};
use crate::sink::DynAuditSink;

/// Log target used for mirrored audit events.
pub const AUDIT_LOG_TARGET: &str = "vigil::audit";

/// Writes sealed audit records to a sink and alerts to a publisher.
pub struct AuditWriter {
    sink: DynAuditSink,
    publisher: DynAlertPublisher,
    algorithm: ChecksumAlgorithm,
    alert_min_severity: SeverityLevel,
    persist: bool,
}

impl AuditWriter {
    pub fn new(
        sink: DynAuditSink,
        publisher: DynAlertPublisher,
        algorithm: ChecksumAlgorithm,
        alert_min_severity: SeverityLevel,
    ) -> Self {
        Self {
            sink,
            publisher,
            algorithm,
            alert_min_severity,
            persist: true,
        }
    }

    /// Keep mirroring to the process log but skip persistence and fanout.
    pub fn mirror_only(mut self) -> Self {
        self.persist = false;
        self
    }

    pub fn sink(&self) -> &DynAuditSink {
        &self.sink
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    /// Mirrors, persists and publishes `event`, swallowing every failure.
    ///
    /// Returns the stored record when persistence succeeded.
    pub async fn write(&self, event: SecurityEvent) -> Option<AuditRecord> {
        self.mirror(&event);
        self.store(event).await
    }

    /// Fallible variant of [`write`](Self::write). Publish failures are still
    /// swallowed; only storage failures are returned.
    pub async fn try_write(&self, event: SecurityEvent) -> AuditResult<Option<AuditRecord>> {
        self.mirror(&event);
        self.try_store(event).await
    }

    /// Writes `event` to the process log at a level derived from its severity.
    ///
    /// Callers that defer [`store`](Self::store) to a background task mirror
    /// first, so the log keeps the event even if it never reaches the sink.
    pub fn mirror(&self, event: &SecurityEvent) {
        mirror(event);
    }

    /// Seals, persists and publishes an event that was already mirrored,
    /// swallowing every failure.
    pub async fn store(&self, event: SecurityEvent) -> Option<AuditRecord> {
        let event_id = event.event_id();
        match self.try_store(event).await {
            Ok(record) => record,
            Err(e) => {
                error!(
                    target: AUDIT_LOG_TARGET,
                    error = %e,
                    %event_id,
                    "Failed to persist audit event"
                );
                None
            }
        }
    }

    async fn try_store(&self, event: SecurityEvent) -> AuditResult<Option<AuditRecord>> {
        if !self.persist {
            return Ok(None);
        }

        let alert = event.severity().requires_alert(self.alert_min_severity);
        let alert_copy = alert.then(|| event.clone());

        let entry = AuditEntry::seal(event, self.algorithm);
        let saved = self.sink.save(entry).await;

        // Alerts go out even if storage failed; the process log holds the mirror.
        if let Some(event) = alert_copy
            && let Err(e) = self.publisher.publish(&event).await
        {
            warn!(
                target: AUDIT_LOG_TARGET,
                error = %e,
                event_id = %event.event_id(),
                "Failed to publish security alert"
            );
        }

        let record = saved?;
        debug!(
            target: AUDIT_LOG_TARGET,
            audit_id = record.id,
            event_type = %record.event.event_type(),
            "Audit record stored"
        );
        Ok(Some(record))
    }
}

impl std::fmt::Debug for AuditWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditWriter")
            .field("algorithm", &self.algorithm)
            .field("alert_min_severity", &self.alert_min_severity)
            .field("persist", &self.persist)
            .finish_non_exhaustive()
    }
}

/// Mirrors an event to the process log at a level derived from its severity.
fn mirror(event: &SecurityEvent) {
    let details = serde_json::to_string(event.details()).unwrap_or_default();

    macro_rules! emit {
        ($level:ident) => {
            $level!(
                target: AUDIT_LOG_TARGET,
                event_id = %event.event_id(),
                event_type = %event.event_type(),
                severity = %event.severity(),
                principal_id = ?event.principal_id(),
                session_id = ?event.session_id(),
                request_id = ?event.request_id(),
                client_ip = ?event.client_ip(),
                details = %details,
                "Security event"
            )
        };
    }

    match event.severity() {
        SeverityLevel::Critical | SeverityLevel::High => emit!(warn),
        SeverityLevel::Medium => emit!(info),
        SeverityLevel::Low | SeverityLevel::Info => emit!(debug),
    }
}
