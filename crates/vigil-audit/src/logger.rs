//! Security audit logger port and its default implementation.
//!
//! [`SecurityAuditLogger`] is the only surface validation stages use to
//! record decisions. Neither entry point returns an error: audit failures
//! are logged locally and dropped so they can never change a request
//! outcome.
//!
//! - [`log_security_event`](SecurityAuditLogger::log_security_event) does the
//!   work on the calling task.
//! - [`log_security_event_async`](SecurityAuditLogger::log_security_event_async)
//!   mirrors the event to the process log, then hands it to the bounded
//!   background queue and returns. The mirror copy survives even if the
//!   queue evicts or drops the event.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{trace, warn};
use vigil_core::{EventDetails, SecurityEvent, SecurityEventType};

use crate::AuditResult;
use crate::alert::DynAlertPublisher;
use crate::config::AuditConfig;
use crate::error::AuditError;
use crate::queue::{AuditQueue, QueueStats};
use crate::record::AuditRecord;
use crate::sink::DynAuditSink;
use crate::writer::{AUDIT_LOG_TARGET, AuditWriter};

/// Port through which stages record security decisions.
#[async_trait]
pub trait SecurityAuditLogger: Send + Sync {
    /// Records an event on the calling task: seal, persist, mirror, fan out.
    async fn log_security_event(&self, event: SecurityEvent);

    /// Schedules the same work on the background queue and returns without
    /// waiting for it to be durable.
    async fn log_security_event_async(&self, event: SecurityEvent);

    /// Legacy entry for call sites that only report violations.
    ///
    /// Translates into a [`SecurityEvent`] with the type's default severity
    /// and goes through [`log_security_event`](Self::log_security_event).
    async fn log_violation(
        &self,
        kind: SecurityEventType,
        principal_id: Option<i64>,
        details: EventDetails,
    ) {
        let mut builder = SecurityEvent::typed(kind).details(details);
        if let Some(id) = principal_id {
            builder = builder.principal_id(id);
        }
        match builder.build() {
            Ok(event) => self.log_security_event(event).await,
            Err(e) => warn!(target: AUDIT_LOG_TARGET, error = %e, "Dropping malformed legacy violation"),
        }
    }

    /// Legacy entry for call sites that only report successful validations.
    async fn log_success(&self, principal_id: i64, details: EventDetails) {
        let built = SecurityEvent::typed(SecurityEventType::SecurityValidationSuccess)
            .principal_id(principal_id)
            .details(details)
            .build();
        match built {
            Ok(event) => self.log_security_event(event).await,
            Err(e) => warn!(target: AUDIT_LOG_TARGET, error = %e, "Dropping malformed legacy success"),
        }
    }
}

/// Type alias for a shared audit logger.
pub type DynAuditLogger = Arc<dyn SecurityAuditLogger>;

/// Default logger: an [`AuditWriter`] plus a bounded [`AuditQueue`].
pub struct AuditService {
    writer: Arc<AuditWriter>,
    queue: AuditQueue,
}

impl AuditService {
    /// Builds the service and starts its background workers.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Configuration` if `config` is invalid.
    pub fn new(
        config: &AuditConfig,
        sink: DynAuditSink,
        publisher: DynAlertPublisher,
    ) -> AuditResult<Self> {
        config.validate()?;

        let mut writer = AuditWriter::new(
            sink,
            publisher,
            config.checksum_algorithm,
            config.alert_min_severity,
        );
        if !config.enabled {
            writer = writer.mirror_only();
        }
        let writer = Arc::new(writer);

        let queue = AuditQueue::start(
            writer.clone(),
            config.queue_capacity,
            config.workers,
            config.overflow_policy,
        );

        Ok(Self { writer, queue })
    }

    /// Looks up a stored record and recomputes its checksum.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::NotFound` if no record has this id, or a storage
    /// error from the sink.
    pub async fn verify_record(&self, id: u64) -> AuditResult<bool> {
        let record: AuditRecord = self
            .writer
            .sink()
            .find_by_id(id)
            .await?
            .ok_or(AuditError::NotFound { id })?;
        Ok(record.verify())
    }

    pub fn sink(&self) -> &DynAuditSink {
        self.writer.sink()
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Drains the background queue and stops its workers.
    pub async fn shutdown(&self) {
        self.queue.shutdown().await;
    }
}

#[async_trait]
impl SecurityAuditLogger for AuditService {
    async fn log_security_event(&self, event: SecurityEvent) {
        self.writer.write(event).await;
    }

    async fn log_security_event_async(&self, event: SecurityEvent) {
        self.writer.mirror(&event);
        let outcome = self.queue.enqueue(event).await;
        if !outcome.accepted() {
            // The queue already logged the drop with the event fields.
            trace!(target: AUDIT_LOG_TARGET, ?outcome, "Async audit event not queued");
        }
    }
}

impl std::fmt::Debug for AuditService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditService")
            .field("writer", &self.writer)
            .field("queue", &self.queue)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::alert::{BroadcastAlertPublisher, NoopAlertPublisher};
    use crate::sink::{AuditSink, InMemoryAuditSink};
    use crate::config::OverflowPolicy;
    use crate::testing::logs::CapturedLogs;
    use crate::testing::{FailingAuditSink, SlowAuditSink};
    use vigil_core::SeverityLevel;

    fn service_with(sink: DynAuditSink) -> AuditService {
        AuditService::new(&AuditConfig::default(), sink, Arc::new(NoopAlertPublisher)).unwrap()
    }

    #[tokio::test]
    async fn test_sync_logging_is_durable_on_return() {
        let sink = Arc::new(InMemoryAuditSink::new());
        let service = service_with(sink.clone());

        let event = SecurityEvent::typed(SecurityEventType::PathParameterManipulation)
            .principal_id(42)
            .build()
            .unwrap();
        service.log_security_event(event).await;

        let records = sink.records().await;
        assert_eq!(records.len(), 1);
        assert!(service.verify_record(records[0].id).await.unwrap());
    }

    #[tokio::test]
    async fn test_async_logging_returns_before_durable() {
        let sink = Arc::new(SlowAuditSink::new(Duration::from_millis(100)));
        let service = service_with(sink.clone());

        let started = std::time::Instant::now();
        service
            .log_security_event_async(
                SecurityEvent::typed(SecurityEventType::SecurityValidationSuccess)
                    .principal_id(1)
                    .build()
                    .unwrap(),
            )
            .await;
        assert!(started.elapsed() < Duration::from_millis(50));

        service.shutdown().await;
        assert_eq!(sink.inner().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_storage_failures_never_surface() {
        let service = service_with(Arc::new(FailingAuditSink));
        let event = SecurityEvent::typed(SecurityEventType::MissingAuthentication)
            .build()
            .unwrap();

        // Neither call returns an error or panics.
        service.log_security_event(event.clone()).await;
        service.log_security_event_async(event).await;
        service.shutdown().await;
        assert_eq!(service.queue_stats().processed, 1);
    }

    #[tokio::test]
    async fn test_legacy_violation_goes_through_unified_model() {
        let sink = Arc::new(InMemoryAuditSink::new());
        let publisher = BroadcastAlertPublisher::new();
        let mut alerts = publisher.subscribe();
        let service =
            AuditService::new(&AuditConfig::default(), sink.clone(), Arc::new(publisher)).unwrap();

        let mut details = EventDetails::new();
        details.insert("reason".into(), "legacy".into());
        service
            .log_violation(SecurityEventType::InvalidTokenType, Some(5), details)
            .await;

        let records = sink.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event.severity(), SeverityLevel::High);
        assert_eq!(records[0].event.principal_id(), Some(5));
        assert!(records[0].verify());
        assert_eq!(
            alerts.recv().await.unwrap().event_type(),
            SecurityEventType::InvalidTokenType
        );
    }

    #[tokio::test]
    async fn test_legacy_success_is_info() {
        let sink = Arc::new(InMemoryAuditSink::new());
        let service = service_with(sink.clone());
        service.log_success(9, EventDetails::new()).await;

        let records = sink.records().await;
        assert_eq!(records[0].event.event_type(), SecurityEventType::SecurityValidationSuccess);
        assert_eq!(records[0].event.severity(), SeverityLevel::Info);
    }

    #[tokio::test]
    async fn test_verify_unknown_record() {
        let service = service_with(Arc::new(InMemoryAuditSink::new()));
        assert!(matches!(
            service.verify_record(404).await,
            Err(AuditError::NotFound { id: 404 })
        ));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = AuditConfig {
            workers: 0,
            ..Default::default()
        };
        let result = AuditService::new(
            &config,
            Arc::new(InMemoryAuditSink::new()),
            Arc::new(NoopAlertPublisher),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_disabled_audit_skips_persistence() {
        let sink = Arc::new(InMemoryAuditSink::new());
        let config = AuditConfig {
            enabled: false,
            ..Default::default()
        };
        let service = AuditService::new(&config, sink.clone(), Arc::new(NoopAlertPublisher)).unwrap();
        service
            .log_security_event(
                SecurityEvent::typed(SecurityEventType::PathParameterManipulation)
                    .build()
                    .unwrap(),
            )
            .await;
        assert_eq!(sink.records().await.len(), 0);
    }

    #[tokio::test]
    async fn test_async_events_are_mirrored_even_when_queue_overflows() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();
        let sink = Arc::new(SlowAuditSink::new(Duration::from_millis(200)));
        let config = AuditConfig {
            queue_capacity: 1,
            workers: 1,
            overflow_policy: OverflowPolicy::DropOldest,
            ..Default::default()
        };
        let service = AuditService::new(&config, sink.clone(), Arc::new(NoopAlertPublisher)).unwrap();

        let baseline = |principal| {
            SecurityEvent::typed(SecurityEventType::SecurityValidationSuccess)
                .principal_id(principal)
                .build()
                .unwrap()
        };
        service.log_security_event_async(baseline(1)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let attack = SecurityEvent::typed(SecurityEventType::PathParameterManipulation)
            .principal_id(99)
            .detail("pathUserId", 42)
            .build()
            .unwrap();
        let attack_id = attack.event_id().to_string();
        service.log_security_event_async(attack).await;
        service.log_security_event_async(baseline(2)).await;
        service.shutdown().await;

        let mirrored = logs.matching(&["Security event", &attack_id]);
        assert_eq!(mirrored.len(), 1);
        assert!(mirrored[0].contains("WARN vigil::audit:"));
        assert!(mirrored[0].contains("principal_id=Some(99)"));
        assert!(mirrored[0].contains(r#"details={"pathUserId":42}"#));
        assert_eq!(
            logs.matching(&["Security event", "principal_id=Some(2)"]).len(),
            1
        );

        // The CRITICAL event keeps its queue slot; the later INFO one is refused.
        let stored: Vec<i64> = sink
            .inner()
            .records()
            .await
            .iter()
            .filter_map(|r| r.event.principal_id())
            .collect();
        assert_eq!(stored, vec![1, 99]);
        assert_eq!(service.queue_stats().dropped, 1);
    }
}
