//! Test doubles for the audit ports.
//!
//! These are public so downstream crates can use them in their own tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use vigil_core::{SecurityEvent, SecurityEventType, SeverityLevel};

use crate::AuditResult;
use crate::alert::AlertPublisher;
use crate::error::AuditError;
use crate::logger::SecurityAuditLogger;
use crate::record::{AuditEntry, AuditRecord};
use crate::sink::{AuditSink, InMemoryAuditSink};

/// Which entry point recorded an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    Sync,
    Async,
}

/// Logger that keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingAuditLogger {
    events: Mutex<Vec<(LogMode, SecurityEvent)>>,
}

impl RecordingAuditLogger {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, mode: LogMode, event: SecurityEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((mode, event));
    }

    /// All recorded events in order.
    pub fn events(&self) -> Vec<SecurityEvent> {
        self.entries().into_iter().map(|(_, e)| e).collect()
    }

    /// All recorded events with the entry point used.
    pub fn entries(&self) -> Vec<(LogMode, SecurityEvent)> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn of_type(&self, event_type: SecurityEventType) -> Vec<SecurityEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    pub fn of_severity(&self, severity: SeverityLevel) -> Vec<SecurityEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.severity() == severity)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SecurityAuditLogger for RecordingAuditLogger {
    async fn log_security_event(&self, event: SecurityEvent) {
        self.push(LogMode::Sync, event);
    }

    async fn log_security_event_async(&self, event: SecurityEvent) {
        self.push(LogMode::Async, event);
    }
}

/// Sink whose every operation fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingAuditSink;

#[async_trait]
impl AuditSink for FailingAuditSink {
    async fn save(&self, _entry: AuditEntry) -> AuditResult<AuditRecord> {
        Err(AuditError::storage("audit store unreachable"))
    }

    async fn find_by_id(&self, _id: u64) -> AuditResult<Option<AuditRecord>> {
        Err(AuditError::storage("audit store unreachable"))
    }

    async fn find_in_range(
        &self,
        _from: OffsetDateTime,
        _to: OffsetDateTime,
    ) -> AuditResult<Vec<AuditRecord>> {
        Err(AuditError::storage("audit store unreachable"))
    }

    async fn count(&self) -> AuditResult<u64> {
        Err(AuditError::storage("audit store unreachable"))
    }
}

/// In-memory sink that delays every write.
#[derive(Debug)]
pub struct SlowAuditSink {
    inner: InMemoryAuditSink,
    delay: Duration,
}

impl SlowAuditSink {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: InMemoryAuditSink::new(),
            delay,
        }
    }

    pub fn inner(&self) -> &InMemoryAuditSink {
        &self.inner
    }
}

#[async_trait]
impl AuditSink for SlowAuditSink {
    async fn save(&self, entry: AuditEntry) -> AuditResult<AuditRecord> {
        tokio::time::sleep(self.delay).await;
        self.inner.save(entry).await
    }

    async fn find_by_id(&self, id: u64) -> AuditResult<Option<AuditRecord>> {
        self.inner.find_by_id(id).await
    }

    async fn find_in_range(
        &self,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> AuditResult<Vec<AuditRecord>> {
        self.inner.find_in_range(from, to).await
    }

    async fn count(&self) -> AuditResult<u64> {
        self.inner.count().await
    }
}

/// Publisher whose every publish fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingAlertPublisher;

#[async_trait]
impl AlertPublisher for FailingAlertPublisher {
    async fn publish(&self, _event: &SecurityEvent) -> AuditResult<()> {
        Err(AuditError::publish("alert bus unreachable"))
    }
}
