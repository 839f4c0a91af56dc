//! Audit storage port.
//!
//! An [`AuditSink`] persists sealed entries and assigns each a persisted id.
//! Sinks must support point lookup and time-range scans; retention and
//! compliance export live outside this crate.
//!
//! # Implementations
//!
//! - [`InMemoryAuditSink`] - process-local, used by default and in tests

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::AuditResult;
use crate::record::{AuditEntry, AuditRecord};

/// Storage trait for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persists an entry and returns the stored record with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Storage` if the backend is unavailable.
    async fn save(&self, entry: AuditEntry) -> AuditResult<AuditRecord>;

    /// Finds a record by its persisted id.
    async fn find_by_id(&self, id: u64) -> AuditResult<Option<AuditRecord>>;

    /// Returns records whose event timestamp lies in `[from, to)`, oldest first.
    async fn find_in_range(
        &self,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> AuditResult<Vec<AuditRecord>>;

    /// Number of stored records.
    async fn count(&self) -> AuditResult<u64>;
}

/// Type alias for a shared audit sink.
pub type DynAuditSink = Arc<dyn AuditSink>;

/// Process-local audit sink.
///
/// Records are lost on restart; use it for single-instance deployments
/// without a durable store, and in tests.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    records: RwLock<Vec<AuditRecord>>,
    next_id: AtomicU64,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every stored record in insertion order.
    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn save(&self, entry: AuditEntry) -> AuditResult<AuditRecord> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let record = entry.into_record(id);
        self.records.write().await.push(record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: u64) -> AuditResult<Option<AuditRecord>> {
        let records = self.records.read().await;
        Ok(records.iter().find(|r| r.id == id).cloned())
    }

    async fn find_in_range(
        &self,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> AuditResult<Vec<AuditRecord>> {
        let records = self.records.read().await;
        let mut matching: Vec<AuditRecord> = records
            .iter()
            .filter(|r| {
                let ts = r.event.timestamp();
                ts >= from && ts < to
            })
            .cloned()
            .collect();
        // Async writers may persist out of order; scans are ordered by event time.
        matching.sort_by_key(|r| (r.event.timestamp(), r.id));
        Ok(matching)
    }

    async fn count(&self) -> AuditResult<u64> {
        Ok(self.records.read().await.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::ChecksumAlgorithm;
    use time::macros::datetime;
    use vigil_core::{SecurityEvent, SecurityEventType};

    fn entry_at(ts: OffsetDateTime) -> AuditEntry {
        let event = SecurityEvent::typed(SecurityEventType::SessionRegistered)
            .principal_id(1)
            .timestamp(ts)
            .build()
            .unwrap();
        AuditEntry::seal(event, ChecksumAlgorithm::Sha256)
    }

    #[tokio::test]
    async fn test_save_assigns_increasing_ids() {
        let sink = InMemoryAuditSink::new();
        let a = sink.save(entry_at(datetime!(2024-01-01 00:00 UTC))).await.unwrap();
        let b = sink.save(entry_at(datetime!(2024-01-01 00:01 UTC))).await.unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(sink.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_point_lookup() {
        let sink = InMemoryAuditSink::new();
        let saved = sink.save(entry_at(datetime!(2024-01-01 00:00 UTC))).await.unwrap();
        assert_eq!(sink.find_by_id(saved.id).await.unwrap(), Some(saved));
        assert!(sink.find_by_id(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_range_scan_is_half_open_and_time_ordered() {
        let sink = InMemoryAuditSink::new();
        // Persist out of order.
        sink.save(entry_at(datetime!(2024-01-01 00:02 UTC))).await.unwrap();
        sink.save(entry_at(datetime!(2024-01-01 00:00 UTC))).await.unwrap();
        sink.save(entry_at(datetime!(2024-01-01 00:01 UTC))).await.unwrap();
        sink.save(entry_at(datetime!(2024-01-01 00:03 UTC))).await.unwrap();

        let found = sink
            .find_in_range(
                datetime!(2024-01-01 00:00 UTC),
                datetime!(2024-01-01 00:03 UTC),
            )
            .await
            .unwrap();

        let times: Vec<_> = found.iter().map(|r| r.event.timestamp()).collect();
        assert_eq!(
            times,
            vec![
                datetime!(2024-01-01 00:00 UTC),
                datetime!(2024-01-01 00:01 UTC),
                datetime!(2024-01-01 00:02 UTC),
            ]
        );
    }
}
