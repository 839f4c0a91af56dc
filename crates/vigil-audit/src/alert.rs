//! Alert fanout for high-severity security events.
//!
//! Publishing is best effort: there is no acknowledgement, and a fanout with
//! no listeners silently discards the event. The persisted audit record is
//! the source of truth; alerts are a notification copy.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use vigil_core::SecurityEvent;

use crate::AuditResult;

/// Default buffer size for the broadcast channel.
/// Slow receivers lose the oldest alerts beyond this limit.
pub const DEFAULT_ALERT_BUFFER: usize = 256;

/// Outbound alert fanout port.
#[async_trait]
pub trait AlertPublisher: Send + Sync {
    /// Publishes an event to alert consumers.
    async fn publish(&self, event: &SecurityEvent) -> AuditResult<()>;
}

/// Type alias for a shared alert publisher.
pub type DynAlertPublisher = Arc<dyn AlertPublisher>;

/// Alert publisher backed by a tokio broadcast channel.
///
/// Any number of consumers (pager bridges, SIEM forwarders, dashboards) can
/// subscribe; each receives every alert published after it subscribed.
#[derive(Clone)]
pub struct BroadcastAlertPublisher {
    sender: broadcast::Sender<SecurityEvent>,
}

impl BroadcastAlertPublisher {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_ALERT_BUFFER)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to alerts.
    ///
    /// Alerts published before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<SecurityEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastAlertPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BroadcastAlertPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastAlertPublisher")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[async_trait]
impl AlertPublisher for BroadcastAlertPublisher {
    async fn publish(&self, event: &SecurityEvent) -> AuditResult<()> {
        let delivered = self.sender.send(event.clone()).unwrap_or_default();
        tracing::trace!(
            event_type = %event.event_type(),
            delivered,
            "Alert published"
        );
        Ok(())
    }
}

/// Publisher that drops every alert.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAlertPublisher;

#[async_trait]
impl AlertPublisher for NoopAlertPublisher {
    async fn publish(&self, _event: &SecurityEvent) -> AuditResult<()> {
        Ok(())
    }
}
