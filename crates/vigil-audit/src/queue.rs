//! Bounded background queue for asynchronous audit writes.
//!
//! Latency-sensitive stages hand events to the queue and return; a fixed
//! pool of tokio workers drains it through [`AuditWriter::store`]. The queue
//! is bounded and applies an explicit [`OverflowPolicy`] when full, so a slow
//! or unreachable audit store cannot grow memory without limit.
//!
//! Workers do not mirror to the process log. Callers mirror before
//! enqueueing (as [`AuditService`](crate::AuditService) does), so an event
//! that is evicted or dropped here is still in the log.
//!
//! When full, [`OverflowPolicy::DropOldest`] evicts the oldest pending event
//! below HIGH severity. If every pending event is HIGH or above, an incoming
//! lower-severity event is dropped instead, and an incoming HIGH or CRITICAL
//! event evicts the oldest pending one.
//!
//! Events carry their own timestamps, so the out-of-order persistence that
//! several workers produce is harmless to consumers.

use std::collections::VecDeque;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};
use vigil_core::{SecurityEvent, SeverityLevel};

use crate::config::OverflowPolicy;
use crate::writer::{AUDIT_LOG_TARGET, AuditWriter};

/// Result of handing an event to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Accepted without displacing anything.
    Queued,
    /// Accepted after evicting an older pending event.
    QueuedEvictedOldest,
    /// Rejected because the queue was full: no space freed up in time, or
    /// every pending event outranked this one.
    Dropped,
    /// Rejected because the queue is shut down.
    Closed,
}

impl EnqueueOutcome {
    /// Returns `true` if the submitted event will eventually be written.
    pub fn accepted(&self) -> bool {
        matches!(self, EnqueueOutcome::Queued | EnqueueOutcome::QueuedEvictedOldest)
    }
}

/// Counters describing queue activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub enqueued: u64,
    pub processed: u64,
    pub dropped: u64,
    pub pending: usize,
}

struct Shared {
    pending: Mutex<VecDeque<SecurityEvent>>,
    capacity: usize,
    policy: OverflowPolicy,
    item_ready: Notify,
    space_ready: Notify,
    closed: AtomicBool,
    enqueued: AtomicU64,
    processed: AtomicU64,
    dropped: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, VecDeque<SecurityEvent>> {
        // A poisoned queue still holds valid events.
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Bounded multi-worker audit queue.
pub struct AuditQueue {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl AuditQueue {
    /// Starts `workers` background tasks draining into `writer`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        writer: Arc<AuditWriter>,
        capacity: usize,
        workers: usize,
        policy: OverflowPolicy,
    ) -> Self {
        let shared = Arc::new(Shared {
            pending: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            policy,
            item_ready: Notify::new(),
            space_ready: Notify::new(),
            closed: AtomicBool::new(false),
            enqueued: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        });

        let handles = (0..workers.max(1))
            .map(|worker| {
                let shared = shared.clone();
                let writer = writer.clone();
                tokio::spawn(run_worker(worker, shared, writer))
            })
            .collect();

        debug!(capacity, workers, ?policy, "Audit queue started");

        Self {
            shared,
            workers: Mutex::new(handles),
        }
    }

    /// Hands an event to the background workers.
    ///
    /// Returns as soon as the event is queued. Under
    /// [`OverflowPolicy::Block`] a full queue delays the caller for at most
    /// the configured timeout.
    pub async fn enqueue(&self, event: SecurityEvent) -> EnqueueOutcome {
        let shared = &self.shared;
        let deadline = match shared.policy {
            OverflowPolicy::Block { timeout } => Some(Instant::now() + timeout),
            OverflowPolicy::DropOldest => None,
        };

        loop {
            let mut space = pin!(shared.space_ready.notified());
            space.as_mut().enable();

            {
                let mut pending = shared.lock();
                if shared.closed.load(Ordering::SeqCst) {
                    drop(pending);
                    warn!(
                        target: AUDIT_LOG_TARGET,
                        event_id = %event.event_id(),
                        event_type = %event.event_type(),
                        severity = %event.severity(),
                        principal_id = ?event.principal_id(),
                        "Audit queue closed, event not persisted"
                    );
                    return EnqueueOutcome::Closed;
                }

                if pending.len() < shared.capacity {
                    pending.push_back(event);
                    drop(pending);
                    shared.enqueued.fetch_add(1, Ordering::Relaxed);
                    shared.item_ready.notify_one();
                    return EnqueueOutcome::Queued;
                }

                if deadline.is_none() {
                    let victim = pending
                        .iter()
                        .position(|e| e.severity() < SeverityLevel::High)
                        .or_else(|| (event.severity() >= SeverityLevel::High).then_some(0));

                    let Some(victim) = victim.and_then(|i| pending.remove(i)) else {
                        drop(pending);
                        shared.dropped.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            target: AUDIT_LOG_TARGET,
                            event_id = %event.event_id(),
                            event_type = %event.event_type(),
                            severity = %event.severity(),
                            principal_id = ?event.principal_id(),
                            "Audit queue full of higher-severity events, event dropped"
                        );
                        return EnqueueOutcome::Dropped;
                    };

                    pending.push_back(event);
                    drop(pending);
                    shared.enqueued.fetch_add(1, Ordering::Relaxed);
                    shared.dropped.fetch_add(1, Ordering::Relaxed);
                    shared.item_ready.notify_one();
                    warn!(
                        target: AUDIT_LOG_TARGET,
                        event_id = %victim.event_id(),
                        event_type = %victim.event_type(),
                        severity = %victim.severity(),
                        principal_id = ?victim.principal_id(),
                        "Audit queue full, pending event evicted"
                    );
                    return EnqueueOutcome::QueuedEvictedOldest;
                }
            }

            if let Some(deadline) = deadline
                && tokio::time::timeout_at(deadline, space).await.is_err()
            {
                shared.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    target: AUDIT_LOG_TARGET,
                    event_id = %event.event_id(),
                    event_type = %event.event_type(),
                    severity = %event.severity(),
                    principal_id = ?event.principal_id(),
                    "Audit queue full, event dropped after waiting"
                );
                return EnqueueOutcome::Dropped;
            }
        }
    }

    /// Current counters.
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            enqueued: self.shared.enqueued.load(Ordering::Relaxed),
            processed: self.shared.processed.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
            pending: self.shared.lock().len(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Stops accepting events, drains what is pending and joins the workers.
    pub async fn shutdown(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.item_ready.notify_waiters();
        self.shared.space_ready.notify_waiters();

        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
            workers.drain(..).collect()
        };

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(target: AUDIT_LOG_TARGET, error = %e, "Audit worker ended abnormally");
            }
        }

        let stats = self.stats();
        debug!(
            processed = stats.processed,
            dropped = stats.dropped,
            "Audit queue shut down"
        );
    }
}

impl std::fmt::Debug for AuditQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditQueue")
            .field("capacity", &self.shared.capacity)
            .field("policy", &self.shared.policy)
            .field("stats", &self.stats())
            .finish()
    }
}

async fn run_worker(worker: usize, shared: Arc<Shared>, writer: Arc<AuditWriter>) {
    loop {
        let mut ready = pin!(shared.item_ready.notified());
        ready.as_mut().enable();

        let next = shared.lock().pop_front();
        match next {
            Some(event) => {
                shared.space_ready.notify_one();
                writer.store(event).await;
                shared.processed.fetch_add(1, Ordering::Relaxed);
            }
            None if shared.closed.load(Ordering::SeqCst) => break,
            None => ready.await,
        }
    }
    debug!(worker, "Audit worker stopped");
}
