//! Session registry storage.
//!
//! [`SessionStore`] is the seam for swapping the in-process registry for a
//! shared cache. Whatever the backend, `check_and_register` must perform
//! purge, lookup, cap check, and insert as one atomic unit per principal.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use time::OffsetDateTime;

use crate::error::GuardResult;

/// Result of a registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionDecision {
    /// The session was already live; its timestamp was refreshed.
    Refreshed { live: usize, purged: usize },
    /// A new session was registered.
    Registered { live: usize, purged: usize },
    /// The principal is at the cap; nothing was registered.
    Rejected { live: usize, purged: usize },
}

impl SessionDecision {
    /// Live sessions after the call.
    pub fn live(&self) -> usize {
        match self {
            Self::Refreshed { live, .. }
            | Self::Registered { live, .. }
            | Self::Rejected { live, .. } => *live,
        }
    }

    /// Expired sessions removed during the call.
    pub fn purged(&self) -> usize {
        match self {
            Self::Refreshed { purged, .. }
            | Self::Registered { purged, .. }
            | Self::Rejected { purged, .. } => *purged,
        }
    }

    pub fn is_allowed(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }
}

/// Per-principal map of live session ids.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Purges expired entries, then refreshes, registers, or rejects
    /// `session_id` against `cap`.
    async fn check_and_register(
        &self,
        principal_id: i64,
        session_id: &str,
        now: OffsetDateTime,
        ttl: Duration,
        cap: usize,
    ) -> GuardResult<SessionDecision>;

    /// Live sessions for a principal at `now`.
    async fn live_count(&self, principal_id: i64, now: OffsetDateTime, ttl: Duration)
    -> GuardResult<usize>;

    /// Removes one session. Returns `true` if it existed.
    async fn remove_session(&self, principal_id: i64, session_id: &str) -> GuardResult<bool>;

    /// Removes every expired entry across all principals.
    async fn purge_expired(&self, now: OffsetDateTime, ttl: Duration) -> GuardResult<usize>;
}

/// Type alias for a shared session store.
pub type DynSessionStore = Arc<dyn SessionStore>;

/// Sessions of one principal: session id to last activity.
#[derive(Debug, Default, Clone)]
pub struct PrincipalSessions {
    sessions: HashMap<String, OffsetDateTime>,
}

impl PrincipalSessions {
    /// Drops entries last active before `cutoff`. Returns how many.
    fn purge(&mut self, cutoff: OffsetDateTime) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, last| *last >= cutoff);
        before - self.sessions.len()
    }

    fn live(&self, cutoff: OffsetDateTime) -> usize {
        self.sessions.values().filter(|last| **last >= cutoff).count()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn last_activity(&self, session_id: &str) -> Option<OffsetDateTime> {
        self.sessions.get(session_id).copied()
    }
}

/// Single-instance session store.
///
/// The dashmap entry guard holds the shard write lock for the whole
/// compound operation, so each principal has one serialization point while
/// unrelated principals proceed in parallel.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    principals: DashMap<i64, PrincipalSessions>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one principal's sessions.
    pub fn sessions_of(&self, principal_id: i64) -> Option<PrincipalSessions> {
        self.principals.get(&principal_id).map(|s| s.value().clone())
    }

    /// Principals with at least one tracked session.
    pub fn principal_count(&self) -> usize {
        self.principals.len()
    }
}

/// Oldest activity time still considered live. Saturates at the epoch for
/// TTLs longer than the representable range.
fn cutoff(now: OffsetDateTime, ttl: Duration) -> OffsetDateTime {
    time::Duration::try_from(ttl)
        .ok()
        .and_then(|ttl| now.checked_sub(ttl))
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn check_and_register(
        &self,
        principal_id: i64,
        session_id: &str,
        now: OffsetDateTime,
        ttl: Duration,
        cap: usize,
    ) -> GuardResult<SessionDecision> {
        let mut entry = self.principals.entry(principal_id).or_default();
        let sessions = entry.value_mut();
        let purged = sessions.purge(cutoff(now, ttl));

        if let Some(last) = sessions.sessions.get_mut(session_id) {
            *last = now;
            return Ok(SessionDecision::Refreshed {
                live: sessions.len(),
                purged,
            });
        }

        if sessions.len() >= cap {
            return Ok(SessionDecision::Rejected {
                live: sessions.len(),
                purged,
            });
        }

        sessions.sessions.insert(session_id.to_string(), now);
        Ok(SessionDecision::Registered {
            live: sessions.len(),
            purged,
        })
    }

    async fn live_count(
        &self,
        principal_id: i64,
        now: OffsetDateTime,
        ttl: Duration,
    ) -> GuardResult<usize> {
        Ok(self
            .principals
            .get(&principal_id)
            .map(|s| s.live(cutoff(now, ttl)))
            .unwrap_or(0))
    }

    async fn remove_session(&self, principal_id: i64, session_id: &str) -> GuardResult<bool> {
        let removed = match self.principals.get_mut(&principal_id) {
            Some(mut sessions) => sessions.sessions.remove(session_id).is_some(),
            None => return Ok(false),
        };
        self.principals.remove_if(&principal_id, |_, s| s.is_empty());
        Ok(removed)
    }

    async fn purge_expired(&self, now: OffsetDateTime, ttl: Duration) -> GuardResult<usize> {
        let cutoff = cutoff(now, ttl);
        let mut purged = 0;
        self.principals.retain(|_, sessions| {
            purged += sessions.purge(cutoff);
            !sessions.is_empty()
        });
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const TTL: Duration = Duration::from_secs(1800);

    fn t0() -> OffsetDateTime {
        datetime!(2026-03-01 12:00 UTC)
    }

    #[tokio::test]
    async fn test_cap_enforced() {
        let store = InMemorySessionStore::new();
        for id in ["a", "b", "c"] {
            let decision = store.check_and_register(7, id, t0(), TTL, 3).await.unwrap();
            assert!(matches!(decision, SessionDecision::Registered { .. }));
        }

        let decision = store.check_and_register(7, "d", t0(), TTL, 3).await.unwrap();
        assert_eq!(decision, SessionDecision::Rejected { live: 3, purged: 0 });
        assert_eq!(store.live_count(7, t0(), TTL).await.unwrap(), 3);
        assert_eq!(store.sessions_of(7).unwrap().last_activity("d"), None);
    }

    #[tokio::test]
    async fn test_refresh_keeps_count() {
        let store = InMemorySessionStore::new();
        store.check_and_register(7, "a", t0(), TTL, 3).await.unwrap();
        store.check_and_register(7, "b", t0(), TTL, 3).await.unwrap();

        let later = t0() + Duration::from_secs(60);
        let decision = store.check_and_register(7, "a", later, TTL, 3).await.unwrap();

        assert_eq!(decision, SessionDecision::Refreshed { live: 2, purged: 0 });
        assert_eq!(store.sessions_of(7).unwrap().last_activity("a"), Some(later));
    }

    #[tokio::test]
    async fn test_refresh_allowed_at_cap() {
        let store = InMemorySessionStore::new();
        for id in ["a", "b", "c"] {
            store.check_and_register(7, id, t0(), TTL, 3).await.unwrap();
        }
        let decision = store.check_and_register(7, "b", t0(), TTL, 3).await.unwrap();
        assert!(decision.is_allowed());
        assert_eq!(decision.live(), 3);
    }

    #[tokio::test]
    async fn test_expired_entry_purged_before_cap_check() {
        let store = InMemorySessionStore::new();
        store.check_and_register(7, "a", t0(), TTL, 3).await.unwrap();
        let mid = t0() + Duration::from_secs(600);
        store.check_and_register(7, "b", mid, TTL, 3).await.unwrap();
        store.check_and_register(7, "c", mid, TTL, 3).await.unwrap();

        let now = t0() + TTL + Duration::from_secs(1);
        let decision = store.check_and_register(7, "d", now, TTL, 3).await.unwrap();

        assert_eq!(decision, SessionDecision::Registered { live: 3, purged: 1 });
        assert_eq!(store.sessions_of(7).unwrap().last_activity("a"), None);
    }

    #[tokio::test]
    async fn test_entry_exactly_at_ttl_is_live() {
        let store = InMemorySessionStore::new();
        store.check_and_register(7, "a", t0(), TTL, 1).await.unwrap();

        let decision = store
            .check_and_register(7, "b", t0() + TTL, TTL, 1)
            .await
            .unwrap();
        assert!(!decision.is_allowed());
    }

    #[tokio::test]
    async fn test_unbounded_ttl_keeps_sessions_live() {
        let store = InMemorySessionStore::new();
        let huge = Duration::from_secs(u64::MAX);
        store.check_and_register(7, "a", t0(), huge, 3).await.unwrap();

        let later = t0() + Duration::from_secs(365 * 24 * 3600);
        assert_eq!(store.live_count(7, later, huge).await.unwrap(), 1);
        assert_eq!(store.purge_expired(later, huge).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_principals_are_independent() {
        let store = InMemorySessionStore::new();
        store.check_and_register(1, "a", t0(), TTL, 1).await.unwrap();
        let decision = store.check_and_register(2, "a", t0(), TTL, 1).await.unwrap();
        assert!(matches!(decision, SessionDecision::Registered { live: 1, .. }));
        assert_eq!(store.principal_count(), 2);
    }

    #[tokio::test]
    async fn test_remove_session_frees_slot() {
        let store = InMemorySessionStore::new();
        store.check_and_register(7, "a", t0(), TTL, 1).await.unwrap();

        assert!(store.remove_session(7, "a").await.unwrap());
        assert!(!store.remove_session(7, "a").await.unwrap());
        assert!(!store.remove_session(8, "a").await.unwrap());
        assert_eq!(store.principal_count(), 0);

        let decision = store.check_and_register(7, "b", t0(), TTL, 1).await.unwrap();
        assert!(decision.is_allowed());
    }

    #[tokio::test]
    async fn test_purge_expired_sweeps_all_principals() {
        let store = InMemorySessionStore::new();
        store.check_and_register(1, "a", t0(), TTL, 3).await.unwrap();
        store.check_and_register(2, "a", t0(), TTL, 3).await.unwrap();
        let fresh = t0() + Duration::from_secs(1000);
        store.check_and_register(2, "b", fresh, TTL, 3).await.unwrap();

        let purged = store
            .purge_expired(t0() + TTL + Duration::from_secs(1), TTL)
            .await
            .unwrap();

        assert_eq!(purged, 2);
        assert!(store.sessions_of(1).is_none());
        assert_eq!(store.sessions_of(2).unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registrations_respect_cap() {
        let store = Arc::new(InMemorySessionStore::new());
        let mut handles = Vec::new();
        for i in 0..64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .check_and_register(7, &format!("s{i}"), t0(), TTL, 3)
                    .await
                    .unwrap()
            }));
        }

        let mut registered = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), SessionDecision::Registered { .. }) {
                registered += 1;
            }
        }

        assert_eq!(registered, 3);
        assert_eq!(store.live_count(7, t0(), TTL).await.unwrap(), 3);
    }
}
