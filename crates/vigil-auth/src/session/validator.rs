//! Concurrent session stage.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use vigil_audit::DynAuditLogger;
use vigil_core::{SecurityEvent, SecurityEventBuilder, SecurityEventType, SharedClock};

use super::extract::extract_session_id;
use super::store::{DynSessionStore, SessionDecision};
use crate::chain::{StageId, ValidationStage};
use crate::command::Command;
use crate::config::SessionConfig;
use crate::context::{RequestContext, RequestMeta};
use crate::error::{GuardError, GuardResult};

/// Caps the number of live sessions per principal.
///
/// The principal is taken from the credential subject. Calls without a
/// derivable session id or principal are stateless and pass through.
pub struct ConcurrentSessionValidator {
    store: DynSessionStore,
    audit: DynAuditLogger,
    clock: SharedClock,
    max_sessions: usize,
    ttl: Duration,
}

impl ConcurrentSessionValidator {
    pub fn new(
        store: DynSessionStore,
        audit: DynAuditLogger,
        clock: SharedClock,
        config: &SessionConfig,
    ) -> Self {
        Self {
            store,
            audit,
            clock,
            max_sessions: config.max_concurrent_sessions,
            ttl: config.session_ttl,
        }
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Ends a session on logout and records `SESSION_REVOKED`.
    pub async fn revoke_session(
        &self,
        principal_id: i64,
        session_id: &str,
        meta: &RequestMeta,
    ) -> GuardResult<bool> {
        let removed = self.store.remove_session(principal_id, session_id).await?;
        if removed {
            self.emit(
                self.event(SecurityEventType::SessionRevoked, principal_id, session_id, meta),
            )
            .await;
        }
        Ok(removed)
    }

    /// Live sessions for `principal_id` right now.
    pub async fn live_sessions(&self, principal_id: i64) -> GuardResult<usize> {
        self.store
            .live_count(principal_id, self.clock.now(), self.ttl)
            .await
    }

    /// Removes expired sessions for every principal.
    pub async fn sweep_expired(&self) -> GuardResult<usize> {
        let purged = self.store.purge_expired(self.clock.now(), self.ttl).await?;
        if purged > 0 {
            debug!(purged, "Expired sessions swept");
        }
        Ok(purged)
    }

    fn event(
        &self,
        event_type: SecurityEventType,
        principal_id: i64,
        session_id: &str,
        meta: &RequestMeta,
    ) -> SecurityEventBuilder {
        meta.apply(
            SecurityEvent::typed(event_type)
                .timestamp(self.clock.now())
                .principal_id(principal_id)
                .session_id(session_id),
        )
    }

    async fn emit(&self, builder: SecurityEventBuilder) {
        match builder.build() {
            Ok(event) => self.audit.log_security_event_async(event).await,
            Err(e) => warn!(error = %e, "Session event could not be built"),
        }
    }
}

#[async_trait]
impl ValidationStage for ConcurrentSessionValidator {
    fn name(&self) -> &str {
        StageId::ConcurrentSession.as_str()
    }

    async fn validate(&self, command: &Command, ctx: &RequestContext) -> GuardResult<()> {
        let Some(session) = extract_session_id(&ctx.credential) else {
            return Ok(());
        };
        let Some(principal_id) = ctx.credential.subject_principal_id() else {
            return Ok(());
        };

        let decision = self
            .store
            .check_and_register(
                principal_id,
                &session.value,
                self.clock.now(),
                self.ttl,
                self.max_sessions,
            )
            .await?;

        match decision {
            SessionDecision::Refreshed { .. } => Ok(()),
            SessionDecision::Registered { live, purged } => {
                debug!(
                    principal_id,
                    live,
                    purged,
                    source = session.source.as_str(),
                    "Session registered"
                );
                self.emit(
                    self.event(
                        SecurityEventType::SessionRegistered,
                        principal_id,
                        &session.value,
                        &ctx.meta,
                    )
                    .detail("activeSessions", live)
                    .detail("maxSessions", self.max_sessions),
                )
                .await;
                Ok(())
            }
            SessionDecision::Rejected { live, .. } => {
                info!(
                    principal_id,
                    live,
                    max_sessions = self.max_sessions,
                    "Session cap reached"
                );
                self.emit(
                    self.event(
                        SecurityEventType::ConcurrentSessionViolation,
                        principal_id,
                        &session.value,
                        &ctx.meta,
                    )
                    .detail("operation", command.operation())
                    .detail("activeSessions", live)
                    .detail("maxSessions", self.max_sessions),
                )
                .await;
                Err(GuardError::SessionCapExceeded)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use time::macros::datetime;
    use vigil_audit::testing::RecordingAuditLogger;
    use vigil_core::{ManualClock, SeverityLevel};

    use crate::context::CredentialContext;
    use crate::session::store::InMemorySessionStore;

    struct Fixture {
        audit: Arc<RecordingAuditLogger>,
        clock: ManualClock,
        store: Arc<InMemorySessionStore>,
        validator: ConcurrentSessionValidator,
    }

    fn fixture(cap: usize) -> Fixture {
        let audit = Arc::new(RecordingAuditLogger::new());
        let clock = ManualClock::new(datetime!(2026-03-01 09:00 UTC));
        let store = Arc::new(InMemorySessionStore::new());
        let config = SessionConfig {
            max_concurrent_sessions: cap,
            ..SessionConfig::default()
        };
        let validator = ConcurrentSessionValidator::new(
            store.clone(),
            audit.clone(),
            Arc::new(clock.clone()),
            &config,
        );
        Fixture {
            audit,
            clock,
            store,
            validator,
        }
    }

    fn session(principal: &str, sid: &str) -> RequestContext {
        RequestContext::new(CredentialContext::verified_token(principal).with_token_id(sid))
    }

    #[tokio::test]
    async fn test_cap_plus_one_rejected() {
        let f = fixture(3);
        for sid in ["a", "b", "c"] {
            f.validator
                .validate(&Command::read(7, 1), &session("7", sid))
                .await
                .unwrap();
        }

        let err = f
            .validator
            .validate(&Command::read(7, 1), &session("7", "d"))
            .await
            .unwrap_err();

        assert_eq!(err, GuardError::SessionCapExceeded);
        assert_eq!(f.validator.live_sessions(7).await.unwrap(), 3);

        assert_eq!(f.audit.of_type(SecurityEventType::SessionRegistered).len(), 3);
        let violations = f.audit.of_type(SecurityEventType::ConcurrentSessionViolation);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity(), SeverityLevel::High);
        assert_eq!(violations[0].detail("activeSessions").unwrap(), 3);
        assert_eq!(violations[0].detail("maxSessions").unwrap(), 3);
        assert_eq!(violations[0].session_id(), Some("d"));
    }

    #[tokio::test]
    async fn test_revalidation_does_not_change_count() {
        let f = fixture(3);
        for _ in 0..5 {
            f.validator
                .validate(&Command::read(7, 1), &session("7", "a"))
                .await
                .unwrap();
        }
        assert_eq!(f.validator.live_sessions(7).await.unwrap(), 1);
        assert_eq!(f.audit.of_type(SecurityEventType::SessionRegistered).len(), 1);
    }

    #[tokio::test]
    async fn test_idle_session_expires() {
        let f = fixture(3);
        f.validator
            .validate(&Command::read(7, 1), &session("7", "a"))
            .await
            .unwrap();
        f.clock.advance(Duration::from_secs(600));
        for sid in ["b", "c"] {
            f.validator
                .validate(&Command::read(7, 1), &session("7", sid))
                .await
                .unwrap();
        }

        f.clock.advance(f.validator.ttl() - Duration::from_secs(600) + Duration::from_secs(1));
        f.validator
            .validate(&Command::read(7, 1), &session("7", "d"))
            .await
            .unwrap();

        assert_eq!(f.validator.live_sessions(7).await.unwrap(), 3);
        assert!(f.store.sessions_of(7).unwrap().last_activity("a").is_none());
    }

    #[tokio::test]
    async fn test_stateless_call_passes() {
        let f = fixture(1);
        let ctx = RequestContext::new(CredentialContext::verified_token("7"));
        for _ in 0..3 {
            f.validator.validate(&Command::read(7, 1), &ctx).await.unwrap();
        }
        assert!(f.audit.is_empty());
        assert_eq!(f.store.principal_count(), 0);
    }

    #[tokio::test]
    async fn test_revoke_session() {
        let f = fixture(1);
        f.validator
            .validate(&Command::read(7, 1), &session("7", "a"))
            .await
            .unwrap();

        assert!(
            f.validator
                .revoke_session(7, "a", &RequestMeta::default())
                .await
                .unwrap()
        );
        assert_eq!(f.audit.of_type(SecurityEventType::SessionRevoked).len(), 1);

        f.validator
            .validate(&Command::read(7, 1), &session("7", "b"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sweep_expired() {
        let f = fixture(3);
        f.validator
            .validate(&Command::read(7, 1), &session("7", "a"))
            .await
            .unwrap();
        f.clock.advance(f.validator.ttl() + Duration::from_secs(1));

        assert_eq!(f.validator.sweep_expired().await.unwrap(), 1);
        assert_eq!(f.store.principal_count(), 0);
    }
}
