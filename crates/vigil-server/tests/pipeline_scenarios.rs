use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use time::macros::datetime;
use vigil_audit::testing::RecordingAuditLogger;
use vigil_auth::{
    Command, CredentialContext, GuardConfig, GuardError, GuardResult, RequestContext, RequestMeta,
    StageId, ValidationStage,
};
use vigil_core::{ManualClock, SecurityEventType, SeverityLevel};
use vigil_server::{AppConfig, GuardPipeline};

/// Stand-in for an ownership or payload validator that runs after the
/// identity stages.
#[derive(Default)]
struct CountingStage {
    calls: AtomicUsize,
}

impl CountingStage {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ValidationStage for CountingStage {
    fn name(&self) -> &str {
        "ownership"
    }

    async fn validate(&self, _command: &Command, _ctx: &RequestContext) -> GuardResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct PanickingStage;

#[async_trait]
impl ValidationStage for PanickingStage {
    fn name(&self) -> &str {
        "taxonomy"
    }

    async fn validate(&self, _command: &Command, _ctx: &RequestContext) -> GuardResult<()> {
        panic!("taxonomy index missing");
    }
}

struct Harness {
    pipeline: GuardPipeline,
    audit: Arc<RecordingAuditLogger>,
    clock: ManualClock,
    business: Arc<CountingStage>,
}

fn harness(config: AppConfig) -> Harness {
    let audit = Arc::new(RecordingAuditLogger::new());
    let clock = ManualClock::new(datetime!(2026-05-04 08:00 UTC));
    let business = Arc::new(CountingStage::default());
    let pipeline = GuardPipeline::builder(&config)
        .audit_logger(audit.clone())
        .clock(Arc::new(clock.clone()))
        .build()
        .unwrap()
        .with_business_stages([business.clone() as Arc<dyn ValidationStage>]);
    Harness {
        pipeline,
        audit,
        clock,
        business,
    }
}

fn token(subject: &str) -> RequestContext {
    RequestContext::new(CredentialContext::verified_token(subject))
        .with_meta(RequestMeta::default().with_request_id("req-1"))
}

fn session(principal: i64, sid: &str) -> RequestContext {
    RequestContext::new(
        CredentialContext::verified_token(principal.to_string()).with_token_id(sid),
    )
}

#[tokio::test]
async fn test_scenario_a_matching_identity_continues() {
    let h = harness(AppConfig::default());

    h.pipeline
        .validate(&Command::read(42, 1001), &token("42"))
        .await
        .unwrap();

    assert_eq!(h.business.calls(), 1);
    let events = h.audit.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].severity(), SeverityLevel::Info);
    assert_eq!(
        events[0].event_type(),
        SecurityEventType::SecurityValidationSuccess
    );
    assert_eq!(events[0].request_id(), Some("req-1"));
    h.pipeline.shutdown().await;
}

#[tokio::test]
async fn test_scenario_b_mismatch_is_denied() {
    let h = harness(AppConfig::default());

    let err = h
        .pipeline
        .validate(&Command::update(42, 1001), &token("99"))
        .await
        .unwrap_err();

    assert_eq!(err, GuardError::IdentityMismatch);
    assert_eq!(err.public_message(), "access denied");
    assert_eq!(h.business.calls(), 0);

    let critical = h.audit.of_severity(SeverityLevel::Critical);
    assert_eq!(critical.len(), 1);
    assert_eq!(critical[0].detail("tokenUserId").unwrap(), 99);
    assert_eq!(critical[0].detail("pathUserId").unwrap(), 42);
    assert_eq!(h.audit.len(), 1);
    h.pipeline.shutdown().await;
}

#[tokio::test]
async fn test_missing_credential_never_reaches_business_stage() {
    let h = harness(AppConfig::default());

    let err = h
        .pipeline
        .validate(
            &Command::delete(42, 1),
            &RequestContext::new(CredentialContext::anonymous()),
        )
        .await
        .unwrap_err();

    assert_eq!(err, GuardError::AuthenticationMissing);
    assert_eq!(h.business.calls(), 0);
    h.pipeline.shutdown().await;
}

#[tokio::test]
async fn test_scenario_c_fourth_session_rejected() {
    let h = harness(AppConfig::default());

    for sid in ["a", "b", "c"] {
        h.pipeline
            .validate(&Command::read(7, 1), &session(7, sid))
            .await
            .unwrap();
    }
    let err = h
        .pipeline
        .validate(&Command::read(7, 1), &session(7, "d"))
        .await
        .unwrap_err();

    assert_eq!(err, GuardError::SessionCapExceeded);
    assert_eq!(err.public_message(), "too many active sessions");
    let sessions = h.pipeline.sessions().unwrap();
    assert_eq!(sessions.live_sessions(7).await.unwrap(), 3);
    assert_eq!(
        h.audit
            .of_type(SecurityEventType::ConcurrentSessionViolation)
            .len(),
        1
    );
    assert_eq!(h.business.calls(), 3);
    h.pipeline.shutdown().await;
}

#[tokio::test]
async fn test_scenario_d_idle_session_frees_slot() {
    let h = harness(AppConfig::default());
    let ttl = h.pipeline.config().guard.session.session_ttl;

    h.pipeline
        .validate(&Command::read(7, 1), &session(7, "a"))
        .await
        .unwrap();
    h.clock.advance(Duration::from_secs(300));
    for sid in ["b", "c"] {
        h.pipeline
            .validate(&Command::read(7, 1), &session(7, sid))
            .await
            .unwrap();
    }

    h.clock
        .advance(ttl - Duration::from_secs(300) + Duration::from_secs(1));
    h.pipeline
        .validate(&Command::read(7, 1), &session(7, "d"))
        .await
        .unwrap();

    let sessions = h.pipeline.sessions().unwrap();
    assert_eq!(sessions.live_sessions(7).await.unwrap(), 3);
    h.pipeline.shutdown().await;
}

#[tokio::test]
async fn test_chain_without_identity_stage() {
    let config = AppConfig {
        guard: GuardConfig {
            stages: vec![StageId::ConcurrentSession],
            ..GuardConfig::default()
        },
        ..AppConfig::default()
    };
    let h = harness(config);

    h.pipeline
        .validate(&Command::read(42, 1), &token("99"))
        .await
        .unwrap();

    assert!(!h.pipeline.chain().contains("identity_binding"));
    assert_eq!(h.business.calls(), 1);
    assert!(
        h.audit
            .of_type(SecurityEventType::PathParameterManipulation)
            .is_empty()
    );
    h.pipeline.shutdown().await;
}

#[tokio::test]
async fn test_panicking_business_stage_is_contained() {
    let audit = Arc::new(RecordingAuditLogger::new());
    let pipeline = GuardPipeline::builder(&AppConfig::default())
        .audit_logger(audit.clone())
        .business_stage(Arc::new(PanickingStage))
        .build()
        .unwrap();

    let err = pipeline
        .validate(&Command::read(42, 1), &token("42"))
        .await
        .unwrap_err();

    assert_eq!(err.public_message(), "internal error");
    let failures = audit.of_type(SecurityEventType::UnexpectedStageFailure);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].severity(), SeverityLevel::Critical);
    assert_eq!(failures[0].detail("stage").unwrap(), "taxonomy");
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_audit_records_are_persisted_and_alerted() {
    let pipeline = GuardPipeline::from_config(&AppConfig::default()).unwrap();
    let mut alerts = pipeline.subscribe_alerts();

    pipeline
        .validate(&Command::read(42, 1), &token("42"))
        .await
        .unwrap();
    let _ = pipeline
        .validate(&Command::update(42, 1001), &token("99"))
        .await;
    pipeline.shutdown().await;

    let sink = pipeline.audit_sink();
    assert_eq!(sink.count().await.unwrap(), 2);
    for id in 1..=2 {
        assert!(pipeline.audit_service().verify_record(id).await.unwrap());
    }

    let alert = alerts.try_recv().unwrap();
    assert_eq!(
        alert.event_type(),
        SecurityEventType::PathParameterManipulation
    );
    assert!(alerts.try_recv().is_err());

    let stats = pipeline.queue_stats();
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.dropped, 0);
}

#[tokio::test]
async fn test_logout_revokes_session() {
    let h = harness(AppConfig::default());
    for sid in ["a", "b", "c"] {
        h.pipeline
            .validate(&Command::read(7, 1), &session(7, sid))
            .await
            .unwrap();
    }

    assert!(
        h.pipeline
            .revoke_session(7, "b", &RequestMeta::default())
            .await
            .unwrap()
    );
    h.pipeline
        .validate(&Command::read(7, 1), &session(7, "d"))
        .await
        .unwrap();
    assert_eq!(h.audit.of_type(SecurityEventType::SessionRevoked).len(), 1);
    h.pipeline.shutdown().await;
}
