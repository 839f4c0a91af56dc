//! Composition root for the guard pipeline.
//!
//! Builds the audit sink, alert publisher, audit service, session store,
//! and the configured stages, then assembles them into one immutable
//! [`ValidationChain`]. Stage order is fixed here and never changes at
//! runtime.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};
use vigil_audit::{
    AuditError, AuditService, BroadcastAlertPublisher, DynAuditLogger, DynAuditSink,
    InMemoryAuditSink, QueueStats,
};
use vigil_auth::{
    Command, ConcurrentSessionValidator, ConfigError, DynSessionStore, DynValidationStage,
    GuardResult, IdentityBindingValidator, InMemorySessionStore, RequestContext, RequestMeta,
    StageId, ValidationChain,
};
use vigil_core::{SecurityEvent, SharedClock, SystemClock};

use crate::config::AppConfig;

/// Errors raised while assembling the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid guard configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Audit setup failed: {0}")]
    Audit(#[from] AuditError),
}

/// Overrides for the collaborators [`GuardPipeline::from_config`] would
/// otherwise create.
pub struct GuardPipelineBuilder {
    config: AppConfig,
    clock: SharedClock,
    sink: Option<DynAuditSink>,
    session_store: Option<DynSessionStore>,
    audit_logger: Option<DynAuditLogger>,
    business_stages: Vec<DynValidationStage>,
}

impl GuardPipelineBuilder {
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn audit_sink(mut self, sink: DynAuditSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn session_store(mut self, store: DynSessionStore) -> Self {
        self.session_store = Some(store);
        self
    }

    /// Routes stage events to `logger` instead of the built-in audit service.
    pub fn audit_logger(mut self, logger: DynAuditLogger) -> Self {
        self.audit_logger = Some(logger);
        self
    }

    pub fn business_stage(mut self, stage: DynValidationStage) -> Self {
        self.business_stages.push(stage);
        self
    }

    /// Builds the pipeline and starts the audit workers.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Result<GuardPipeline, PipelineError> {
        let guard = &self.config.guard;
        guard.validate()?;

        let sink: DynAuditSink = match self.sink {
            Some(sink) => sink,
            None => Arc::new(InMemoryAuditSink::new()),
        };
        let alerts = Arc::new(BroadcastAlertPublisher::with_capacity(
            self.config.audit.alert_buffer,
        ));
        let service = Arc::new(AuditService::new(
            &self.config.audit,
            sink.clone(),
            alerts.clone(),
        )?);
        let audit: DynAuditLogger = match self.audit_logger {
            Some(logger) => logger,
            None => service.clone(),
        };

        let store: DynSessionStore = match self.session_store {
            Some(store) => store,
            None => Arc::new(InMemorySessionStore::new()),
        };

        let mut sessions = None;
        let mut chain = ValidationChain::new(audit.clone(), self.clock.clone());
        for stage in &guard.stages {
            let built: DynValidationStage = match stage {
                StageId::IdentityBinding => Arc::new(
                    IdentityBindingValidator::new(audit.clone(), self.clock.clone())
                        .with_expected_kind(guard.identity.expected_credential_kind),
                ),
                StageId::ConcurrentSession => {
                    let validator = Arc::new(ConcurrentSessionValidator::new(
                        store.clone(),
                        audit.clone(),
                        self.clock.clone(),
                        &guard.session,
                    ));
                    sessions = Some(validator.clone());
                    validator
                }
            };
            chain = chain.with_stage(built);
        }
        chain = chain.with_stages(self.business_stages);

        info!(stages = ?chain.stage_names(), "Guard pipeline assembled");

        Ok(GuardPipeline {
            chain,
            service,
            sink,
            alerts,
            sessions,
            config: self.config,
        })
    }
}

/// The assembled guard pipeline.
pub struct GuardPipeline {
    chain: ValidationChain,
    service: Arc<AuditService>,
    sink: DynAuditSink,
    alerts: Arc<BroadcastAlertPublisher>,
    sessions: Option<Arc<ConcurrentSessionValidator>>,
    config: AppConfig,
}

impl GuardPipeline {
    pub fn builder(config: &AppConfig) -> GuardPipelineBuilder {
        GuardPipelineBuilder {
            config: config.clone(),
            clock: Arc::new(SystemClock),
            sink: None,
            session_store: None,
            audit_logger: None,
            business_stages: Vec::new(),
        }
    }

    /// Builds the pipeline with default collaborators.
    pub fn from_config(config: &AppConfig) -> Result<Self, PipelineError> {
        Self::builder(config).build()
    }

    /// Appends business stages after the configured stages.
    pub fn with_business_stages(
        mut self,
        stages: impl IntoIterator<Item = DynValidationStage>,
    ) -> Self {
        self.chain = self.chain.with_stages(stages);
        info!(stages = ?self.chain.stage_names(), "Business stages appended");
        self
    }

    pub async fn validate(&self, command: &Command, ctx: &RequestContext) -> GuardResult<()> {
        self.chain.validate(command, ctx).await
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.chain.stage_names()
    }

    pub fn chain(&self) -> &ValidationChain {
        &self.chain
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn audit_service(&self) -> &Arc<AuditService> {
        &self.service
    }

    pub fn audit_sink(&self) -> &DynAuditSink {
        &self.sink
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.service.queue_stats()
    }

    /// Receives every event at or above the alert threshold.
    pub fn subscribe_alerts(&self) -> tokio::sync::broadcast::Receiver<SecurityEvent> {
        self.alerts.subscribe()
    }

    /// The session stage, if it is part of the chain.
    pub fn sessions(&self) -> Option<&Arc<ConcurrentSessionValidator>> {
        self.sessions.as_ref()
    }

    /// Ends a session on logout. Returns `false` if the session stage is
    /// disabled or the session was unknown.
    pub async fn revoke_session(
        &self,
        principal_id: i64,
        session_id: &str,
        meta: &RequestMeta,
    ) -> GuardResult<bool> {
        match &self.sessions {
            Some(sessions) => sessions.revoke_session(principal_id, session_id, meta).await,
            None => Ok(false),
        }
    }

    /// Periodically purges expired sessions for every principal.
    ///
    /// Returns `None` when the session stage is disabled.
    pub fn spawn_expiry_sweeper(&self) -> Option<JoinHandle<()>> {
        let sessions = self.sessions.clone()?;
        let period = self.config.guard.session.sweep_interval;
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = sessions.sweep_expired().await {
                    warn!(error = ?e, "Session sweep failed");
                }
            }
        }))
    }

    /// Drains pending audit events and stops the audit workers.
    pub async fn shutdown(&self) {
        self.service.shutdown().await;
        info!(stats = ?self.service.queue_stats(), "Audit queue drained");
    }
}

impl std::fmt::Debug for GuardPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardPipeline")
            .field("chain", &self.chain)
            .field("session_stage", &self.sessions.is_some())
            .finish()
    }
}
