//! Validation chain.
//!
//! The chain is an ordered, immutable list of stages assembled once by the
//! composition root. Stages run in order; the first failure ends the run.
//! A stage that is not in the list is never invoked.
//!
//! Each stage runs under `catch_unwind`. A panic, or a stage returning
//! [`GuardError::UnexpectedStageFailure`], is logged in full, recorded as a
//! CRITICAL `UNEXPECTED_STAGE_FAILURE` event, and returned to the caller as a
//! generic internal failure.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use vigil_audit::DynAuditLogger;
use vigil_core::{SecurityEvent, SecurityEventType, SharedClock};

use crate::command::Command;
use crate::context::RequestContext;
use crate::error::{GuardError, GuardResult};

/// Built-in stages selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    IdentityBinding,
    ConcurrentSession,
}

impl StageId {
    /// Every built-in stage in default order.
    pub const ALL: [StageId; 2] = [StageId::IdentityBinding, StageId::ConcurrentSession];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IdentityBinding => "identity_binding",
            Self::ConcurrentSession => "concurrent_session",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of the validation pipeline.
///
/// Stages act on the commands they understand and return `Ok(())` for the
/// rest.
#[async_trait]
pub trait ValidationStage: Send + Sync {
    /// Stable stage name used in logs and audit details.
    fn name(&self) -> &str;

    async fn validate(&self, command: &Command, ctx: &RequestContext) -> GuardResult<()>;
}

/// Type alias for a shared stage.
pub type DynValidationStage = Arc<dyn ValidationStage>;

/// Ordered sequence of validation stages.
pub struct ValidationChain {
    stages: Vec<DynValidationStage>,
    audit: DynAuditLogger,
    clock: SharedClock,
}

impl ValidationChain {
    /// Creates an empty chain. An empty chain accepts every command.
    pub fn new(audit: DynAuditLogger, clock: SharedClock) -> Self {
        Self {
            stages: Vec::new(),
            audit,
            clock,
        }
    }

    /// Appends a stage.
    pub fn with_stage(mut self, stage: DynValidationStage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Appends several stages in order.
    pub fn with_stages(mut self, stages: impl IntoIterator<Item = DynValidationStage>) -> Self {
        self.stages.extend(stages);
        self
    }

    /// Stage names in execution order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stages.iter().any(|s| s.name() == name)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs every stage in order, stopping at the first failure.
    pub async fn validate(&self, command: &Command, ctx: &RequestContext) -> GuardResult<()> {
        for stage in &self.stages {
            let outcome = AssertUnwindSafe(stage.validate(command, ctx))
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(())) => {
                    debug!(stage = stage.name(), operation = command.operation(), "Stage passed");
                }
                Ok(Err(GuardError::UnexpectedStageFailure { detail, .. })) => {
                    return Err(self.unexpected(stage.name(), &detail, command, ctx).await);
                }
                Ok(Err(e)) => {
                    debug!(
                        stage = stage.name(),
                        operation = command.operation(),
                        category = e.category().as_str(),
                        "Stage rejected command"
                    );
                    return Err(e);
                }
                Err(panic) => {
                    let detail = panic_message(panic.as_ref());
                    return Err(self.unexpected(stage.name(), &detail, command, ctx).await);
                }
            }
        }
        Ok(())
    }

    async fn unexpected(
        &self,
        stage: &str,
        detail: &str,
        command: &Command,
        ctx: &RequestContext,
    ) -> GuardError {
        error!(
            stage,
            detail,
            operation = command.operation(),
            request_id = ?ctx.meta.request_id,
            "Validation stage failed unexpectedly"
        );

        let mut builder = ctx.meta.apply(
            SecurityEvent::typed(SecurityEventType::UnexpectedStageFailure)
                .timestamp(self.clock.now())
                .detail("stage", stage)
                .detail("operation", command.operation())
                .detail("error", detail),
        );
        if let Some(principal_id) = ctx.credential.subject_principal_id() {
            builder = builder.principal_id(principal_id);
        }
        if let Ok(event) = builder.build() {
            self.audit.log_security_event_async(event).await;
        }

        GuardError::unexpected(stage, detail)
    }
}

impl fmt::Debug for ValidationChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationChain")
            .field("stages", &self.stage_names())
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
