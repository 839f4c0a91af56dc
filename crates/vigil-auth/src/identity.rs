//! Identity binding stage.
//!
//! Proves that the principal named by the verified credential is the
//! principal named in the request path. A mismatch is treated as an active
//! manipulation attempt, not an ordinary authorization failure.
//!
//! All events go through the async audit entry point so the decision is
//! returned before the record is durable.

use async_trait::async_trait;
use tracing::{debug, warn};
use vigil_audit::DynAuditLogger;
use vigil_core::{SecurityEvent, SecurityEventBuilder, SecurityEventType, SharedClock};

use crate::chain::{StageId, ValidationStage};
use crate::command::{Command, PathBinding};
use crate::context::{CredentialKind, RequestContext};
use crate::error::{GuardError, GuardResult};

pub struct IdentityBindingValidator {
    audit: DynAuditLogger,
    clock: SharedClock,
    expected_kind: CredentialKind,
}

impl IdentityBindingValidator {
    pub fn new(audit: DynAuditLogger, clock: SharedClock) -> Self {
        Self {
            audit,
            clock,
            expected_kind: CredentialKind::VerifiedToken,
        }
    }

    /// Overrides the credential kind the stage accepts.
    pub fn with_expected_kind(mut self, kind: CredentialKind) -> Self {
        self.expected_kind = kind;
        self
    }

    fn event(
        &self,
        event_type: SecurityEventType,
        command: &Command,
        binding: PathBinding,
        ctx: &RequestContext,
    ) -> SecurityEventBuilder {
        ctx.meta.apply(
            SecurityEvent::typed(event_type)
                .timestamp(self.clock.now())
                .detail("operation", command.operation())
                .detail("resourceId", binding.resource_id),
        )
    }

    async fn emit(&self, builder: SecurityEventBuilder) {
        match builder.build() {
            Ok(event) => self.audit.log_security_event_async(event).await,
            Err(e) => warn!(error = %e, "Identity binding event could not be built"),
        }
    }
}

#[async_trait]
impl ValidationStage for IdentityBindingValidator {
    fn name(&self) -> &str {
        StageId::IdentityBinding.as_str()
    }

    async fn validate(&self, command: &Command, ctx: &RequestContext) -> GuardResult<()> {
        let Some(binding) = command.path_binding() else {
            return Ok(());
        };
        let credential = &ctx.credential;

        if !credential.present {
            self.emit(self.event(SecurityEventType::MissingAuthentication, command, binding, ctx))
                .await;
            return Err(GuardError::AuthenticationMissing);
        }

        if credential.kind != self.expected_kind {
            self.emit(
                self.event(SecurityEventType::InvalidTokenType, command, binding, ctx)
                    .detail("credentialKind", credential.kind.as_str())
                    .detail("expectedKind", self.expected_kind.as_str()),
            )
            .await;
            return Err(GuardError::AuthenticationTypeInvalid);
        }

        let Some(token_principal) = credential.subject_principal_id() else {
            self.emit(
                self.event(SecurityEventType::InvalidTokenSubject, command, binding, ctx)
                    .detail("subjectLength", credential.subject_claim.len()),
            )
            .await;
            return Err(GuardError::AuthenticationSubjectInvalid);
        };

        if token_principal != binding.principal_id_from_path {
            warn!(
                token_principal,
                path_principal = binding.principal_id_from_path,
                resource_id = binding.resource_id,
                operation = command.operation(),
                "Path parameter manipulation detected"
            );
            self.emit(
                self.event(SecurityEventType::PathParameterManipulation, command, binding, ctx)
                    .principal_id(token_principal)
                    .detail("tokenUserId", token_principal)
                    .detail("pathUserId", binding.principal_id_from_path),
            )
            .await;
            return Err(GuardError::IdentityMismatch);
        }

        debug!(principal_id = token_principal, operation = command.operation(), "Identity bound");
        self.emit(
            self.event(SecurityEventType::SecurityValidationSuccess, command, binding, ctx)
                .principal_id(token_principal),
        )
        .await;
        Ok(())
    }
}
