//! # vigil-auth
//!
//! Identity binding and session control for the content API.
//!
//! Requests pass through a [`ValidationChain`] assembled once at startup.
//! The built-in stages are:
//!
//! - [`IdentityBindingValidator`] - the credential principal must equal the
//!   principal named in the path; a mismatch is an attack signal
//! - [`ConcurrentSessionValidator`] - caps live sessions per principal
//!
//! Business validators implement [`ValidationStage`] and are appended after
//! the built-in stages by the composition root.

pub mod chain;
pub mod command;
pub mod config;
pub mod context;
pub mod error;
pub mod identity;
pub mod session;

pub use chain::{DynValidationStage, StageId, ValidationChain, ValidationStage};
pub use command::{Command, PathBinding};
pub use config::{ConfigError, GuardConfig, IdentityConfig, MAX_SESSION_TTL, SessionConfig};
pub use context::{CredentialContext, CredentialKind, RequestContext, RequestMeta};
pub use error::{ErrorCategory, GuardError, GuardResult};
pub use identity::IdentityBindingValidator;
pub use session::{
    ConcurrentSessionValidator, DynSessionStore, InMemorySessionStore, SessionDecision,
    SessionStore, extract_session_id,
};
