//! Per-principal session registry and the session cap stage.
//!
//! Session lifecycle: unknown, registered, refreshed on each hit, expired
//! once idle longer than the TTL, then removed by the next purge.

mod extract;
mod store;
mod validator;

pub use extract::{FINGERPRINT_LEN, SessionId, SessionIdSource, extract_session_id};
pub use store::{DynSessionStore, InMemorySessionStore, PrincipalSessions, SessionDecision, SessionStore};
pub use validator::ConcurrentSessionValidator;
