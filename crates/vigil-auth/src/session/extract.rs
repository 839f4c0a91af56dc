//! Session id extraction.

use sha2::{Digest, Sha256};

use crate::context::CredentialContext;

/// Hex characters kept from the raw credential fingerprint.
pub const FINGERPRINT_LEN: usize = 32;

/// Where a session id came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionIdSource {
    TokenId,
    SessionClaim,
    Fingerprint,
}

impl SessionIdSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TokenId => "token_id",
            Self::SessionClaim => "session_claim",
            Self::Fingerprint => "fingerprint",
        }
    }
}

/// A session id and its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionId {
    pub value: String,
    pub source: SessionIdSource,
}

/// Derives the session id for a credential.
///
/// Precedence is the token id claim, then the session claim, then a SHA-256
/// fingerprint of the raw credential. The raw credential itself is never
/// returned. Blank claims are ignored. `None` means the call is stateless.
pub fn extract_session_id(credential: &CredentialContext) -> Option<SessionId> {
    if !credential.present {
        return None;
    }

    let non_blank = |claim: &Option<String>| {
        claim
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
    };

    if let Some(value) = non_blank(&credential.token_id_claim) {
        return Some(SessionId {
            value,
            source: SessionIdSource::TokenId,
        });
    }
    if let Some(value) = non_blank(&credential.session_claim) {
        return Some(SessionId {
            value,
            source: SessionIdSource::SessionClaim,
        });
    }

    credential
        .raw_credential
        .as_deref()
        .filter(|raw| !raw.is_empty())
        .map(|raw| SessionId {
            value: fingerprint(raw),
            source: SessionIdSource::Fingerprint,
        })
}

fn fingerprint(raw: &str) -> String {
    let mut digest = hex::encode(Sha256::digest(raw.as_bytes()));
    digest.truncate(FINGERPRINT_LEN);
    digest
}
