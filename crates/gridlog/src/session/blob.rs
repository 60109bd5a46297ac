//! The credential blob: a serialized cookie set plus validity metadata.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// How long a validation result is trusted before the blob is considered
/// stale and must be re-probed (5 minutes).
pub const FRESHNESS_WINDOW_SECS: i64 = 300;

/// One cookie from the authenticated browser session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub http_only: bool,
    pub secure: bool,
}

/// Logical session states derived from the stored blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No blob has ever been stored.
    Absent,
    /// The blob passed validation within the freshness window.
    Valid,
    /// The blob was valid at last probe but the freshness window has
    /// elapsed; it must be re-probed before use.
    Stale,
    /// The blob was rejected (401/403 observed or probe failed).
    Invalid,
}

/// The single authentication credential the engine holds.
///
/// Owned exclusively by the [`super::SessionStore`]; mutated only by the
/// acquirer (on mint) and the validator (on probe). The dispatcher and
/// orchestrator only ever read it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialBlob {
    pub cookies: Vec<SessionCookie>,
    pub valid: bool,
    pub used_otp: bool,
    pub validated_at: DateTime<Utc>,
}

impl CredentialBlob {
    /// Build a freshly minted, just-validated blob.
    #[must_use]
    pub fn minted(cookies: Vec<SessionCookie>, used_otp: bool) -> Self {
        Self {
            cookies,
            valid: true,
            used_otp,
            validated_at: Utc::now(),
        }
    }

    /// Render the `Cookie:` request header value for this blob.
    #[must_use]
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Derive the logical state of this blob at `now`.
    #[must_use]
    pub fn state_at(&self, now: DateTime<Utc>) -> SessionState {
        if !self.valid {
            return SessionState::Invalid;
        }
        if now - self.validated_at > Duration::seconds(FRESHNESS_WINDOW_SECS) {
            SessionState::Stale
        } else {
            SessionState::Valid
        }
    }
}
