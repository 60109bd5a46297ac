use thiserror::Error;

/// Errors from the session lifecycle.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No usable credential blob exists. Callers must trigger an explicit
    /// interactive login; this is never retried silently.
    #[error("no valid session; run an interactive login to mint a new credential")]
    NoValidSession,

    /// The remote login flow demanded a one-time code and none was supplied.
    #[error("login requires a one-time code")]
    OtpRequired,

    /// The platform re-presented the login form after submission; the
    /// supplied credentials were not accepted. No blob is stored.
    #[error("login rejected; check the email and password")]
    LoginRejected,

    /// The interactive login sequence failed (navigation, element lookup,
    /// timeout). No blob is stored in this case.
    #[error("interactive login failed: {0}")]
    Acquisition(String),

    /// A validation probe could not be completed (transport failure or an
    /// unexpected status). The stored blob's state is left untouched.
    #[error("session probe failed: {0}")]
    Probe(String),

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("stored credential blob is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}
