use thiserror::Error;

/// Errors from fetching a record's revision history.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The platform answered 401/403. Fatal to any enclosing batch job; the
    /// session store has already been invalidated by the time this
    /// propagates.
    #[error("credentials expired or rejected by the platform")]
    CredentialsExpired,

    /// 429 backoff gave up. A normal per-record failure.
    #[error("throttled and retries exhausted after {attempts} attempts")]
    RateLimited { attempts: u32 },

    /// Any other HTTP error status, or an undecodable response body.
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PlatformError {
    /// Whether this error must abort the whole batch rather than be tallied
    /// against one record.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::CredentialsExpired)
    }
}
