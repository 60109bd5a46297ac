//! Lightweight probes that confirm a stored blob is still accepted.

use std::sync::Arc;

use crate::{HttpRequest, HttpTransport};

use super::blob::CredentialBlob;
use super::error::SessionError;

/// Issues probe requests against a known-good authenticated endpoint.
///
/// Probes do not go through the rate-limited dispatcher: they are rare,
/// cheap, and must not queue behind a running batch.
pub struct SessionValidator {
    transport: Arc<dyn HttpTransport>,
    probe_url: String,
}

impl SessionValidator {
    pub fn new(transport: Arc<dyn HttpTransport>, probe_url: impl Into<String>) -> Self {
        Self {
            transport,
            probe_url: probe_url.into(),
        }
    }

    /// Probe whether `blob` is still accepted by the platform.
    ///
    /// Returns `Ok(true)` on a 2xx response, `Ok(false)` on 401/403, and
    /// [`SessionError::Probe`] for anything else (transport failure or an
    /// unexpected status) - in that last case the caller must not change the
    /// blob's state.
    pub async fn probe(&self, blob: &CredentialBlob) -> Result<bool, SessionError> {
        let request = HttpRequest::get(&self.probe_url)
            .with_header("Cookie", blob.cookie_header())
            .with_header("Accept", "application/json");

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| SessionError::Probe(e.to_string()))?;

        match response.status {
            s if (200..300).contains(&s) => Ok(true),
            401 | 403 => Ok(false),
            other => Err(SessionError::Probe(format!(
                "unexpected probe status {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HttpMethod, HttpResponse, MockTransport};

    const PROBE_URL: &str = "https://grid.example/auth/session";

    fn blob() -> CredentialBlob {
        CredentialBlob::minted(
            vec![super::super::blob::SessionCookie {
                name: "sid".to_string(),
                value: "abc".to_string(),
                domain: ".grid.example".to_string(),
                path: "/".to_string(),
                expires_at: None,
                http_only: true,
                secure: true,
            }],
            false,
        )
    }

    fn validator(transport: &MockTransport) -> SessionValidator {
        SessionValidator::new(Arc::new(transport.clone()), PROBE_URL)
    }

    #[tokio::test]
    async fn probe_accepts_2xx() {
        let transport = MockTransport::new();
        transport.push_response(HttpMethod::Get, PROBE_URL, HttpResponse::with_status(200));

        assert!(validator(&transport).probe(&blob()).await.expect("probe"));

        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            crate::header_get(&sent[0].headers, "cookie"),
            Some("sid=abc")
        );
    }

    #[tokio::test]
    async fn probe_rejects_401_and_403() {
        for status in [401u16, 403] {
            let transport = MockTransport::new();
            transport.push_response(HttpMethod::Get, PROBE_URL, HttpResponse::with_status(status));
            assert!(!validator(&transport).probe(&blob()).await.expect("probe"));
        }
    }

    #[tokio::test]
    async fn probe_surfaces_unexpected_statuses_as_errors() {
        let transport = MockTransport::new();
        transport.push_response(HttpMethod::Get, PROBE_URL, HttpResponse::with_status(500));

        let err = validator(&transport)
            .probe(&blob())
            .await
            .expect_err("500 should not decide validity");
        assert!(matches!(err, SessionError::Probe(_)));
    }
}
