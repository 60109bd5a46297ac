//! Gridlog - a revision-history sync engine.
//!
//! Gridlog continuously extracts field-change history (who changed an
//! assignee or status field, from what value to what, and when) for records
//! of a tabular-data platform that exposes this history only through its
//! authenticated web session. The engine:
//!
//! - maintains a browser-derived credential blob ([`session`]),
//! - paces every request to the internal activity endpoint through a single
//!   rate-limited dispatcher with 429 backoff ([`dispatch`]),
//! - parses the HTML diff fragments embedded in activity responses into
//!   typed change events ([`revision`]),
//! - and drives the whole extraction as a resumable, progress-reporting
//!   batch job ([`sync`]).
//!
//! # Features
//!
//! - `migrate` - Enables database migration support and
//!   [`connect_and_migrate`].
//! - `browser` - Enables the chromiumoxide-backed interactive credential
//!   acquirer ([`session::BrowserAcquirer`]).
//!
//! # Example
//!
//! ```ignore
//! use gridlog::{connect_and_migrate, sync::SyncEngine};
//!
//! let db = connect_and_migrate("sqlite://gridlog.db?mode=rwc").await?;
//! let engine = SyncEngine::builder().database(db).build()?;
//! let job_id = engine.start_sync(25, false).await?;
//! ```

pub mod db;
pub mod dispatch;
pub mod entity;
pub mod history;
pub mod revision;
pub mod session;
pub mod sync;
pub mod targets;

#[cfg(feature = "migrate")]
pub mod migration;

pub use db::connect;
#[cfg(feature = "migrate")]
pub use db::connect_and_migrate;
pub use entity::prelude::*;
pub use revision::{ChangeEvent, FieldKind, RecordRef};

use async_trait::async_trait;
use thiserror::Error;

/// HTTP methods the engine actually issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// HTTP headers as key/value pairs; names compare case-insensitively.
pub type HttpHeaders = Vec<(String, String)>;

/// A minimal HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HttpHeaders,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Build a GET request with no body.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Build a POST request carrying a JSON body.
    #[must_use]
    pub fn post_json(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body,
        }
    }

    /// Append a header, returning the request for chaining.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A minimal HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HttpHeaders,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// An empty response with just a status code (test helper).
    #[must_use]
    pub fn with_status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        header_get(&self.headers, name)
    }

    /// Whether the status is in the 2xx range.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("http transport error: {0}")]
    Transport(String),

    #[error("no scripted response for {method} {url}")]
    NoScriptedResponse { method: String, url: String },
}

/// Transport boundary for all HTTP I/O.
///
/// Everything network-facing in the engine (the dispatcher, the session
/// validator) talks to this trait, so tests can substitute [`MockTransport`]
/// and never open a socket.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// Get the first header value matching `name` (case-insensitive).
#[must_use]
pub fn header_get<'a>(headers: &'a HttpHeaders, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

pub mod reqwest_transport {
    //! A real HTTP transport backed by reqwest.

    use super::{HttpError, HttpHeaders, HttpMethod, HttpRequest, HttpResponse, HttpTransport};
    use async_trait::async_trait;
    use std::time::Duration;

    #[derive(Clone)]
    pub struct ReqwestTransport {
        client: reqwest::Client,
    }

    impl ReqwestTransport {
        pub fn new(client: reqwest::Client) -> Self {
            Self { client }
        }

        /// Build a transport with a request timeout, the usual entry point.
        pub fn with_timeout(timeout: Duration) -> Result<Self, HttpError> {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| HttpError::Transport(e.to_string()))?;
            Ok(Self { client })
        }
    }

    #[async_trait]
    impl HttpTransport for ReqwestTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
            let method = match request.method {
                HttpMethod::Get => reqwest::Method::GET,
                HttpMethod::Post => reqwest::Method::POST,
            };

            let mut builder = self.client.request(method, &request.url);
            for (k, v) in request.headers {
                builder = builder.header(&k, &v);
            }
            if !request.body.is_empty() {
                builder = builder.body(request.body);
            }

            let resp = builder
                .send()
                .await
                .map_err(|e| HttpError::Transport(e.to_string()))?;

            let status = resp.status().as_u16();
            let mut headers: HttpHeaders = Vec::new();
            for (name, value) in resp.headers().iter() {
                headers.push((
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                ));
            }

            let body = resp
                .bytes()
                .await
                .map_err(|e| HttpError::Transport(e.to_string()))?
                .to_vec();

            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        }
    }
}

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// In-memory scripted transport.
///
/// Used by the engine's unit and integration tests: responses are registered
/// per method + URL and consumed FIFO, and every request sent through the
/// transport is recorded for assertion.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Default)]
struct MockTransportInner {
    routes: HashMap<(HttpMethod, String), VecDeque<HttpResponse>>,
    requests: Vec<HttpRequest>,
}

impl MockTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a response for a method + URL. Multiple responses for the
    /// same key are returned in registration order.
    pub fn push_response(
        &self,
        method: HttpMethod,
        url: impl Into<String>,
        response: HttpResponse,
    ) {
        let mut inner = self
            .inner
            .lock()
            .expect("mock transport lock should not be poisoned");
        inner
            .routes
            .entry((method, url.into()))
            .or_default()
            .push_back(response);
    }

    /// All requests sent so far, in send order.
    #[must_use]
    pub fn requests(&self) -> Vec<HttpRequest> {
        let inner = self
            .inner
            .lock()
            .expect("mock transport lock should not be poisoned");
        inner.requests.clone()
    }

    /// Number of requests sent so far.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.inner
            .lock()
            .expect("mock transport lock should not be poisoned")
            .requests
            .len()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut inner = self
            .inner
            .lock()
            .expect("mock transport lock should not be poisoned");

        let key = (request.method, request.url.clone());
        inner.requests.push(request);

        match inner.routes.get_mut(&key).and_then(|q| q.pop_front()) {
            Some(resp) => Ok(resp),
            None => Err(HttpError::NoScriptedResponse {
                method: key.0.as_str().to_string(),
                url: key.1,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_get_is_case_insensitive_and_returns_first_match() {
        let headers: HttpHeaders = vec![
            ("Set-Cookie".to_string(), "a=1".to_string()),
            ("set-cookie".to_string(), "b=2".to_string()),
        ];
        assert_eq!(header_get(&headers, "set-cookie"), Some("a=1"));
        assert_eq!(header_get(&headers, "SET-COOKIE"), Some("a=1"));
        assert_eq!(header_get(&headers, "missing"), None);
    }

    #[test]
    fn post_json_sets_content_type() {
        let req = HttpRequest::post_json("https://grid.example/api", b"{}".to_vec());
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(header_get(&req.headers, "content-type"), Some("application/json"));
    }

    #[test]
    fn response_success_range() {
        assert!(HttpResponse::with_status(204).is_success());
        assert!(!HttpResponse::with_status(404).is_success());
        assert!(!HttpResponse::with_status(199).is_success());
    }

    #[tokio::test]
    async fn mock_transport_replays_responses_in_order_and_records_requests() {
        let transport = MockTransport::new();
        let url = "https://grid.example/internal/activities";

        transport.push_response(HttpMethod::Post, url, HttpResponse::with_status(429));
        transport.push_response(HttpMethod::Post, url, HttpResponse::with_status(200));

        let req = HttpRequest::post_json(url, b"{}".to_vec());
        let first = transport.send(req.clone()).await.expect("scripted");
        let second = transport.send(req.clone()).await.expect("scripted");
        assert_eq!(first.status, 429);
        assert_eq!(second.status, 200);
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn mock_transport_errors_when_nothing_is_scripted() {
        let transport = MockTransport::new();
        let err = transport
            .send(HttpRequest::get("https://grid.example/missing"))
            .await
            .expect_err("missing script should error");
        assert!(matches!(err, HttpError::NoScriptedResponse { .. }));
    }
}
