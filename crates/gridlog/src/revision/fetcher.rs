//! Fetches one record's raw activities through the dispatcher.

use std::sync::Arc;

use serde::Serialize;

use crate::dispatch::{BackoffNotify, DispatchError, Dispatcher};
use crate::session::{CredentialBlob, SessionStore};
use crate::HttpRequest;

use super::error::PlatformError;
use super::parser::DiffParser;
use super::types::{ActivityPage, ChangeEvent, RecordRef};

/// How many activity entries to request per record. The covered field kinds
/// change rarely enough that one page covers a record's useful history.
pub const ACTIVITY_PAGE_SIZE: u32 = 50;

/// The user agent the authenticated web session would present. The internal
/// endpoint rejects obviously non-browser clients.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ActivityQuery<'a> {
    base_id: &'a str,
    table_id: &'a str,
    record_id: &'a str,
    limit: u32,
    offset: Option<u32>,
}

/// Fetches and parses the revision feed for single records.
pub struct RevisionFetcher {
    dispatcher: Dispatcher,
    session: Arc<SessionStore>,
    parser: DiffParser,
    endpoint: String,
}

impl RevisionFetcher {
    pub fn new(
        dispatcher: Dispatcher,
        session: Arc<SessionStore>,
        parser: DiffParser,
        base_url: &str,
    ) -> Self {
        Self {
            dispatcher,
            session,
            parser,
            endpoint: format!(
                "{}/internal/readRecordActivities",
                base_url.trim_end_matches('/')
            ),
        }
    }

    /// Fetch the change events for one record.
    ///
    /// - 404 means the record simply has no history: `Ok(vec![])`.
    /// - 401/403 invalidates the session store and returns the fatal
    ///   [`PlatformError::CredentialsExpired`].
    /// - 429 is absorbed by the dispatcher; if its retries run out this is
    ///   an ordinary per-record [`PlatformError::RateLimited`].
    pub async fn fetch(
        &self,
        record: &RecordRef,
        credential: &CredentialBlob,
        notify: Option<&BackoffNotify>,
    ) -> Result<Vec<ChangeEvent>, PlatformError> {
        let query = ActivityQuery {
            base_id: &record.base_id,
            table_id: &record.table_id,
            record_id: &record.record_id,
            limit: ACTIVITY_PAGE_SIZE,
            offset: None,
        };
        let body =
            serde_json::to_vec(&query).map_err(|e| PlatformError::Internal(e.to_string()))?;

        let request = HttpRequest::post_json(&self.endpoint, body)
            .with_header("Cookie", credential.cookie_header())
            .with_header("Accept", "application/json")
            .with_header("User-Agent", BROWSER_USER_AGENT)
            .with_header("X-Requested-With", "XMLHttpRequest");

        let response = self
            .dispatcher
            .submit_with_notify(request, notify)
            .await
            .map_err(|e| match e {
                DispatchError::RetriesExhausted { attempts } => {
                    PlatformError::RateLimited { attempts }
                }
                other => PlatformError::Network(other.to_string()),
            })?;

        match response.status {
            404 => {
                tracing::debug!(record = %record, "record has no revision history");
                Ok(Vec::new())
            }
            401 | 403 => {
                self.session.invalidate().await;
                Err(PlatformError::CredentialsExpired)
            }
            status if !(200..300).contains(&status) => Err(PlatformError::Api {
                status,
                message: String::from_utf8_lossy(&response.body)
                    .chars()
                    .take(200)
                    .collect(),
            }),
            status => {
                let page: ActivityPage =
                    serde_json::from_slice(&response.body).map_err(|e| PlatformError::Api {
                        status,
                        message: format!("undecodable activity payload: {e}"),
                    })?;

                let mut events = Vec::new();
                for activity in &page.activities {
                    events.extend(self.parser.parse_activity(&record.record_id, activity));
                }
                Ok(events)
            }
        }
    }
}

#[cfg(all(test, feature = "migrate"))]
mod tests {
    use super::*;
    use crate::revision::PolarityRule;
    use crate::session::SessionCookie;
    use crate::{HttpMethod, HttpResponse, MockTransport};
    use crate::dispatch::DispatcherConfig;
    use std::time::Duration;

    const ENDPOINT: &str = "https://grid.example/internal/readRecordActivities";

    fn record() -> RecordRef {
        RecordRef::new("base1", "tbl1", "rec1")
    }

    fn credential() -> CredentialBlob {
        CredentialBlob::minted(
            vec![SessionCookie {
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

    fn fast_dispatcher(transport: &MockTransport) -> Dispatcher {
        Dispatcher::new(
            Arc::new(transport.clone()),
            DispatcherConfig {
                requests_per_second: 1_000,
                backoff_base: Duration::from_millis(5),
                backoff_cap: Duration::from_millis(20),
                max_retries: 2,
                jitter: false,
                ..DispatcherConfig::default()
            },
        )
    }

    async fn fetcher(transport: &MockTransport) -> (RevisionFetcher, Arc<SessionStore>) {
        let db = crate::connect_and_migrate("sqlite::memory:")
            .await
            .expect("in-memory db");
        let session = Arc::new(
            SessionStore::open(Arc::new(db)).await.expect("open store"),
        );
        session.save(credential()).await.expect("save blob");
        let fetcher = RevisionFetcher::new(
            fast_dispatcher(transport),
            Arc::clone(&session),
            DiffParser::new(PolarityRule::IconMarker),
            "https://grid.example",
        );
        (fetcher, session)
    }

    fn activity_body(diff_html: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "activities": [{
                "id": "act1",
                "createdAt": "2026-08-01T12:00:00Z",
                "actor": "ops@example.com",
                "diffHtml": diff_html,
            }]
        }))
        .expect("body")
    }

    #[tokio::test]
    async fn maps_activities_to_events() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Post,
            ENDPOINT,
            HttpResponse {
                status: 200,
                headers: Vec::new(),
                body: activity_body(
                    r#"<div class="historicalCellContainer" data-columntype="collaborator">
                         <div class="historicalCellLabel">Assignee</div>
                         <span class="historicalCellValue"><i class="historicalRemovedIcon"></i>Alice</span>
                         <span class="historicalCellValue"><i class="historicalAddedIcon"></i>Bob</span>
                       </div>"#,
                ),
            },
        );

        let (fetcher, _session) = fetcher(&transport).await;
        let events = fetcher
            .fetch(&record(), &credential(), None)
            .await
            .expect("fetch");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].old_value.as_deref(), Some("Alice"));
        assert_eq!(events[0].new_value.as_deref(), Some("Bob"));

        // The request carries the session cookie and the record payload.
        let sent = transport.requests();
        assert_eq!(crate::header_get(&sent[0].headers, "cookie"), Some("sid=abc"));
        let payload: serde_json::Value = serde_json::from_slice(&sent[0].body).expect("payload");
        assert_eq!(payload["recordId"], "rec1");
        assert_eq!(payload["limit"], 50);
    }

    #[tokio::test]
    async fn not_found_means_no_history() {
        let transport = MockTransport::new();
        transport.push_response(HttpMethod::Post, ENDPOINT, HttpResponse::with_status(404));

        let (fetcher, _session) = fetcher(&transport).await;
        let events = fetcher
            .fetch(&record(), &credential(), None)
            .await
            .expect("404 is not an error");
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn unauthorized_invalidates_session_and_is_fatal() {
        let transport = MockTransport::new();
        transport.push_response(HttpMethod::Post, ENDPOINT, HttpResponse::with_status(401));

        let (fetcher, session) = fetcher(&transport).await;
        let err = fetcher
            .fetch(&record(), &credential(), None)
            .await
            .expect_err("401 is fatal");
        assert!(matches!(err, PlatformError::CredentialsExpired));
        assert!(err.is_fatal());
        assert_eq!(
            session.state().await,
            crate::session::SessionState::Invalid
        );
    }

    #[tokio::test]
    async fn exhausted_throttling_is_a_per_record_failure() {
        let transport = MockTransport::new();
        for _ in 0..3 {
            transport.push_response(HttpMethod::Post, ENDPOINT, HttpResponse::with_status(429));
        }

        let (fetcher, _session) = fetcher(&transport).await;
        let err = fetcher
            .fetch(&record(), &credential(), None)
            .await
            .expect_err("retries exhausted");
        assert!(matches!(err, PlatformError::RateLimited { attempts: 3 }));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn other_statuses_surface_as_api_errors() {
        let transport = MockTransport::new();
        transport.push_response(HttpMethod::Post, ENDPOINT, HttpResponse::with_status(500));

        let (fetcher, _session) = fetcher(&transport).await;
        let err = fetcher
            .fetch(&record(), &credential(), None)
            .await
            .expect_err("500 surfaces");
        assert!(matches!(err, PlatformError::Api { status: 500, .. }));
    }

    #[tokio::test]
    async fn undecodable_body_is_an_api_error() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Post,
            ENDPOINT,
            HttpResponse {
                status: 200,
                headers: Vec::new(),
                body: b"<html>gateway error</html>".to_vec(),
            },
        );

        let (fetcher, _session) = fetcher(&transport).await;
        let err = fetcher
            .fetch(&record(), &credential(), None)
            .await
            .expect_err("bad body");
        assert!(matches!(err, PlatformError::Api { status: 200, .. }));
    }
}
