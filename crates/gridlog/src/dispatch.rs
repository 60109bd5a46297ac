//! The rate-limited request dispatcher.
//!
//! Every request to the platform's internal activity endpoint goes through
//! one [`Dispatcher`] instance, so pacing and backoff are enforced on the
//! aggregate stream of requests rather than per caller:
//!
//! - a governor limiter spaces out request starts by a minimum interval,
//! - a semaphore caps how many requests are in flight at once,
//! - HTTP 429 responses are retried with capped exponential backoff, a
//!   bounded number of times.
//!
//! Every other status (2xx, 4xx, 5xx) passes through to the caller
//! untouched; the dispatcher interprets nothing but 429.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::{HttpRequest, HttpResponse, HttpTransport};

type PacingLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Called with `(attempt, delay)` before each backoff sleep.
pub type BackoffNotify = dyn Fn(u32, Duration) + Send + Sync;

/// Default aggregate request rate (requests per second).
pub const DEFAULT_REQUESTS_PER_SECOND: u32 = 4;

/// Default concurrency ceiling for in-flight requests.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 3;

/// Default initial backoff delay after a 429.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Default backoff cap.
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(60);

/// Default maximum number of 429 retries for one request.
pub const DEFAULT_MAX_RETRIES: usize = 5;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("http transport error: {0}")]
    Transport(String),

    /// Internal retry marker for a 429 response; callers only ever see it
    /// as [`DispatchError::RetriesExhausted`].
    #[error("throttled by the platform (HTTP 429)")]
    Throttled,

    #[error("throttled and retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Aggregate request starts per second (spacing = 1/rps).
    pub requests_per_second: u32,
    /// Concurrency ceiling; the platform tolerates 2-5.
    pub max_in_flight: usize,
    /// Initial 429 backoff delay (doubles per attempt).
    pub backoff_base: Duration,
    /// Backoff delay cap.
    pub backoff_cap: Duration,
    /// Maximum 429 retries before surfacing the failure.
    pub max_retries: usize,
    /// Whether to jitter backoff delays.
    pub jitter: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_cap: DEFAULT_BACKOFF_CAP,
            max_retries: DEFAULT_MAX_RETRIES,
            jitter: true,
        }
    }
}

impl DispatcherConfig {
    fn backoff(&self) -> ExponentialBuilder {
        let mut builder = ExponentialBuilder::default()
            .with_min_delay(self.backoff_base)
            .with_max_delay(self.backoff_cap)
            .with_max_times(self.max_retries);
        if self.jitter {
            builder = builder.with_jitter();
        }
        builder
    }
}

/// Paces and retries all traffic to the internal endpoint.
///
/// Clones share the limiter and the in-flight semaphore, so cloning is the
/// intended way to hand the dispatcher to concurrent workers while keeping
/// one aggregate rate policy.
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn HttpTransport>,
    pacer: Arc<PacingLimiter>,
    in_flight: Arc<Semaphore>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn HttpTransport>, config: DispatcherConfig) -> Self {
        let interval =
            Duration::from_secs_f64(1.0 / f64::from(config.requests_per_second.max(1)));
        let quota = Quota::with_period(interval)
            .unwrap_or_else(|| Quota::per_second(nonzero(1)))
            .allow_burst(nonzero(1));

        Self {
            transport,
            pacer: Arc::new(RateLimiter::direct(quota)),
            in_flight: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            config,
        }
    }

    /// Submit one request, honoring pacing, the concurrency ceiling, and
    /// 429 backoff. All other responses come back unmodified.
    pub async fn submit(&self, request: HttpRequest) -> Result<HttpResponse, DispatchError> {
        self.submit_with_notify(request, None).await
    }

    /// Like [`Dispatcher::submit`], additionally invoking `notify` before
    /// each backoff sleep so callers can report retry progress.
    pub async fn submit_with_notify(
        &self,
        request: HttpRequest,
        notify: Option<&BackoffNotify>,
    ) -> Result<HttpResponse, DispatchError> {
        let _permit = self
            .in_flight
            .acquire()
            .await
            .map_err(|_| DispatchError::Transport("dispatcher semaphore closed".to_string()))?;

        let attempts = AtomicU32::new(0);

        let send_once = || {
            attempts.fetch_add(1, Ordering::SeqCst);
            let request = request.clone();
            async move {
                // Pacing applies per request start, retries included.
                self.pacer.until_ready().await;
                let response = self
                    .transport
                    .send(request)
                    .await
                    .map_err(|e| DispatchError::Transport(e.to_string()))?;
                if response.status == 429 {
                    return Err(DispatchError::Throttled);
                }
                Ok(response)
            }
        };

        send_once
            .retry(self.config.backoff())
            .when(|e| matches!(e, DispatchError::Throttled))
            .notify(|_, delay| {
                let attempt = attempts.load(Ordering::SeqCst);
                tracing::debug!(attempt, ?delay, "throttled, backing off");
                if let Some(cb) = notify {
                    cb(attempt, delay);
                }
            })
            .await
            .map_err(|e| match e {
                DispatchError::Throttled => DispatchError::RetriesExhausted {
                    attempts: attempts.load(Ordering::SeqCst),
                },
                other => other,
            })
    }
}

fn nonzero(n: u32) -> NonZeroU32 {
    NonZeroU32::new(n.max(1)).unwrap_or(NonZeroU32::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HttpError, HttpMethod, MockTransport};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    const URL: &str = "https://grid.example/internal/activities";

    fn fast_config() -> DispatcherConfig {
        DispatcherConfig {
            requests_per_second: 1_000,
            max_in_flight: 3,
            backoff_base: Duration::from_millis(10),
            backoff_cap: Duration::from_millis(100),
            max_retries: 3,
            jitter: false,
        }
    }

    #[tokio::test]
    async fn passes_non_429_statuses_through_unmodified() {
        let transport = MockTransport::new();
        for status in [200u16, 401, 404, 500] {
            transport.push_response(HttpMethod::Get, URL, crate::HttpResponse::with_status(status));
        }

        let dispatcher = Dispatcher::new(Arc::new(transport), fast_config());
        for status in [200u16, 401, 404, 500] {
            let resp = dispatcher
                .submit(HttpRequest::get(URL))
                .await
                .expect("statuses pass through");
            assert_eq!(resp.status, status);
        }
    }

    #[tokio::test]
    async fn retries_429_until_success() {
        let transport = MockTransport::new();
        transport.push_response(HttpMethod::Get, URL, crate::HttpResponse::with_status(429));
        transport.push_response(HttpMethod::Get, URL, crate::HttpResponse::with_status(429));
        transport.push_response(HttpMethod::Get, URL, crate::HttpResponse::with_status(200));

        let dispatcher = Dispatcher::new(Arc::new(transport.clone()), fast_config());
        let resp = dispatcher
            .submit(HttpRequest::get(URL))
            .await
            .expect("eventual success");
        assert_eq!(resp.status, 200);
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test]
    async fn surfaces_exhausted_retries_with_attempt_count() {
        let transport = MockTransport::new();
        // max_retries = 3 means 4 attempts total.
        for _ in 0..4 {
            transport.push_response(HttpMethod::Get, URL, crate::HttpResponse::with_status(429));
        }

        let notified = Arc::new(AtomicUsize::new(0));
        let notified_capture = Arc::clone(&notified);
        let notify: Box<BackoffNotify> =
            Box::new(move |_, _| {
                notified_capture.fetch_add(1, Ordering::SeqCst);
            });

        let dispatcher = Dispatcher::new(Arc::new(transport.clone()), fast_config());
        let err = dispatcher
            .submit_with_notify(HttpRequest::get(URL), Some(notify.as_ref()))
            .await
            .expect_err("retries exhausted");
        assert!(matches!(
            err,
            DispatchError::RetriesExhausted { attempts: 4 }
        ));
        assert_eq!(transport.request_count(), 4);
        assert_eq!(notified.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn consecutive_requests_are_spaced_by_the_minimum_interval() {
        let transport = MockTransport::new();
        for _ in 0..3 {
            transport.push_response(HttpMethod::Get, URL, crate::HttpResponse::with_status(200));
        }

        let config = DispatcherConfig {
            requests_per_second: 20, // 50ms spacing
            ..fast_config()
        };
        let dispatcher = Dispatcher::new(Arc::new(transport), config);

        let started = Instant::now();
        for _ in 0..3 {
            dispatcher
                .submit(HttpRequest::get(URL))
                .await
                .expect("paced request");
        }
        // First request is immediate; the next two wait ~50ms each. Allow
        // generous scheduler slack below the theoretical 100ms.
        assert!(
            started.elapsed() >= Duration::from_millis(80),
            "requests were not paced: {:?}",
            started.elapsed()
        );
    }

    /// Transport that tracks how many sends overlap.
    struct GaugeTransport {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl crate::HttpTransport for GaugeTransport {
        async fn send(&self, _request: HttpRequest) -> Result<crate::HttpResponse, HttpError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(crate::HttpResponse::with_status(200))
        }
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_the_ceiling() {
        let transport = Arc::new(GaugeTransport {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let config = DispatcherConfig {
            max_in_flight: 2,
            ..fast_config()
        };
        let dispatcher = Dispatcher::new(Arc::clone(&transport) as Arc<dyn HttpTransport>, config);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let d = dispatcher.clone();
            handles.push(tokio::spawn(async move {
                d.submit(HttpRequest::get(URL)).await
            }));
        }
        for handle in handles {
            handle.await.expect("task").expect("request");
        }

        assert!(transport.peak.load(Ordering::SeqCst) <= 2);
    }
}
