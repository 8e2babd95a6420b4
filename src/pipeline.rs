use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use reqwest::StatusCode;
use tokio::time::{sleep, Instant};

use crate::{
    retry::parse_retry_after, ApiResponse, AuthProvider, ClientOptions, Failure, FailureKind,
    Outcome, OutboundRequest, RawResponse, Result, RetryPolicy, TimeoutBudget, Transport,
};

/// Ceiling applied to every phase of a liveness probe.
const PROBE_TIMEOUT_SECS: f64 = 5.0;
/// Longest response body excerpt carried in a failure message.
const BODY_EXCERPT_CHARS: usize = 512;

struct ProbeEntry {
    path: String,
    checked_at: Instant,
    healthy: bool,
}

/// Turns requests into delivered responses under auth, timeout and retry
/// policy.
///
/// All request-time problems are reported as an [`Outcome`]; nothing here
/// returns a raw transport error to the caller.
pub struct Pipeline<T> {
    transport: T,
    auth: AuthProvider,
    timeouts: TimeoutBudget,
    retry: RetryPolicy,
    probe_cache_ttl: Duration,
    probe_cache: Mutex<Option<ProbeEntry>>,
}

impl<T> fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("auth", &self.auth)
            .field("timeouts", &self.timeouts)
            .field("retry", &self.retry)
            .field("probe_cache_ttl", &self.probe_cache_ttl)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Pipeline<T> {
    /// Validates the credential and options before anything is sent.
    pub fn new(transport: T, credential: &str, options: ClientOptions) -> Result<Self> {
        let auth = AuthProvider::new(credential)?;
        options.validate()?;
        Ok(Self {
            transport,
            auth,
            timeouts: options.timeouts,
            retry: options.retry,
            probe_cache_ttl: options.probe_cache_ttl,
            probe_cache: Mutex::new(None),
        })
    }

    /// The transport requests are sent through.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The retry policy applied by [`Pipeline::execute`].
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// The budget applied to every attempt of [`Pipeline::execute`].
    pub fn timeouts(&self) -> &TimeoutBudget {
        &self.timeouts
    }

    /// Sends `request`, retrying transient failures per the retry policy.
    ///
    /// Retry safety is judged on the method of the submitted request, once,
    /// since every attempt repeats that same method.
    pub async fn execute(&self, request: OutboundRequest) -> Outcome {
        let mut attempt: u32 = 1;
        loop {
            tracing::debug!(
                method = %request.method,
                path = %request.path,
                attempt,
                "sending request"
            );
            let observed = self
                .transport
                .send(self.prepare(&request), &self.timeouts)
                .await;

            let (mut failure, retry) = match observed {
                Ok(response) if response.status.is_success() => {
                    return decode_success(response, attempt);
                }
                Ok(response) => {
                    let status = response.status;
                    let retry = is_retry_eligible(status)
                        && self.retry.should_retry(
                            attempt,
                            Some(status.as_u16()),
                            None,
                            &request.method,
                        );
                    (failure_from_status(&response), retry)
                }
                Err(error) => {
                    let retry = self
                        .retry
                        .should_retry(attempt, None, Some(&error), &request.method);
                    (Failure::new(error.failure_kind(), error.to_string()), retry)
                }
            };
            failure.attempts = attempt;

            if !retry {
                if attempt > 1 {
                    tracing::debug!(
                        path = %request.path,
                        attempts = attempt,
                        kind = %failure.kind,
                        "giving up after retries"
                    );
                }
                return Outcome::Failure(failure);
            }

            let delay = self.retry.next_delay(attempt, failure.retry_after);
            tracing::warn!(
                path = %request.path,
                attempt,
                kind = %failure.kind,
                ?delay,
                "retrying request: {}",
                failure.message
            );
            tokio::select! {
                () = sleep(delay) => {}
                () = self.transport.closed() => {
                    tracing::debug!(path = %request.path, attempt, "closed during retry backoff");
                    let mut closed = Failure::new(
                        FailureKind::ConnectivityFailure,
                        format!("client closed while waiting to retry after: {}", failure.message),
                    );
                    closed.status = failure.status;
                    closed.attempts = attempt;
                    return Outcome::Failure(closed);
                }
            }
            attempt += 1;
        }
    }

    /// Single-attempt liveness check that collapses every problem to `false`.
    ///
    /// Results are reused for the configured cache window, never longer.
    pub async fn probe(&self, path: &str) -> bool {
        if let Some(healthy) = self.cached_probe(path) {
            tracing::debug!(path, healthy, "probe served from cache");
            return healthy;
        }

        let request = self.prepare(&OutboundRequest::get(path));
        let budget = TimeoutBudget::uniform(PROBE_TIMEOUT_SECS);
        let healthy = match self.transport.send(request, &budget).await {
            Ok(response) => response.status.is_success(),
            Err(err) => {
                tracing::debug!(path, error = %err, "probe failed");
                false
            }
        };

        self.store_probe(path, healthy);
        healthy
    }

    /// Closes the transport. Safe to call repeatedly and while requests are
    /// in flight; requests waiting to retry stop waiting and fail.
    pub async fn close(&self) {
        self.transport.close().await;
        *self.lock_probe_cache() = None;
    }

    fn prepare(&self, request: &OutboundRequest) -> OutboundRequest {
        let mut outbound = request.clone();
        outbound.headers = self
            .auth
            .apply(&request.headers, request.body.is_some());
        outbound
    }

    fn cached_probe(&self, path: &str) -> Option<bool> {
        if self.probe_cache_ttl.is_zero() {
            return None;
        }
        let cache = self.lock_probe_cache();
        cache
            .as_ref()
            .filter(|entry| entry.path == path && entry.checked_at.elapsed() < self.probe_cache_ttl)
            .map(|entry| entry.healthy)
    }

    fn store_probe(&self, path: &str, healthy: bool) {
        if self.probe_cache_ttl.is_zero() {
            return;
        }
        *self.lock_probe_cache() = Some(ProbeEntry {
            path: path.to_owned(),
            checked_at: Instant::now(),
            healthy,
        });
    }

    fn lock_probe_cache(&self) -> std::sync::MutexGuard<'_, Option<ProbeEntry>> {
        self.probe_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn decode_success(response: RawResponse, attempts: u32) -> Outcome {
    let decoded = if response.status == StatusCode::NO_CONTENT {
        Ok(serde_json::Value::Null)
    } else {
        serde_json::from_slice(&response.body)
    };

    match decoded {
        Ok(body) => Outcome::Success(ApiResponse {
            status: response.status,
            headers: response.headers,
            body,
            attempts,
        }),
        Err(err) => {
            let mut failure = Failure::new(
                FailureKind::InvalidResponse,
                format!(
                    "malformed response body: {err}; body: {}",
                    body_excerpt(&response.body)
                ),
            );
            failure.status = Some(response.status.as_u16());
            failure.attempts = attempts;
            Outcome::Failure(failure)
        }
    }
}

fn status_kind(status: StatusCode) -> FailureKind {
    match status.as_u16() {
        401 | 403 => FailureKind::Authentication,
        408 => FailureKind::Timeout,
        429 => FailureKind::RateLimited,
        400..=499 => FailureKind::ClientError,
        500..=599 => FailureKind::ServerError,
        _ => FailureKind::InvalidResponse,
    }
}

/// Statuses that may be retried at all; the retry policy still has to list
/// them. Other 4xx will not succeed by repeating.
fn is_retry_eligible(status: StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 429 | 500..=599)
}

fn failure_from_status(response: &RawResponse) -> Failure {
    let mut failure = Failure::new(
        status_kind(response.status),
        format!(
            "http error {}: {}",
            response.status.as_u16(),
            body_excerpt(&response.body)
        ),
    );
    failure.status = Some(response.status.as_u16());
    failure.retry_after = parse_retry_after(&response.headers, SystemTime::now());
    failure
}

fn body_excerpt(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    match text.char_indices().nth(BODY_EXCERPT_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.into_owned(),
    }
}
