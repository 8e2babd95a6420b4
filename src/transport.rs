use std::error::Error as _;
use std::fmt;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use reqwest::{header::HeaderMap, StatusCode, Url};
use tokio::sync::{watch, Semaphore};

use crate::{BaselogError, FailureKind, OutboundRequest, Result, TimeoutBudget};

/// Which budget expired.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimeoutPhase {
    Connect,
    /// Sending the request until response headers arrive.
    ///
    /// This window includes the server's processing time, so a server that
    /// is slow to start answering expires this budget, not the read one.
    Write,
    /// Reading the response.
    Read,
}

impl fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connect => "connect",
            Self::Write => "write",
            Self::Read => "read",
        })
    }
}

/// Failure below the HTTP layer. Status codes are never errors here.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("{0} timeout elapsed")]
    Timeout(TimeoutPhase),
    #[error("no pooled connection became available within {0:?}")]
    PoolExhausted(Duration),
    #[error("client is closed")]
    Closed,
    #[error("i/o error: {0}")]
    Io(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// Returns true for failures that may succeed on another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connect(_) | Self::Timeout(_) | Self::PoolExhausted(_) | Self::Io(_)
        )
    }

    /// Maps the error onto the caller-facing classification.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Timeout(_) => FailureKind::Timeout,
            Self::Connect(_) | Self::PoolExhausted(_) | Self::Closed | Self::Io(_) => {
                FailureKind::ConnectivityFailure
            }
            Self::InvalidRequest(_) => FailureKind::ClientError,
        }
    }
}

/// Response exactly as received, body fully buffered.
#[derive(Clone, Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Connection pool bounds, fixed for a client's lifetime.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PoolLimits {
    /// Concurrent requests in flight.
    pub max_connections: usize,
    /// Idle keep-alive connections retained.
    pub max_keepalive: usize,
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self {
            max_connections: 100,
            max_keepalive: 20,
        }
    }
}

/// The I/O boundary of the pipeline.
///
/// Implementations perform a single attempt, never retry, and never
/// interpret status codes.
pub trait Transport: Send + Sync + 'static {
    /// Performs one attempt of `request` under `budget`.
    fn send(
        &self,
        request: OutboundRequest,
        budget: &TimeoutBudget,
    ) -> impl Future<Output = std::result::Result<RawResponse, TransportError>> + Send;

    /// Releases pooled connections. In-flight and later sends fail with
    /// [`TransportError::Closed`]. Must be idempotent.
    fn close(&self) -> impl Future<Output = ()> + Send;

    /// Resolves once [`Transport::close`] has been called, immediately if it
    /// already was.
    fn closed(&self) -> impl Future<Output = ()> + Send;
}

/// Pooled `reqwest` transport bound to one base URL.
pub struct ReqwestTransport {
    base_url: Url,
    http: Mutex<Option<reqwest::Client>>,
    permits: Semaphore,
    closed: watch::Sender<bool>,
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("base_url", &self.base_url.as_str())
            .field("available_permits", &self.permits.available_permits())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ReqwestTransport {
    /// Builds a pooled client for `base_url`.
    ///
    /// Fails with [`BaselogError::Configuration`] on a non-http(s) URL, a
    /// zero connection cap or an invalid timeout budget.
    pub fn new(base_url: &str, timeouts: &TimeoutBudget, pool: &PoolLimits) -> Result<Self> {
        let base_url = Url::parse(base_url.trim()).map_err(|err| {
            BaselogError::Configuration(format!("invalid base URL '{base_url}': {err}"))
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(BaselogError::Configuration(format!(
                "base URL must use http or https, got '{}'",
                base_url.scheme()
            )));
        }
        if pool.max_connections == 0 {
            return Err(BaselogError::Configuration(
                "max_connections must be at least 1".to_owned(),
            ));
        }
        timeouts.validate()?;

        let mut builder = reqwest::Client::builder().pool_max_idle_per_host(pool.max_keepalive);
        if let Some(limit) = timeouts.connect_limit() {
            builder = builder.connect_timeout(limit);
        }
        if let Some(limit) = timeouts.read_limit() {
            builder = builder.read_timeout(limit);
        }
        let http = builder.build().map_err(|err| {
            BaselogError::Configuration(format!("failed to build HTTP client: {err}"))
        })?;

        let (closed, _) = watch::channel(false);
        Ok(Self {
            base_url,
            http: Mutex::new(Some(http)),
            permits: Semaphore::new(pool.max_connections.min(Semaphore::MAX_PERMITS)),
            closed,
        })
    }

    /// URL every request path is joined onto.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns true once [`Transport::close`] has been called.
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Free connection slots right now.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn http(&self) -> std::result::Result<reqwest::Client, TransportError> {
        self.http
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(TransportError::Closed)
    }

    async fn dispatch(
        &self,
        request: OutboundRequest,
        budget: &TimeoutBudget,
    ) -> std::result::Result<RawResponse, TransportError> {
        let acquired = match budget.pool_limit() {
            Some(limit) => tokio::time::timeout(limit, self.permits.acquire())
                .await
                .map_err(|_| TransportError::PoolExhausted(limit))?,
            None => self.permits.acquire().await,
        };
        // Held until the body is read; dropping the future releases it.
        let _permit = acquired.map_err(|_| TransportError::Closed)?;

        let http = self.http()?;
        let mut builder = http
            .request(request.method, self.endpoint(&request.path))
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = with_limit(budget.write_limit(), TimeoutPhase::Write, builder.send())
            .await?
            .map_err(classify)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = with_limit(budget.read_limit(), TimeoutPhase::Read, response.bytes())
            .await?
            .map_err(classify)?;

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: OutboundRequest,
        budget: &TimeoutBudget,
    ) -> std::result::Result<RawResponse, TransportError> {
        let closed = self.closed.subscribe();
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        tokio::select! {
            result = self.dispatch(request, budget) => result,
            () = wait_closed(closed) => Err(TransportError::Closed),
        }
    }

    async fn close(&self) {
        if self.closed.send_replace(true) {
            return;
        }
        self.permits.close();
        let http = self
            .http
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(http);
        tracing::debug!(base_url = %self.base_url, "transport closed");
    }

    async fn closed(&self) {
        wait_closed(self.closed.subscribe()).await;
    }
}

async fn wait_closed(mut closed: watch::Receiver<bool>) {
    loop {
        let is_closed = *closed.borrow_and_update();
        if is_closed || closed.changed().await.is_err() {
            return;
        }
    }
}

async fn with_limit<F, T>(
    limit: Option<Duration>,
    phase: TimeoutPhase,
    future: F,
) -> std::result::Result<T, TransportError>
where
    F: Future<Output = T>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .map_err(|_| TransportError::Timeout(phase)),
        None => Ok(future.await),
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        let phase = if err.is_connect() {
            TimeoutPhase::Connect
        } else {
            TimeoutPhase::Read
        };
        return TransportError::Timeout(phase);
    }

    let message = error_chain(&err);
    if err.is_connect() {
        TransportError::Connect(message)
    } else if err.is_builder() {
        TransportError::InvalidRequest(message)
    } else {
        TransportError::Io(message)
    }
}

fn error_chain(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(base_url: &str) -> Result<ReqwestTransport> {
        ReqwestTransport::new(base_url, &TimeoutBudget::default(), &PoolLimits::default())
    }

    #[test]
    fn endpoint_joins_base_and_path() {
        let nested = transport("https://api.baselog.io/v1/").expect("valid url");
        assert_eq!(
            nested.endpoint("/projects/logs"),
            "https://api.baselog.io/v1/projects/logs"
        );
        let bare = transport("https://api.baselog.io").expect("valid url");
        assert_eq!(bare.endpoint("health"), "https://api.baselog.io/health");
    }

    #[test]
    fn invalid_base_url_is_a_configuration_error() {
        for url in ["not a url", "ftp://example.com"] {
            let err = transport(url).expect_err("url must be rejected");
            assert!(matches!(err, BaselogError::Configuration(_)));
        }
    }

    #[test]
    fn zero_connections_is_rejected() {
        let pool = PoolLimits {
            max_connections: 0,
            max_keepalive: 0,
        };
        let err = ReqwestTransport::new("http://localhost", &TimeoutBudget::default(), &pool)
            .expect_err("zero connections must be rejected");
        assert!(matches!(err, BaselogError::Configuration(_)));
    }

    #[test]
    fn retryability_by_error_kind() {
        assert!(TransportError::Connect("refused".to_owned()).is_retryable());
        assert!(TransportError::PoolExhausted(Duration::from_secs(1)).is_retryable());
        assert!(!TransportError::Closed.is_retryable());
        assert!(!TransportError::InvalidRequest("bad".to_owned()).is_retryable());
        assert_eq!(
            TransportError::Timeout(TimeoutPhase::Write).failure_kind(),
            FailureKind::Timeout
        );
        assert_eq!(
            TransportError::PoolExhausted(Duration::ZERO).failure_kind(),
            FailureKind::ConnectivityFailure
        );
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_for_headers_counts_against_write_budget() {
        let err = with_limit(
            Some(Duration::from_millis(50)),
            TimeoutPhase::Write,
            std::future::pending::<()>(),
        )
        .await
        .expect_err("pending send must time out");

        assert_eq!(err, TransportError::Timeout(TimeoutPhase::Write));
        assert_eq!(err.to_string(), "write timeout elapsed");
    }

    #[tokio::test]
    async fn close_is_idempotent_and_rejects_sends() {
        let closing = transport("http://127.0.0.1:9").expect("valid url");
        closing.close().await;
        closing.close().await;
        assert!(closing.is_closed());

        let err = closing
            .send(OutboundRequest::get("/health"), &TimeoutBudget::default())
            .await
            .expect_err("closed transport must fail");
        assert_eq!(err, TransportError::Closed);
    }

    #[tokio::test]
    async fn closed_resolves_only_after_close() {
        let closing = transport("http://127.0.0.1:9").expect("valid url");
        let pending = tokio::time::timeout(Duration::from_millis(20), closing.closed()).await;
        assert!(pending.is_err());

        closing.close().await;
        tokio::time::timeout(Duration::from_millis(20), closing.closed())
            .await
            .expect("closed must resolve after close");
    }
}
