use std::fmt;
use std::sync::Arc;

use crate::{
    ApiConfig, ClientOptions, EventModel, Failure, FailureKind, LogModel, OutboundRequest,
    Outcome, Pipeline, ReqwestTransport, Result, Transport,
};

/// Path that receives log records.
pub const LOGS_PATH: &str = "/projects/logs";
/// Path polled by [`BaselogClient::health_check`].
pub const HEALTH_PATH: &str = "/health";

/// Async client for the Baselog ingestion API.
///
/// Cloning is cheap; clones share one connection pool.
pub struct BaselogClient<T = ReqwestTransport> {
    pipeline: Arc<Pipeline<T>>,
}

impl<T> Clone for BaselogClient<T> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
        }
    }
}

impl<T> fmt::Debug for BaselogClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaselogClient")
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

impl BaselogClient<ReqwestTransport> {
    /// Creates a client with default options.
    ///
    /// Fails with [`crate::BaselogError::Configuration`] when `api_key` is
    /// empty or `base_url` is not an http(s) URL. Nothing is sent.
    pub fn new(base_url: impl AsRef<str>, api_key: impl AsRef<str>) -> Result<Self> {
        Self::from_config(ApiConfig::new(api_key.as_ref()).with_base_url(base_url.as_ref()))
    }

    /// Creates a client from a full [`ApiConfig`].
    pub fn from_config(config: ApiConfig) -> Result<Self> {
        let transport =
            ReqwestTransport::new(&config.base_url, &config.options.timeouts, &config.options.pool)?;
        let client = Self::with_transport(transport, &config.api_key, config.options)?;
        tracing::debug!(
            base_url = %config.base_url,
            environment = %config.environment,
            "baselog client ready"
        );
        Ok(client)
    }

    /// Creates a client from `BASELOG_*` environment variables.
    ///
    /// See [`ApiConfig::from_env`] for the variables read.
    pub fn from_env() -> Result<Self> {
        Self::from_config(ApiConfig::from_env()?)
    }
}

impl<T: Transport> BaselogClient<T> {
    /// Creates a client over a custom transport.
    pub fn with_transport(transport: T, api_key: &str, options: ClientOptions) -> Result<Self> {
        Ok(Self {
            pipeline: Arc::new(Pipeline::new(transport, api_key, options)?),
        })
    }

    /// The shared request pipeline behind this client.
    pub fn pipeline(&self) -> &Pipeline<T> {
        &self.pipeline
    }

    /// Submits one log record.
    pub async fn send_log(&self, log: &LogModel) -> Outcome {
        match OutboundRequest::post_json(LOGS_PATH, log) {
            Ok(request) => self.pipeline.execute(request).await,
            Err(err) => Outcome::Failure(Failure::new(FailureKind::ClientError, err.to_string())),
        }
    }

    /// Event submission is not offered by the backend. Returns
    /// [`Outcome::NotSupported`] without any network I/O.
    pub async fn send_event(&self, event: &EventModel) -> Outcome {
        tracing::debug!(event_type = %event.event_type, "event submission is not supported");
        Outcome::NotSupported {
            operation: "event submission",
        }
    }

    /// Sends an arbitrary request through the pipeline.
    pub async fn execute(&self, request: OutboundRequest) -> Outcome {
        self.pipeline.execute(request).await
    }

    /// Single-attempt liveness check. Never fails; returns `false` on any
    /// problem.
    pub async fn health_check(&self) -> bool {
        self.pipeline.probe(HEALTH_PATH).await
    }

    /// Same as [`BaselogClient::health_check`] for an arbitrary path.
    pub async fn probe(&self, path: &str) -> bool {
        self.pipeline.probe(path).await
    }

    /// Closes the connection pool for this client and all its clones.
    /// Idempotent.
    pub async fn close(&self) {
        self.pipeline.close().await;
    }
}
