use std::fmt;
use std::time::Duration;

use reqwest::{header::HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

use crate::{BaselogError, Result};

/// Classified reason a request did not succeed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// 401 or 403. Never retried.
    Authentication,
    /// Any other 4xx, or a request that could not be built.
    ClientError,
    /// 429 after retries were exhausted or disallowed.
    RateLimited,
    /// 5xx after retries were exhausted or disallowed.
    ServerError,
    /// A timeout budget expired, or the server answered 408.
    Timeout,
    /// Connection refused, DNS failure, pool exhaustion, or a closed client.
    ConnectivityFailure,
    /// The response body did not match the expected shape.
    InvalidResponse,
    /// The blocking adapter could not run in the calling context.
    Runtime,
}

impl FailureKind {
    /// Human-readable name used in `Display`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::ClientError => "client error",
            Self::RateLimited => "rate limited",
            Self::ServerError => "server error",
            Self::Timeout => "timeout",
            Self::ConnectivityFailure => "connectivity failure",
            Self::InvalidResponse => "invalid response",
            Self::Runtime => "runtime",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure of a pipeline execution.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("{kind} after {attempts} attempt(s): {message}")]
pub struct Failure {
    pub kind: FailureKind,
    /// HTTP status of the last response, if one was received.
    pub status: Option<u16>,
    /// Number of transport attempts made. Zero when nothing was sent.
    pub attempts: u32,
    /// Server-requested delay from the last response, if any.
    pub retry_after: Option<Duration>,
    pub message: String,
}

impl Failure {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            attempts: 0,
            retry_after: None,
            message: message.into(),
        }
    }

    /// Returns true when more than one attempt was made before giving up.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }
}

/// Successful 2xx response with its JSON body decoded.
#[derive(Clone, Debug)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: serde_json::Value,
    /// Number of transport attempts it took.
    pub attempts: u32,
}

impl ApiResponse {
    /// Deserializes the body into a typed value.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(&self.body).map_err(|err| {
            BaselogError::Validation(format!("response body does not match expected shape: {err}"))
        })
    }
}

/// The single result shape of every pipeline call.
#[derive(Clone, Debug)]
pub enum Outcome {
    Success(ApiResponse),
    Failure(Failure),
    /// The operation is a deliberate no-op; nothing was sent.
    NotSupported { operation: &'static str },
}

impl Outcome {
    /// Returns true for [`Outcome::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The failure, if this outcome is one.
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Failure(failure) => Some(failure),
            _ => None,
        }
    }

    /// Converts into a `Result`, mapping failures to [`BaselogError::Failed`].
    pub fn into_result(self) -> Result<ApiResponse> {
        match self {
            Self::Success(response) => Ok(response),
            Self::Failure(failure) => Err(BaselogError::Failed(failure)),
            Self::NotSupported { operation } => Err(BaselogError::NotSupported(operation)),
        }
    }
}
