use bytes::Bytes;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Method,
};
use serde::Serialize;

use crate::{BaselogError, Result};

/// A request as handed to the pipeline.
///
/// The value is immutable once submitted; every attempt sends a fresh
/// clone, and cloning the body only bumps a reference count.
#[derive(Clone, Debug)]
pub struct OutboundRequest {
    pub method: Method,
    /// Path relative to the client's base URL, e.g. `/projects/logs`.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl OutboundRequest {
    /// Request without headers or body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Builds a bodyless `GET`.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Builds a `POST` whose body is `payload` serialized as JSON.
    pub fn post_json<T: Serialize + ?Sized>(path: impl Into<String>, payload: &T) -> Result<Self> {
        Self::new(Method::POST, path).with_json(payload)
    }

    /// Sets the body to `payload` serialized as JSON.
    pub fn with_json<T: Serialize + ?Sized>(mut self, payload: &T) -> Result<Self> {
        let body = serde_json::to_vec(payload).map_err(|err| {
            BaselogError::Validation(format!("request payload is not serializable: {err}"))
        })?;
        self.body = Some(Bytes::from(body));
        Ok(self)
    }

    /// Sets a raw body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Adds a header. The API key header is always overridden by the client.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}
