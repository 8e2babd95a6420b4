use std::fmt;

use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};

use crate::{BaselogError, Result};

/// Header carrying the project API key.
pub const API_KEY_HEADER: &str = "x-api-key";

const USER_AGENT: &str = concat!("baselog-http/", env!("CARGO_PKG_VERSION"));

/// Authentication headers derived once from a credential.
///
/// The value is owned by a single client, so clients built with different
/// keys never share state.
#[derive(Clone)]
pub struct AuthProvider {
    headers: HeaderMap,
}

impl fmt::Debug for AuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthProvider")
            .field("credential", &"<redacted>")
            .finish()
    }
}

impl AuthProvider {
    /// Builds the header set for `credential`.
    ///
    /// Fails with [`BaselogError::Configuration`] when the credential is
    /// empty or cannot be carried in an HTTP header.
    pub fn new(credential: &str) -> Result<Self> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(BaselogError::Configuration(
                "API key must not be empty".to_owned(),
            ));
        }

        let mut api_key = HeaderValue::from_str(credential).map_err(|_| {
            BaselogError::Configuration("API key contains invalid header characters".to_owned())
        })?;
        api_key.set_sensitive(true);

        let mut headers = HeaderMap::with_capacity(3);
        headers.insert(HeaderName::from_static(API_KEY_HEADER), api_key);
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));

        Ok(Self { headers })
    }

    /// The full header set, including `Content-Type`.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Merges the auth headers under `request_headers`.
    ///
    /// Caller headers win on conflict, except the API key which is always
    /// forced. `Content-Type` is only added when the request has a body.
    pub(crate) fn apply(&self, request_headers: &HeaderMap, has_body: bool) -> HeaderMap {
        let mut merged = self.headers.clone();
        if !has_body {
            merged.remove(header::CONTENT_TYPE);
        }
        merged.extend(request_headers.clone());

        let api_key = HeaderName::from_static(API_KEY_HEADER);
        if let Some(value) = self.headers.get(&api_key) {
            merged.insert(api_key, value.clone());
        }
        merged
    }
}
