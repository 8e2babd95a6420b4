use std::collections::BTreeSet;
use std::time::{Duration, SystemTime};

use reqwest::{
    header::{HeaderMap, RETRY_AFTER},
    Method,
};

use crate::{transport::TransportError, BaselogError, Result};

/// Declarative retry rules shared by every request of a client.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Must be at least 1.
    pub max_attempts: u32,
    /// Seconds multiplied by `2^(attempt - 1)` to get the backoff delay.
    pub backoff_factor: f64,
    /// Ceiling for computed delays.
    pub max_backoff: Duration,
    /// Ceiling for a server-requested `Retry-After` delay.
    pub max_retry_after: Duration,
    pub retryable_status_codes: BTreeSet<u16>,
    /// Upper-case method names that are safe to repeat.
    pub retryable_methods: BTreeSet<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_factor: 1.0,
            max_backoff: Duration::from_secs(60),
            max_retry_after: Duration::from_secs(300),
            retryable_status_codes: [408, 429, 500, 502, 503, 504].into_iter().collect(),
            retryable_methods: ["POST", "PUT", "PATCH"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
        }
    }
}

impl RetryPolicy {
    /// A policy that performs exactly one attempt.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Sets the total number of attempts, the first one included.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the base delay in seconds; attempt `k` waits `factor * 2^(k - 1)`.
    pub fn with_backoff_factor(mut self, backoff_factor: f64) -> Self {
        self.backoff_factor = backoff_factor;
        self
    }

    /// Replaces the set of statuses that may be retried.
    pub fn with_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_status_codes = codes.into_iter().collect();
        self
    }

    /// Replaces the set of methods that are safe to repeat.
    pub fn with_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.retryable_methods = methods
            .into_iter()
            .map(|method| method.as_ref().trim().to_ascii_uppercase())
            .collect();
        self
    }

    /// Caps how long a server's `Retry-After` may postpone the next attempt.
    pub fn with_max_retry_after(mut self, max_retry_after: Duration) -> Self {
        self.max_retry_after = max_retry_after;
        self
    }

    /// Rejects zero attempts and negative or non-finite backoff factors.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(BaselogError::Configuration(
                "retry max_attempts must be at least 1".to_owned(),
            ));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 0.0 {
            return Err(BaselogError::Configuration(format!(
                "retry backoff_factor must be non-negative, got {}",
                self.backoff_factor
            )));
        }
        Ok(())
    }

    /// Returns true when `method` is listed, ignoring ASCII case.
    pub fn allows_method(&self, method: &Method) -> bool {
        self.retryable_methods
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(method.as_str()))
    }

    /// Decides whether attempt number `attempt` (starting at 1) may be
    /// followed by another one.
    ///
    /// A transport error is judged by its own retryability; otherwise the
    /// response status must be listed. The method gate applies to both.
    pub fn should_retry(
        &self,
        attempt: u32,
        status: Option<u16>,
        error: Option<&TransportError>,
        method: &Method,
    ) -> bool {
        if attempt >= self.max_attempts || !self.allows_method(method) {
            return false;
        }
        match (error, status) {
            (Some(error), _) => error.is_retryable(),
            (None, Some(status)) => self.retryable_status_codes.contains(&status),
            (None, None) => false,
        }
    }

    /// Delay to wait after attempt number `attempt` failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(62) as i32;
        let secs = self.backoff_factor * 2f64.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Delay to wait before the next attempt: the server's `Retry-After`
    /// bounded by `max_retry_after`, or the computed backoff.
    pub fn next_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(requested) => requested.min(self.max_retry_after),
            None => self.delay_for(attempt),
        }
    }
}

/// Reads a `Retry-After` header given as delta-seconds or an HTTP-date.
pub(crate) fn parse_retry_after(headers: &HeaderMap, now: SystemTime) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?;
    let raw_value = value.to_str().ok()?.trim();
    if let Ok(seconds) = raw_value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date = httpdate::parse_http_date(raw_value).ok()?;
    Some(date.duration_since(now).unwrap_or(Duration::ZERO))
}
