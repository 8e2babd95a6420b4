use std::time::Duration;

use crate::{PoolLimits, Result, RetryPolicy, TimeoutBudget};

/// Configures timeouts, retries, pooling and probe caching.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientOptions {
    pub timeouts: TimeoutBudget,
    pub retry: RetryPolicy,
    pub pool: PoolLimits,
    /// How long a health probe result may be reused. Zero disables caching.
    pub probe_cache_ttl: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeouts: TimeoutBudget::default(),
            retry: RetryPolicy::default(),
            pool: PoolLimits::default(),
            probe_cache_ttl: Duration::from_secs(5),
        }
    }
}

impl ClientOptions {
    /// Replaces the per-phase timeout budget.
    pub fn with_timeouts(mut self, timeouts: TimeoutBudget) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Replaces the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replaces the connection pool bounds.
    pub fn with_pool(mut self, pool: PoolLimits) -> Self {
        self.pool = pool;
        self
    }

    /// Sets how long a health check result is reused. Zero disables caching.
    pub fn with_probe_cache_ttl(mut self, ttl: Duration) -> Self {
        self.probe_cache_ttl = ttl;
        self
    }

    /// Checks the timeout budget and retry policy.
    pub fn validate(&self) -> Result<()> {
        self.timeouts.validate()?;
        self.retry.validate()
    }
}
