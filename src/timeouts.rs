use std::time::Duration;

use crate::{BaselogError, Result};

/// Independent time ceilings for each phase of a request, in seconds.
///
/// The budgets are never summed. Zero means the phase is unbounded.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeoutBudget {
    /// Establishing a connection, TLS included.
    pub connect: f64,
    /// Receiving the response once headers have started arriving.
    pub read: f64,
    /// Sending the request until response headers arrive, which includes
    /// the server's processing time.
    pub write: f64,
    /// Waiting for a free slot in the connection pool.
    pub pool: f64,
}

impl Default for TimeoutBudget {
    fn default() -> Self {
        Self {
            connect: 10.0,
            read: 30.0,
            write: 30.0,
            pool: 60.0,
        }
    }
}

impl TimeoutBudget {
    /// Budget with an explicit ceiling per phase.
    pub fn from_secs(connect: f64, read: f64, write: f64, pool: f64) -> Self {
        Self {
            connect,
            read,
            write,
            pool,
        }
    }

    /// Uses the same ceiling for every phase.
    pub fn uniform(secs: f64) -> Self {
        Self::from_secs(secs, secs, secs, secs)
    }

    /// Rejects negative and non-finite values.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("connect", self.connect),
            ("read", self.read),
            ("write", self.write),
            ("pool", self.pool),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(BaselogError::Configuration(format!(
                    "{name} timeout must be a non-negative number of seconds, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Connect ceiling, `None` when unbounded.
    pub fn connect_limit(&self) -> Option<Duration> {
        limit(self.connect)
    }

    /// Read ceiling, `None` when unbounded.
    pub fn read_limit(&self) -> Option<Duration> {
        limit(self.read)
    }

    /// Write ceiling, `None` when unbounded.
    pub fn write_limit(&self) -> Option<Duration> {
        limit(self.write)
    }

    /// Pool acquisition ceiling, `None` when unbounded.
    pub fn pool_limit(&self) -> Option<Duration> {
        limit(self.pool)
    }
}

fn limit(secs: f64) -> Option<Duration> {
    if secs > 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}
