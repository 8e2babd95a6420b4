//! `baselog-http` is a resilient HTTP client for the Baselog logging backend.
//!
//! Every request goes through one [`Pipeline`]: authentication headers,
//! phase timeouts, a bounded connection pool and method-aware retries with
//! exponential backoff. The outcome is always an [`Outcome`] value, never a
//! panic or an error for transport problems.
//!
//! - [`BaselogClient::send_log`]
//! - [`BaselogClient::health_check`]
//! - [`BaselogClient::execute`]
//!
//! With the `blocking` feature (on by default) [`blocking::BaselogClient`]
//! offers the same operations to synchronous callers.

mod auth;
mod client;
mod config;
mod error;
mod logger;
mod models;
mod options;
mod outcome;
mod pipeline;
mod request;
mod retry;
mod timeouts;
mod transport;

#[cfg(feature = "blocking")]
pub mod blocking;

pub use auth::{AuthProvider, API_KEY_HEADER};
pub use client::{BaselogClient, HEALTH_PATH, LOGS_PATH};
pub use config::{ApiConfig, Environment, DEFAULT_BASE_URL};
pub use error::BaselogError;
pub use logger::{Logger, LoggerMode};
pub use models::{EventModel, LogLevel, LogModel};
pub use options::ClientOptions;
pub use outcome::{ApiResponse, Failure, FailureKind, Outcome};
pub use pipeline::Pipeline;
pub use request::OutboundRequest;
pub use retry::RetryPolicy;
pub use timeouts::TimeoutBudget;
pub use transport::{
    PoolLimits, RawResponse, ReqwestTransport, TimeoutPhase, Transport, TransportError,
};

pub type Result<T> = std::result::Result<T, BaselogError>;
