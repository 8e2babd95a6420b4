use crate::Failure;

/// Error type returned by this crate.
///
/// Request execution itself reports through [`crate::Outcome`]; this enum
/// covers construction, input validation, and [`crate::Outcome::into_result`].
#[derive(Debug, thiserror::Error)]
pub enum BaselogError {
    /// Missing or invalid client configuration. Raised before any I/O.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A model or request failed local validation.
    #[error("invalid input: {0}")]
    Validation(String),
    /// A request reached a terminal failure.
    #[error(transparent)]
    Failed(#[from] Failure),
    /// The operation is deliberately not implemented by the backend client.
    #[error("{0} is not supported")]
    NotSupported(&'static str),
}
