use std::fmt;

use crate::{ApiConfig, BaselogClient, LogLevel, LogModel, Outcome};

/// Where a [`Logger`] sends its records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoggerMode {
    /// Records are emitted through `tracing` only.
    Local,
    /// Records are submitted to the backend.
    Api,
}

impl fmt::Display for LoggerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::Api => "api",
        })
    }
}

/// Level-named convenience wrapper around [`BaselogClient::send_log`].
///
/// A logger that cannot build its client falls back to local mode instead
/// of failing.
#[derive(Clone, Debug)]
pub struct Logger {
    client: Option<BaselogClient>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::local()
    }
}

impl Logger {
    /// Logger that only emits through `tracing`.
    pub fn local() -> Self {
        Self { client: None }
    }

    /// API-mode logger against the default backend.
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self::with_config(ApiConfig::new(api_key))
    }

    /// API-mode logger, or a local one when the client cannot be built.
    pub fn with_config(config: ApiConfig) -> Self {
        match BaselogClient::from_config(config) {
            Ok(client) => Self::with_client(client),
            Err(err) => {
                tracing::warn!(error = %err, "baselog client unavailable, logging locally");
                Self::local()
            }
        }
    }

    /// API-mode logger sharing an existing client.
    pub fn with_client(client: BaselogClient) -> Self {
        Self {
            client: Some(client),
        }
    }

    /// Where records currently go.
    pub fn mode(&self) -> LoggerMode {
        if self.client.is_some() {
            LoggerMode::Api
        } else {
            LoggerMode::Local
        }
    }

    /// Returns true when records are submitted to the backend.
    pub fn is_api_mode(&self) -> bool {
        self.mode() == LoggerMode::Api
    }

    /// Returns true when records are only emitted locally.
    pub fn is_local_mode(&self) -> bool {
        self.mode() == LoggerMode::Local
    }

    /// Submits `record`, or emits it locally in local mode (returns `None`).
    ///
    /// A failed submission is also emitted locally so the record is not lost
    /// from the process output.
    pub async fn log(&self, record: LogModel) -> Option<Outcome> {
        let client = match &self.client {
            Some(client) => client,
            None => {
                emit_local(&record);
                return None;
            }
        };

        let outcome = client.send_log(&record).await;
        if let Outcome::Failure(failure) = &outcome {
            tracing::warn!(
                kind = %failure.kind,
                attempts = failure.attempts,
                "failed to deliver log record: {}",
                failure.message
            );
            emit_local(&record);
        }
        Some(outcome)
    }

    /// Logs `message` at [`LogLevel::Debug`].
    pub async fn debug(&self, message: impl Into<String>) -> Option<Outcome> {
        self.log_message(LogLevel::Debug, message).await
    }

    /// Logs `message` at [`LogLevel::Info`].
    pub async fn info(&self, message: impl Into<String>) -> Option<Outcome> {
        self.log_message(LogLevel::Info, message).await
    }

    /// Logs `message` at [`LogLevel::Warning`].
    pub async fn warning(&self, message: impl Into<String>) -> Option<Outcome> {
        self.log_message(LogLevel::Warning, message).await
    }

    /// Logs `message` at [`LogLevel::Error`].
    pub async fn error(&self, message: impl Into<String>) -> Option<Outcome> {
        self.log_message(LogLevel::Error, message).await
    }

    /// Logs `message` at [`LogLevel::Critical`].
    pub async fn critical(&self, message: impl Into<String>) -> Option<Outcome> {
        self.log_message(LogLevel::Critical, message).await
    }

    async fn log_message(&self, level: LogLevel, message: impl Into<String>) -> Option<Outcome> {
        match LogModel::new(level, message) {
            Ok(record) => self.log(record).await,
            Err(err) => {
                tracing::warn!(error = %err, "dropping invalid log record");
                None
            }
        }
    }
}

fn emit_local(record: &LogModel) {
    let category = record.category.as_deref().unwrap_or("");
    let tags = record.tags.join(",");
    match record.level {
        LogLevel::Debug => tracing::debug!(category, tags = %tags, "{}", record.message),
        LogLevel::Info => tracing::info!(category, tags = %tags, "{}", record.message),
        LogLevel::Warning => tracing::warn!(category, tags = %tags, "{}", record.message),
        LogLevel::Error | LogLevel::Critical => {
            tracing::error!(level = %record.level, category, tags = %tags, "{}", record.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_api_key_falls_back_to_local_mode() {
        let logger = Logger::with_api_key("");
        assert!(logger.is_local_mode());
        assert_eq!(logger.mode().to_string(), "local");
    }

    #[tokio::test]
    async fn valid_api_key_switches_to_api_mode() {
        let logger = Logger::with_api_key("key");
        assert!(logger.is_api_mode());
    }

    #[tokio::test]
    async fn local_mode_returns_no_outcome() {
        let logger = Logger::local();
        assert!(logger.info("hello").await.is_none());
        assert!(logger.critical("").await.is_none());
    }
}
