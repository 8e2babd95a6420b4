use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::{BaselogError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// Lowercase wire name of the level.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = BaselogError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "critical" => Ok(Self::Critical),
            other => Err(BaselogError::Validation(format!(
                "invalid log level '{other}', expected one of debug, info, warning, error, critical"
            ))),
        }
    }
}

/// A structured log record as submitted to `/projects/logs`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LogModel {
    pub level: LogLevel,
    pub message: String,
    pub category: Option<String>,
    pub tags: Vec<String>,
}

impl LogModel {
    /// Fails with [`BaselogError::Validation`] on an empty message.
    pub fn new(level: LogLevel, message: impl Into<String>) -> Result<Self> {
        let message = message.into();
        if message.is_empty() {
            return Err(BaselogError::Validation(
                "log message is required".to_owned(),
            ));
        }
        Ok(Self {
            level,
            message,
            category: None,
            tags: Vec::new(),
        })
    }

    /// Groups the record under `category`.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Replaces the record's tags.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// A business event. Submission is not supported by the backend yet.
#[derive(Clone, Debug, PartialEq)]
pub struct EventModel {
    pub event_type: String,
    pub payload: serde_json::Map<String, serde_json::Value>,
    pub timestamp: SystemTime,
    pub source_service: String,
    pub user_id: Option<String>,
    pub correlation_id: Option<String>,
}

impl EventModel {
    /// Stamps the event with the current time.
    ///
    /// Fails with [`BaselogError::Validation`] on an empty type or payload.
    pub fn new(
        event_type: impl Into<String>,
        payload: serde_json::Map<String, serde_json::Value>,
        source_service: impl Into<String>,
    ) -> Result<Self> {
        let event_type = event_type.into();
        if event_type.is_empty() {
            return Err(BaselogError::Validation("event type is required".to_owned()));
        }
        if payload.is_empty() {
            return Err(BaselogError::Validation(
                "event payload is required".to_owned(),
            ));
        }
        Ok(Self {
            event_type,
            payload,
            timestamp: SystemTime::now(),
            source_service: source_service.into(),
            user_id: None,
            correlation_id: None,
        })
    }

    /// Attributes the event to a user.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Ties the event to a request or trace.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn log_level_parses_case_insensitively() {
        assert_eq!("INFO".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("Warning".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!("critical".parse::<LogLevel>().unwrap(), LogLevel::Critical);
        assert!(matches!(
            "invalid".parse::<LogLevel>(),
            Err(BaselogError::Validation(_))
        ));
    }

    #[test]
    fn log_model_requires_message() {
        let err = LogModel::new(LogLevel::Info, "").expect_err("empty message must fail");
        assert!(err.to_string().contains("message is required"));
    }

    #[test]
    fn log_model_serializes_with_null_category() {
        let log = LogModel::new(LogLevel::Info, "Test").unwrap();
        assert_eq!(
            serde_json::to_value(&log).unwrap(),
            json!({ "level": "info", "message": "Test", "category": null, "tags": [] })
        );

        let tagged = LogModel::new(LogLevel::Error, "Test error")
            .unwrap()
            .with_category("auth")
            .with_tags(["tag1", "tag2"]);
        assert_eq!(
            serde_json::to_value(&tagged).unwrap(),
            json!({
                "level": "error",
                "message": "Test error",
                "category": "auth",
                "tags": ["tag1", "tag2"]
            })
        );
    }

    #[test]
    fn event_model_requires_type_and_payload() {
        let payload = json!({ "order": 42 }).as_object().cloned().unwrap();
        assert!(EventModel::new("", payload.clone(), "shop").is_err());
        assert!(EventModel::new("order.created", serde_json::Map::new(), "shop").is_err());

        let event = EventModel::new("order.created", payload, "shop")
            .unwrap()
            .with_user_id("u-1")
            .with_correlation_id("c-1");
        assert_eq!(event.user_id.as_deref(), Some("u-1"));
        assert_eq!(event.correlation_id.as_deref(), Some("c-1"));
    }
}
