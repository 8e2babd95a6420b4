use std::fmt;
use std::str::FromStr;

use crate::{BaselogError, ClientOptions, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.baselog.io";

/// Deployment environment the client reports from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    /// Lowercase name as sent to the backend.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = BaselogError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" => Ok(Self::Development),
            "staging" => Ok(Self::Staging),
            "production" => Ok(Self::Production),
            other => Err(BaselogError::Configuration(format!(
                "unknown environment '{other}', expected development, staging or production"
            ))),
        }
    }
}

/// Everything needed to construct a client.
#[derive(Clone, PartialEq)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: String,
    pub environment: Environment,
    pub options: ClientOptions,
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("environment", &self.environment)
            .field("options", &self.options)
            .finish()
    }
}

impl ApiConfig {
    /// Config for the default backend with default options.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            api_key: api_key.into(),
            environment: Environment::default(),
            options: ClientOptions::default(),
        }
    }

    /// Points the client at another backend.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the environment the client reports from.
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Replaces timeouts, retry, pool and probe cache settings.
    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Reads configuration from `BASELOG_*` environment variables.
    ///
    /// - `BASELOG_API_KEY` (required)
    /// - `BASELOG_BASE_URL`, `BASELOG_ENVIRONMENT`
    /// - `BASELOG_TIMEOUT_CONNECT`, `_READ`, `_WRITE`, `_POOL` in seconds
    /// - `BASELOG_RETRY_MAX_ATTEMPTS`, `BASELOG_RETRY_BACKOFF_FACTOR`
    /// - `BASELOG_RETRY_STATUS_CODES`, `BASELOG_RETRY_METHODS`, comma separated
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`ApiConfig::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let api_key = var("BASELOG_API_KEY").ok_or_else(|| {
            BaselogError::Configuration("missing BASELOG_API_KEY environment variable".to_owned())
        })?;
        let mut config = Self::new(api_key);

        if let Some(base_url) = var("BASELOG_BASE_URL") {
            config.base_url = base_url;
        }
        if let Some(environment) = var("BASELOG_ENVIRONMENT") {
            config.environment = environment.parse()?;
        }

        let timeouts = &mut config.options.timeouts;
        for (name, slot) in [
            ("BASELOG_TIMEOUT_CONNECT", &mut timeouts.connect),
            ("BASELOG_TIMEOUT_READ", &mut timeouts.read),
            ("BASELOG_TIMEOUT_WRITE", &mut timeouts.write),
            ("BASELOG_TIMEOUT_POOL", &mut timeouts.pool),
        ] {
            if let Some(value) = var(name) {
                *slot = parse_value(name, &value)?;
            }
        }

        let retry = &mut config.options.retry;
        if let Some(value) = var("BASELOG_RETRY_MAX_ATTEMPTS") {
            retry.max_attempts = parse_value("BASELOG_RETRY_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = var("BASELOG_RETRY_BACKOFF_FACTOR") {
            retry.backoff_factor = parse_value("BASELOG_RETRY_BACKOFF_FACTOR", &value)?;
        }
        if let Some(value) = var("BASELOG_RETRY_STATUS_CODES") {
            retry.retryable_status_codes = split_list(&value)
                .map(|code| parse_value::<u16>("BASELOG_RETRY_STATUS_CODES", code))
                .collect::<Result<_>>()?;
        }
        if let Some(value) = var("BASELOG_RETRY_METHODS") {
            retry.retryable_methods = split_list(&value)
                .map(str::to_ascii_uppercase)
                .collect();
        }

        config.options.validate()?;
        Ok(config)
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|item| !item.is_empty())
}

fn parse_value<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.parse().map_err(|err| {
        BaselogError::Configuration(format!("{name} has invalid value '{value}': {err}"))
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::{RetryPolicy, TimeoutBudget};

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn missing_or_blank_api_key_is_rejected() {
        assert!(matches!(
            ApiConfig::from_lookup(lookup(&[])),
            Err(BaselogError::Configuration(_))
        ));
        assert!(ApiConfig::from_lookup(lookup(&[("BASELOG_API_KEY", "  ")])).is_err());
    }

    #[test]
    fn defaults_apply_when_only_key_is_set() {
        let config = ApiConfig::from_lookup(lookup(&[("BASELOG_API_KEY", "key")])).unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.options.timeouts, TimeoutBudget::default());
        assert_eq!(config.options.retry, RetryPolicy::default());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = ApiConfig::from_lookup(lookup(&[
            ("BASELOG_API_KEY", "key"),
            ("BASELOG_BASE_URL", "https://logs.example.com"),
            ("BASELOG_ENVIRONMENT", "Production"),
            ("BASELOG_TIMEOUT_CONNECT", "0"),
            ("BASELOG_TIMEOUT_READ", "12.5"),
            ("BASELOG_RETRY_MAX_ATTEMPTS", "5"),
            ("BASELOG_RETRY_BACKOFF_FACTOR", "0.25"),
            ("BASELOG_RETRY_STATUS_CODES", "500, 503"),
            ("BASELOG_RETRY_METHODS", "get,post"),
        ]))
        .unwrap();

        assert_eq!(config.base_url, "https://logs.example.com");
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.options.timeouts.connect, 0.0);
        assert_eq!(config.options.timeouts.read, 12.5);
        assert_eq!(config.options.timeouts.pool, 60.0);
        assert_eq!(config.options.retry.max_attempts, 5);
        assert_eq!(config.options.retry.backoff_factor, 0.25);
        assert_eq!(
            config.options.retry.retryable_status_codes,
            [500, 503].into_iter().collect()
        );
        assert_eq!(
            config.options.retry.retryable_methods,
            ["GET".to_owned(), "POST".to_owned()].into_iter().collect()
        );
    }

    #[test]
    fn invalid_values_are_configuration_errors() {
        for (name, value) in [
            ("BASELOG_TIMEOUT_POOL", "soon"),
            ("BASELOG_TIMEOUT_READ", "-1"),
            ("BASELOG_RETRY_MAX_ATTEMPTS", "0"),
            ("BASELOG_RETRY_STATUS_CODES", "500,abc"),
            ("BASELOG_ENVIRONMENT", "qa"),
        ] {
            let result = ApiConfig::from_lookup(lookup(&[("BASELOG_API_KEY", "key"), (name, value)]));
            assert!(
                matches!(result, Err(BaselogError::Configuration(_))),
                "{name}={value} must be rejected"
            );
        }
    }

    #[test]
    fn debug_redacts_api_key() {
        let debug = format!("{:?}", ApiConfig::new("very-secret"));
        assert!(!debug.contains("very-secret"));
    }
}
