//! Configuration management for the client.

use crate::error::{ConfigError, Result};
use crate::http::HttpTransport;
use std::env;
use std::time::Duration;
use tether_engine::retry::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY};
use tether_engine::{Cache, Client, Error as EngineError, RetryPolicy, Root};

/// Default API host.
pub const DEFAULT_HOST: &str = "http://localhost:3000";

/// Default transport timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the API
    pub host: String,
    /// Sent as the `api-token` header when set
    pub token: Option<String>,
    /// Whether the identity cache starts enabled
    pub store_enabled: bool,
    /// Per-request timeout
    pub timeout: Duration,
    /// Retry budget for [`ClientConfig::retry_policy`]
    pub max_retries: u32,
    /// Pause between delayed retries
    pub retry_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            token: None,
            store_enabled: false,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl ClientConfig {
    /// Load configuration from the environment, reading `.env` first.
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Load configuration through `lookup`; unset variables keep their defaults.
    pub fn from_vars(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> std::result::Result<Self, ConfigError> {
        let defaults = Self::default();

        let host = lookup("TETHER_HOST").unwrap_or(defaults.host);
        if host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }

        let token = lookup("TETHER_TOKEN").filter(|token| !token.is_empty());

        let store_enabled = match lookup("TETHER_STORE_ENABLED") {
            Some(value) => parse_bool("TETHER_STORE_ENABLED", &value)?,
            None => defaults.store_enabled,
        };

        let timeout = match lookup("TETHER_TIMEOUT_MS") {
            Some(value) => Duration::from_millis(parse_number("TETHER_TIMEOUT_MS", &value)?),
            None => defaults.timeout,
        };

        let max_retries = match lookup("TETHER_MAX_RETRIES") {
            Some(value) => parse_number("TETHER_MAX_RETRIES", &value)?,
            None => defaults.max_retries,
        };

        let retry_delay = match lookup("TETHER_RETRY_DELAY_MS") {
            Some(value) => Duration::from_millis(parse_number("TETHER_RETRY_DELAY_MS", &value)?),
            None => defaults.retry_delay,
        };

        Ok(Self {
            host,
            token,
            store_enabled,
            timeout,
            max_retries,
            retry_delay,
        })
    }

    /// Retry policy for transport failures and 5xx responses, with this
    /// configuration's budget and delay.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(is_transient)
            .with_max_retries(self.max_retries)
            .with_delay(self.retry_delay)
    }

    /// Build the transport, client and cache and hand back the root factory.
    pub fn connect(&self) -> Result<Root> {
        let transport = HttpTransport::new(&self.host, self.timeout)?;
        let mut client = Client::new(transport);
        if let Some(token) = &self.token {
            client = client.with_token(token.clone());
        }
        tracing::info!(host = %self.host, store_enabled = self.store_enabled, "client configured");
        Ok(Root::new(client, Cache::new(self.store_enabled)))
    }
}

fn is_transient(err: &EngineError) -> bool {
    match err {
        EngineError::Transport { .. } => true,
        other => other.status().is_some_and(|status| status >= 500),
    }
}

fn parse_number<T: std::str::FromStr>(
    var: &'static str,
    value: &str,
) -> std::result::Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        var,
        value: value.to_string(),
    })
}

fn parse_bool(var: &'static str, value: &str) -> std::result::Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            var,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = ClientConfig::from_vars(vars(&[])).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.host, "http://localhost:3000");
        assert!(!config.store_enabled);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_delay, Duration::from_millis(5));
    }

    #[test]
    fn reads_every_variable() {
        let config = ClientConfig::from_vars(vars(&[
            ("TETHER_HOST", "https://api.example.com"),
            ("TETHER_TOKEN", "secret"),
            ("TETHER_STORE_ENABLED", "true"),
            ("TETHER_TIMEOUT_MS", "1500"),
            ("TETHER_MAX_RETRIES", "2"),
            ("TETHER_RETRY_DELAY_MS", "50"),
        ]))
        .unwrap();

        assert_eq!(config.host, "https://api.example.com");
        assert_eq!(config.token.as_deref(), Some("secret"));
        assert!(config.store_enabled);
        assert_eq!(config.timeout, Duration::from_millis(1500));
        assert_eq!(config.retry_policy().max_retries(), 2);
        assert_eq!(config.retry_policy().delay(), Duration::from_millis(50));
    }

    #[test]
    fn rejects_bad_values() {
        let err = ClientConfig::from_vars(vars(&[("TETHER_TIMEOUT_MS", "soon")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidNumber {
                var: "TETHER_TIMEOUT_MS",
                value: "soon".into()
            }
        );

        let err = ClientConfig::from_vars(vars(&[("TETHER_STORE_ENABLED", "maybe")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBool { var: "TETHER_STORE_ENABLED", .. }));

        let err = ClientConfig::from_vars(vars(&[("TETHER_HOST", " ")])).unwrap_err();
        assert_eq!(err, ConfigError::EmptyHost);
    }

    #[test]
    fn empty_token_means_none() {
        let config = ClientConfig::from_vars(vars(&[("TETHER_TOKEN", "")])).unwrap();
        assert_eq!(config.token, None);
    }

    #[test]
    fn transient_errors() {
        assert!(is_transient(&EngineError::Transport {
            message: "reset".into(),
            request: None,
        }));
        assert!(!is_transient(&EngineError::MissingId));
    }
}
