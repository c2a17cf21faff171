//! Configuration module
//!
//! Loads store configuration from environment variables, optionally
//! overlaid with the JSON object handed to `dbx_client_new`.

use std::env;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

/// Default lock acquisition timeout per attempt
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;

/// Store configuration
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    /// Bound on a single per-aggregate lock acquisition attempt
    pub lock_timeout: Duration,

    /// Extra acquisition attempts after the first one times out
    pub lock_retries: u32,

    /// Backoff step between attempts (multiplied by the attempt number)
    pub retry_backoff: Duration,

    /// Events fetched from storage per batch while listing or projecting
    pub list_batch_size: usize,

    /// Page size when a list request carries no limit
    pub default_page_size: usize,

    /// Upper bound on any requested page size
    pub max_page_size: usize,

    /// Tracing filter directive, e.g. `eventdbx_native=debug`
    pub log_filter: Option<String>,

    /// Emit logs as JSON lines
    pub log_json: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
            lock_retries: 3,
            retry_backoff: Duration::from_millis(50),
            list_batch_size: 256,
            default_page_size: 100,
            max_page_size: 1000,
            log_filter: None,
            log_json: false,
        }
    }
}

/// Overrides accepted in the client config JSON
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigInput {
    lock_timeout_ms: Option<u64>,
    lock_retries: Option<u32>,
    retry_backoff_ms: Option<u64>,
    list_batch_size: Option<usize>,
    default_page_size: Option<usize>,
    max_page_size: Option<usize>,
    log_filter: Option<String>,
    log_json: Option<bool>,
}

impl StoreConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let lock_timeout_ms: u64 = env_or(
            "EVENTDBX_LOCK_TIMEOUT_MS",
            defaults.lock_timeout.as_millis() as u64,
        )?;
        let lock_retries = env_or("EVENTDBX_LOCK_RETRIES", defaults.lock_retries)?;
        let retry_backoff_ms: u64 = env_or(
            "EVENTDBX_RETRY_BACKOFF_MS",
            defaults.retry_backoff.as_millis() as u64,
        )?;
        let list_batch_size = env_or("EVENTDBX_LIST_BATCH_SIZE", defaults.list_batch_size)?;
        let default_page_size = env_or("EVENTDBX_DEFAULT_PAGE_SIZE", defaults.default_page_size)?;
        let max_page_size = env_or("EVENTDBX_MAX_PAGE_SIZE", defaults.max_page_size)?;
        let log_filter = env::var("EVENTDBX_LOG").ok();

        let config = Self {
            lock_timeout: Duration::from_millis(lock_timeout_ms),
            lock_retries,
            retry_backoff: Duration::from_millis(retry_backoff_ms),
            list_batch_size,
            default_page_size,
            max_page_size,
            log_filter,
            log_json: defaults.log_json,
        };
        config.validate()?;
        Ok(config)
    }

    /// Overlay a JSON config object on top of the environment defaults.
    /// `Value::Null` means "no overrides".
    pub fn from_json(value: Value) -> Result<Self, ConfigError> {
        let base = Self::from_env()?;
        base.merge_json(value)
    }

    /// Overlay a JSON config object on this configuration
    pub fn merge_json(mut self, value: Value) -> Result<Self, ConfigError> {
        let input: ConfigInput = match value {
            Value::Null => ConfigInput::default(),
            Value::Object(_) => serde_json::from_value(value)
                .map_err(|e| ConfigError::InvalidJson(e.to_string()))?,
            _ => return Err(ConfigError::NotAnObject),
        };

        if let Some(ms) = input.lock_timeout_ms {
            self.lock_timeout = Duration::from_millis(ms);
        }
        if let Some(retries) = input.lock_retries {
            self.lock_retries = retries;
        }
        if let Some(ms) = input.retry_backoff_ms {
            self.retry_backoff = Duration::from_millis(ms);
        }
        if let Some(size) = input.list_batch_size {
            self.list_batch_size = size;
        }
        if let Some(size) = input.default_page_size {
            self.default_page_size = size;
        }
        if let Some(size) = input.max_page_size {
            self.max_page_size = size;
        }
        if input.log_filter.is_some() {
            self.log_filter = input.log_filter;
        }
        if let Some(json) = input.log_json {
            self.log_json = json;
        }

        self.validate()?;
        Ok(self)
    }

    /// Clamp a requested page size to the configured bounds
    pub fn page_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.lock_timeout.is_zero() {
            return Err(ConfigError::InvalidValue("lockTimeoutMs"));
        }
        if self.list_batch_size == 0 {
            return Err(ConfigError::InvalidValue("listBatchSize"));
        }
        if self.default_page_size == 0 {
            return Err(ConfigError::InvalidValue("defaultPageSize"));
        }
        if self.max_page_size < self.default_page_size {
            return Err(ConfigError::InvalidValue("maxPageSize"));
        }
        Ok(())
    }
}

fn env_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(&'static str),

    #[error("config must be a JSON object")]
    NotAnObject,

    #[error("invalid config: {0}")]
    InvalidJson(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_are_valid() {
        let config = StoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.lock_timeout, Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS));
        assert_eq!(config.lock_retries, 3);
    }

    #[test]
    fn test_merge_json_overrides_fields() {
        let config = StoreConfig::default()
            .merge_json(json!({
                "lockTimeoutMs": 25,
                "lockRetries": 1,
                "listBatchSize": 2,
                "logFilter": "eventdbx_native=trace"
            }))
            .unwrap();

        assert_eq!(config.lock_timeout, Duration::from_millis(25));
        assert_eq!(config.lock_retries, 1);
        assert_eq!(config.list_batch_size, 2);
        assert_eq!(config.log_filter.as_deref(), Some("eventdbx_native=trace"));
        assert_eq!(config.default_page_size, 100);
    }

    #[test]
    fn test_merge_json_null_keeps_defaults() {
        let config = StoreConfig::default().merge_json(Value::Null).unwrap();
        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn test_merge_json_rejects_non_object() {
        let err = StoreConfig::default().merge_json(json!([1, 2])).unwrap_err();
        assert!(matches!(err, ConfigError::NotAnObject));
    }

    #[test]
    fn test_merge_json_rejects_zero_batch() {
        let err = StoreConfig::default()
            .merge_json(json!({ "listBatchSize": 0 }))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue("listBatchSize")));
    }

    #[test]
    fn test_page_size_is_clamped() {
        let config = StoreConfig::default();
        assert_eq!(config.page_size(None), 100);
        assert_eq!(config.page_size(Some(0)), 1);
        assert_eq!(config.page_size(Some(50_000)), 1000);
    }
}
