//! Client configuration parsed from environment variables.
//!
//! Numeric settings fall back to their defaults when unset or unparsable.
//! The progress scale is the exception: a wrong scale silently skews every
//! percentage, so an unknown value is an error.

use std::path::PathBuf;
use std::time::Duration;

use events::ProgressScale;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_STOP_GRACE_MS: u64 = 5_000;
pub const DEFAULT_PERSIST_DEBOUNCE_MS: u64 = 250;
pub const DEFAULT_SNAPSHOT_PATH: &str = "agentdesk-snapshot.json";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Backend origin without a trailing slash.
    pub base_url: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// How long a stopped stream may keep running before it is forced into error.
    pub stop_grace: Duration,
    pub persist_debounce: Duration,
    pub snapshot_path: PathBuf,
    pub progress_scale: ProgressScale,
    pub poll_interval: Duration,
    /// `tracing_subscriber` filter directive.
    pub log_filter: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            stop_grace: Duration::from_millis(DEFAULT_STOP_GRACE_MS),
            persist_debounce: Duration::from_millis(DEFAULT_PERSIST_DEBOUNCE_MS),
            snapshot_path: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
            progress_scale: ProgressScale::default(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            log_filter: DEFAULT_LOG_FILTER.to_owned(),
        }
    }
}

impl ClientConfig {
    /// Build config from the process environment.
    ///
    /// - `AGENTDESK_BASE_URL`: default `http://localhost:8000`
    /// - `AGENTDESK_REQUEST_TIMEOUT_SECS`: default 120
    /// - `AGENTDESK_CONNECT_TIMEOUT_SECS`: default 10
    /// - `AGENTDESK_STOP_GRACE_MS`: default 5000
    /// - `AGENTDESK_PERSIST_DEBOUNCE_MS`: default 250
    /// - `AGENTDESK_SNAPSHOT_PATH`: default `agentdesk-snapshot.json`
    /// - `AGENTDESK_PROGRESS_SCALE`: `fraction` (default) or `percent`
    /// - `AGENTDESK_POLL_INTERVAL_MS`: default 2000
    /// - `AGENTDESK_LOG`: default `info`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for an unknown progress scale.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| match std::env::var(key) {
            Ok(value) => Some(value),
            Err(_) => None,
        })
    }

    /// Same as [`ClientConfig::from_env`] over an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for an unknown progress scale.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("AGENTDESK_BASE_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned())
            .trim()
            .trim_end_matches('/')
            .to_owned();

        let progress_scale = match lookup("AGENTDESK_PROGRESS_SCALE") {
            Some(raw) => raw
                .parse::<ProgressScale>()
                .map_err(|_| ConfigError::InvalidValue { key: "AGENTDESK_PROGRESS_SCALE", value: raw.clone() })?,
            None => ProgressScale::default(),
        };

        Ok(Self {
            base_url,
            request_timeout: Duration::from_secs(env_parse(
                lookup("AGENTDESK_REQUEST_TIMEOUT_SECS"),
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )),
            connect_timeout: Duration::from_secs(env_parse(
                lookup("AGENTDESK_CONNECT_TIMEOUT_SECS"),
                DEFAULT_CONNECT_TIMEOUT_SECS,
            )),
            stop_grace: Duration::from_millis(env_parse(lookup("AGENTDESK_STOP_GRACE_MS"), DEFAULT_STOP_GRACE_MS)),
            persist_debounce: Duration::from_millis(env_parse(
                lookup("AGENTDESK_PERSIST_DEBOUNCE_MS"),
                DEFAULT_PERSIST_DEBOUNCE_MS,
            )),
            snapshot_path: lookup("AGENTDESK_SNAPSHOT_PATH")
                .filter(|v| !v.trim().is_empty())
                .map_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_PATH), PathBuf::from),
            progress_scale,
            poll_interval: Duration::from_millis(env_parse(
                lookup("AGENTDESK_POLL_INTERVAL_MS"),
                DEFAULT_POLL_INTERVAL_MS,
            )),
            log_filter: lookup("AGENTDESK_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_owned()),
        })
    }
}

/// Parse a raw setting, falling back to `default` when absent or invalid.
pub(crate) fn env_parse<T>(raw: Option<String>, default: T) -> T
where
    T: std::str::FromStr,
{
    match raw.map(|v| v.trim().parse::<T>()) {
        Some(Ok(value)) => value,
        _ => default,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
