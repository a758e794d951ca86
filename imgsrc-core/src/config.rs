//! Loader configuration.
//!
//! Defaults are compiled in; environment variables and JSON documents can
//! override them. Durations are written in humantime form (`16ms`, `30s`).

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Upper bound on cache entries before least-recently-used eviction kicks in.
pub const DEFAULT_MAX_CACHE_ENTRIES: usize = 256;

/// How often `get_size` re-checks a handle's natural dimensions.
pub const DEFAULT_SIZE_POLL_INTERVAL: Duration = Duration::from_millis(16);

/// Give up on `get_size` polling after the load finished but reported no
/// dimensions for this long.
pub const DEFAULT_SIZE_POLL_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-request network timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const ENV_MAX_CACHE_ENTRIES: &str = "IMGSRC_MAX_CACHE_ENTRIES";
const ENV_SIZE_POLL_INTERVAL: &str = "IMGSRC_SIZE_POLL_INTERVAL";
const ENV_SIZE_POLL_TIMEOUT: &str = "IMGSRC_SIZE_POLL_TIMEOUT";
const ENV_REQUEST_TIMEOUT: &str = "IMGSRC_REQUEST_TIMEOUT";
const ENV_BASE_URL: &str = "IMGSRC_BASE_URL";
const ENV_USER_AGENT: &str = "IMGSRC_USER_AGENT";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub max_cache_entries: usize,
    #[serde(with = "humantime_duration")]
    pub size_poll_interval: Duration,
    #[serde(with = "humantime_duration")]
    pub size_poll_timeout: Duration,
    #[serde(with = "humantime_duration")]
    pub request_timeout: Duration,
    /// Base for relative URIs such as `/assets/logo.png`.
    pub base_url: Option<Url>,
    pub user_agent: Option<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_cache_entries: DEFAULT_MAX_CACHE_ENTRIES,
            size_poll_interval: DEFAULT_SIZE_POLL_INTERVAL,
            size_poll_timeout: DEFAULT_SIZE_POLL_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            base_url: None,
            user_agent: None,
        }
    }
}

impl LoaderConfig {
    /// Defaults overridden by any `IMGSRC_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    pub fn from_json_str(document: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(document)?;
        config.validated()
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_MAX_CACHE_ENTRIES) {
            self.max_cache_entries = raw.trim().parse().map_err(
                |e: std::num::ParseIntError| ConfigError::InvalidValue {
                    key: ENV_MAX_CACHE_ENTRIES,
                    message: e.to_string(),
                },
            )?;
        }
        if let Some(raw) = lookup(ENV_SIZE_POLL_INTERVAL) {
            self.size_poll_interval =
                parse_duration(ENV_SIZE_POLL_INTERVAL, &raw)?;
        }
        if let Some(raw) = lookup(ENV_SIZE_POLL_TIMEOUT) {
            self.size_poll_timeout =
                parse_duration(ENV_SIZE_POLL_TIMEOUT, &raw)?;
        }
        if let Some(raw) = lookup(ENV_REQUEST_TIMEOUT) {
            self.request_timeout = parse_duration(ENV_REQUEST_TIMEOUT, &raw)?;
        }
        if let Some(raw) = lookup(ENV_BASE_URL) {
            let url = Url::parse(raw.trim()).map_err(|e| {
                ConfigError::InvalidValue {
                    key: ENV_BASE_URL,
                    message: e.to_string(),
                }
            })?;
            self.base_url = Some(url);
        }
        if let Some(raw) = lookup(ENV_USER_AGENT)
            && !raw.trim().is_empty()
        {
            self.user_agent = Some(raw.trim().to_string());
        }
        self.validated()
    }

    fn validated(self) -> Result<Self, ConfigError> {
        if self.size_poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "size_poll_interval",
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(self)
    }
}

fn parse_duration(key: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(raw.trim()).map_err(|e| {
        ConfigError::InvalidValue {
            key,
            message: e.to_string(),
        }
    })
}

mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use std::time::Duration;

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer
            .serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(D::Error::custom)
    }
}
