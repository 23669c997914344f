//! 客户端配置：默认值、局部更新（ConfigPatch）与环境变量覆盖。
//!
//! Client configuration.
//!
//! All durations are carried in milliseconds so the struct serializes to the
//! same flat shape it is configured from.

use crate::cache::DEFAULT_KEY_PREFIX;
use crate::logging::Threshold;
use crate::resilience::RateLimiterConfig;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = concat!(
    "resilient-api-client/",
    env!("CARGO_PKG_VERSION"),
    " (Rust)"
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl_ms: u64,
    pub key_prefix: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_ms: 300_000,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

/// Advisory request budget; see [`RateLimiter`](crate::resilience::RateLimiter).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub max_requests: u32,
    pub per_milliseconds: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_requests: 10,
            per_milliseconds: 60_000,
        }
    }
}

impl From<&RateLimitSettings> for RateLimiterConfig {
    fn from(settings: &RateLimitSettings) -> Self {
        RateLimiterConfig::new(
            settings.max_requests,
            Duration::from_millis(settings.per_milliseconds),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerSettings {
    /// Level name; unknown names mean `info`.
    pub level: String,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggerSettings {
    pub fn threshold(&self) -> Threshold {
        Threshold::from(self.level.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSettings {
    pub enabled: bool,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub cache: CacheSettings,
    /// Attempts per call, first one included.
    pub retries: u32,
    pub retry_delay_ms: u64,
    /// Consecutive `429` waits before the `429` is returned as an error.
    pub max_rate_limit_waits: u32,
    pub rate_limit: RateLimitSettings,
    pub headers: BTreeMap<String, String>,
    pub logger: LoggerSettings,
    pub events: EventSettings,
    pub health_path: String,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_ms: 30_000,
            cache: CacheSettings::default(),
            retries: 3,
            retry_delay_ms: 1000,
            max_rate_limit_waits: 5,
            rate_limit: RateLimitSettings::default(),
            headers: BTreeMap::new(),
            logger: LoggerSettings::default(),
            events: EventSettings::default(),
            health_path: "/".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Defaults overridden by `API_CLIENT_*` environment variables.
    ///
    /// - `API_CLIENT_TIMEOUT_MS`
    /// - `API_CLIENT_RETRIES`
    /// - `API_CLIENT_RETRY_DELAY_MS`
    /// - `API_CLIENT_CACHE_TTL_MS`
    /// - `API_CLIENT_LOG_LEVEL`
    ///
    /// Unparseable values are ignored.
    pub fn from_env(base_url: impl Into<String>) -> Self {
        let mut cfg = Self::new(base_url);
        if let Some(v) = env_parse::<u64>("API_CLIENT_TIMEOUT_MS") {
            cfg.timeout_ms = v;
        }
        if let Some(v) = env_parse::<u32>("API_CLIENT_RETRIES") {
            cfg.retries = v;
        }
        if let Some(v) = env_parse::<u64>("API_CLIENT_RETRY_DELAY_MS") {
            cfg.retry_delay_ms = v;
        }
        if let Some(v) = env_parse::<u64>("API_CLIENT_CACHE_TTL_MS") {
            cfg.cache.ttl_ms = v;
        }
        if let Ok(level) = env::var("API_CLIENT_LOG_LEVEL") {
            cfg.logger.level = level;
        }
        cfg
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_cache(mut self, enabled: bool, ttl: Duration) -> Self {
        self.cache.enabled = enabled;
        self.cache.ttl_ms = ttl.as_millis() as u64;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.logger.level = level.into();
        self
    }

    pub fn with_events(mut self, enabled: bool) -> Self {
        self.events.enabled = enabled;
        self
    }

    pub fn with_health_path(mut self, path: impl Into<String>) -> Self {
        self.health_path = path.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Checks the fields the client cannot run without.
    pub fn validate(&self) -> Result<()> {
        let parsed = url::Url::parse(&self.base_url).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid base_url '{}': {}", self.base_url, e),
                ErrorContext::new()
                    .with_field_path("config.base_url")
                    .with_source("client_config"),
            )
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(Error::configuration_with_context(
                format!("base_url must use http or https, got '{}'", parsed.scheme()),
                ErrorContext::new()
                    .with_field_path("config.base_url")
                    .with_source("client_config"),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(Error::configuration_with_context(
                "timeout must be greater than zero",
                ErrorContext::new()
                    .with_field_path("config.timeout_ms")
                    .with_source("client_config"),
            ));
        }
        if !self.health_path.starts_with('/') {
            return Err(Error::configuration_with_context(
                "health_path must start with '/'",
                ErrorContext::new()
                    .with_field_path("config.health_path")
                    .with_details(self.health_path.clone())
                    .with_source("client_config"),
            ));
        }
        Ok(())
    }

    /// A copy of this configuration with `patch` applied on top.
    pub fn patched(&self, patch: &ConfigPatch) -> ClientConfig {
        let mut cfg = self.clone();
        if let Some(ref v) = patch.base_url {
            cfg.base_url = v.clone();
        }
        if let Some(v) = patch.timeout_ms {
            cfg.timeout_ms = v;
        }
        if let Some(v) = patch.retries {
            cfg.retries = v;
        }
        if let Some(v) = patch.retry_delay_ms {
            cfg.retry_delay_ms = v;
        }
        if let Some(v) = patch.max_rate_limit_waits {
            cfg.max_rate_limit_waits = v;
        }
        if let Some(v) = patch.cache_enabled {
            cfg.cache.enabled = v;
        }
        if let Some(v) = patch.cache_ttl_ms {
            cfg.cache.ttl_ms = v;
        }
        if let Some(ref v) = patch.rate_limit {
            cfg.rate_limit = v.clone();
        }
        if let Some(ref v) = patch.headers {
            cfg.headers = v.clone();
        }
        if let Some(ref v) = patch.log_level {
            cfg.logger.level = v.clone();
        }
        if let Some(v) = patch.events_enabled {
            cfg.events.enabled = v;
        }
        if let Some(ref v) = patch.health_path {
            cfg.health_path = v.clone();
        }
        cfg
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "ignoring unparseable environment override");
            None
        }
    }
}

/// Partial update for [`ResilientHttpClient::update_config`](crate::ResilientHttpClient::update_config).
/// `None` leaves a field as it is; `headers` replaces the whole map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigPatch {
    pub base_url: Option<String>,
    pub timeout_ms: Option<u64>,
    pub retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub max_rate_limit_waits: Option<u32>,
    pub cache_enabled: Option<bool>,
    pub cache_ttl_ms: Option<u64>,
    pub rate_limit: Option<RateLimitSettings>,
    pub headers: Option<BTreeMap<String, String>>,
    pub log_level: Option<String>,
    pub events_enabled: Option<bool>,
    pub health_path: Option<String>,
}

impl ConfigPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = Some(delay.as_millis() as u64);
        self
    }

    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = Some(enabled);
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl_ms = Some(ttl.as_millis() as u64);
        self
    }

    pub fn headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }

    pub fn events_enabled(mut self, enabled: bool) -> Self {
        self.events_enabled = Some(enabled);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogLevel;

    #[test]
    fn test_defaults() {
        let cfg = ClientConfig::new("https://api.test");
        assert_eq!(cfg.timeout(), Duration::from_secs(30));
        assert_eq!(cfg.retries, 3);
        assert_eq!(cfg.retry_delay(), Duration::from_secs(1));
        assert_eq!(cfg.cache.ttl(), Duration::from_secs(300));
        assert_eq!(cfg.cache.key_prefix, "api");
        assert_eq!(cfg.max_rate_limit_waits, 5);
        assert_eq!(cfg.rate_limit.max_requests, 10);
        assert_eq!(cfg.health_path, "/");
        assert!(cfg.events.enabled);
        assert!(cfg.user_agent.starts_with("resilient-api-client/"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_base_url() {
        assert!(ClientConfig::new("not a url").validate().is_err());
        let err = ClientConfig::new("ftp://files.test").validate().unwrap_err();
        assert!(err.to_string().contains("config.base_url"));
    }

    #[test]
    fn test_patch_only_touches_given_fields() {
        let cfg = ClientConfig::new("https://api.test").with_header("x-a", "1");
        let patched = cfg.patched(
            &ConfigPatch::new()
                .retries(5)
                .cache_ttl(Duration::from_secs(1))
                .log_level("debug"),
        );
        assert_eq!(patched.retries, 5);
        assert_eq!(patched.cache.ttl_ms, 1000);
        assert_eq!(patched.logger.threshold().0, LogLevel::Debug);
        assert_eq!(patched.timeout_ms, cfg.timeout_ms);
        assert_eq!(patched.headers.get("x-a").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_deserialize_partial_config() {
        let cfg: ClientConfig = serde_json::from_value(serde_json::json!({
            "base_url": "https://api.test",
            "retries": 2,
            "cache": { "ttl_ms": 1000 }
        }))
        .unwrap();
        assert_eq!(cfg.retries, 2);
        assert_eq!(cfg.cache.ttl_ms, 1000);
        assert!(cfg.cache.enabled);
        assert_eq!(cfg.timeout_ms, 30_000);
    }

    #[test]
    fn test_unknown_log_level_is_info() {
        let cfg = ClientConfig::new("https://api.test").with_log_level("loud");
        assert_eq!(cfg.logger.threshold().0, LogLevel::Info);
    }

    #[test]
    fn test_rate_limiter_config_from_settings() {
        let limiter: RateLimiterConfig = (&RateLimitSettings::default()).into();
        assert_eq!(limiter.max_requests, 10);
        assert_eq!(limiter.window, Duration::from_secs(60));
    }
}
