use super::rate_limit::RateLimitInfo;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// A completed call.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
    pub headers: BTreeMap<String, String>,
    pub status: u16,
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub from_cache: bool,
    pub rate_limit: Option<RateLimitInfo>,
}

impl<T> ApiResponse<T> {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResponse<U> {
        ApiResponse {
            data: f(self.data),
            headers: self.headers,
            status: self.status,
            url: self.url,
            timestamp: self.timestamp,
            from_cache: self.from_cache,
            rate_limit: self.rate_limit,
        }
    }
}

/// Per-call overrides. Unset fields fall back to the client configuration.
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    /// Query parameters; also part of the cache key.
    pub params: BTreeMap<String, Value>,
    /// Merged over the client's headers.
    pub headers: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
    pub retries: Option<u32>,
    pub retry_delay: Option<Duration>,
}

impl RequestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub response_time_ms: u64,
    /// 0 when no response was received.
    pub status: u16,
}
