//! Rate-limit header parsing.

use crate::transport::HttpResponse;
use serde::Serialize;
use std::time::Duration;

pub const DEFAULT_WINDOW_MS: u64 = 60_000;
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);
/// Below this many remaining requests a `rate_limit` event is emitted.
pub const LOW_REMAINING: u64 = 10;

/// Advisory budget reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitInfo {
    pub limit: u64,
    pub remaining: u64,
    pub reset: u64,
    pub window_ms: u64,
}

impl RateLimitInfo {
    /// Parsed from `X-RateLimit-*`; `None` unless `X-RateLimit-Remaining` was
    /// sent as a number. Missing or malformed companions default to 0
    /// (window: 60000).
    pub fn from_response(response: &HttpResponse) -> Option<Self> {
        let remaining = number(response, "x-ratelimit-remaining")?;
        Some(Self {
            limit: number(response, "x-ratelimit-limit").unwrap_or(0),
            remaining,
            reset: number(response, "x-ratelimit-reset").unwrap_or(0),
            window_ms: number(response, "x-ratelimit-window").unwrap_or(DEFAULT_WINDOW_MS),
        })
    }

    pub fn is_low(&self) -> bool {
        self.remaining < LOW_REMAINING
    }
}

fn number(response: &HttpResponse, name: &str) -> Option<u64> {
    response.header(name).and_then(|v| parse_number(name, v))
}

fn parse_number(name: &str, raw: &str) -> Option<u64> {
    match raw.trim().parse::<u64>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(header = name, value = raw, "malformed rate-limit header");
            None
        }
    }
}

/// `Retry-After` in whole seconds; absent or malformed means 60s.
pub fn retry_after(response: &HttpResponse) -> Duration {
    match response.header("retry-after") {
        None => DEFAULT_RETRY_AFTER,
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(secs) => Duration::from_secs(secs),
            Err(_) => {
                tracing::warn!(value = raw, "unsupported Retry-After value, using default");
                DEFAULT_RETRY_AFTER
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_without_remaining_header() {
        let resp = HttpResponse::new(200, "{}").with_header("X-RateLimit-Limit", "100");
        assert!(RateLimitInfo::from_response(&resp).is_none());
    }

    #[test]
    fn test_absent_when_remaining_is_not_a_number() {
        let resp = HttpResponse::new(200, "{}")
            .with_header("X-RateLimit-Remaining", "lots")
            .with_header("X-RateLimit-Limit", "100");
        assert!(RateLimitInfo::from_response(&resp).is_none());
    }

    #[test]
    fn test_parse_with_defaults() {
        let resp = HttpResponse::new(200, "{}")
            .with_header("X-RateLimit-Remaining", "3")
            .with_header("X-RateLimit-Limit", "100")
            .with_header("X-RateLimit-Reset", "bogus");
        let info = RateLimitInfo::from_response(&resp).unwrap();
        assert_eq!(
            info,
            RateLimitInfo {
                limit: 100,
                remaining: 3,
                reset: 0,
                window_ms: DEFAULT_WINDOW_MS,
            }
        );
        assert!(info.is_low());
    }

    #[test]
    fn test_retry_after() {
        let resp = HttpResponse::new(429, "").with_header("Retry-After", "2");
        assert_eq!(retry_after(&resp), Duration::from_secs(2));
        assert_eq!(retry_after(&HttpResponse::new(429, "")), Duration::from_secs(60));
        let date = HttpResponse::new(429, "").with_header("Retry-After", "Wed, 21 Oct 2015 07:28:00 GMT");
        assert_eq!(retry_after(&date), Duration::from_secs(60));
    }
}
