//! 请求执行逻辑：带超时、指数退避与 429 等待的重试循环。
//!
//! Fetch-with-retry.

use super::core::ResilientHttpClient;
use super::rate_limit::retry_after;
use crate::error_code::ErrorKind;
use crate::resilience::retry::capped_delay;
use crate::transport::{HttpMethod, HttpRequest, HttpResponse, TransportError};
use crate::ApiError;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;

/// Resolved knobs for one call.
#[derive(Debug, Clone)]
pub(crate) struct FetchPlan {
    pub(crate) attempts: u32,
    pub(crate) retry_delay: Duration,
    pub(crate) timeout: Duration,
    pub(crate) max_rate_limit_waits: u32,
    pub(crate) record_metrics: bool,
}

/// Delay before the zero-based attempt `attempt` (>= 1): `base * 2^(attempt - 1)`.
pub(crate) fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    capped_delay(base, Duration::MAX, attempt.saturating_sub(1))
}

impl ResilientHttpClient {
    /// Runs the request until it yields a response that should not be retried.
    ///
    /// A non-2xx response is returned as `Ok` so the caller can normalize it;
    /// only timeouts and transport failures surface as `Err`. `429` is waited
    /// out per `Retry-After` without consuming an attempt, up to
    /// `max_rate_limit_waits` times in a row.
    pub(crate) async fn fetch_with_retry(
        &self,
        method: HttpMethod,
        url: &str,
        headers: &BTreeMap<String, String>,
        plan: &FetchPlan,
    ) -> Result<HttpResponse, ApiError> {
        let attempts = plan.attempts.max(1);
        let mut attempt = 0u32;
        let mut rate_limit_waits = 0u32;
        let mut pending_backoff: Option<Duration> = None;

        loop {
            if let Some(delay) = pending_backoff.take() {
                self.logger.debug_with(
                    format!("Retrying {} in {}ms", url, delay.as_millis()),
                    json!({ "attempt": attempt + 1, "max_attempts": attempts }),
                );
                tokio::time::sleep(delay).await;
            }

            let request = HttpRequest {
                method,
                url: url.to_string(),
                headers: headers.clone(),
                timeout: plan.timeout,
            };
            let outcome = tokio::time::timeout(plan.timeout, self.transport.send(request)).await;

            let error = match outcome {
                Ok(Ok(response)) if response.status == 429 => {
                    if plan.record_metrics {
                        self.metrics.rate_limited();
                    }
                    if rate_limit_waits >= plan.max_rate_limit_waits {
                        self.logger.warn_with(
                            "Rate limit persisted, giving up",
                            json!({ "url": url, "waits": rate_limit_waits }),
                        );
                        return Ok(response);
                    }
                    rate_limit_waits += 1;
                    let wait = retry_after(&response);
                    self.logger.warn_with(
                        format!("Rate limited, waiting {}ms", wait.as_millis()),
                        json!({ "url": url, "retry_after_ms": wait.as_millis() as u64 }),
                    );
                    tokio::time::sleep(wait).await;
                    continue;
                }
                Ok(Ok(response)) => {
                    rate_limit_waits = 0;
                    let retryable = ErrorKind::status_retryable(response.status);
                    if response.is_success() || !retryable || attempt + 1 >= attempts {
                        return Ok(response);
                    }
                    ApiError::http_status(
                        response.status,
                        &response.status_text,
                        url,
                        &response.text(),
                    )
                }
                Ok(Err(TransportError::Timeout(_))) | Err(_) => {
                    ApiError::timeout(url, plan.timeout.as_millis() as u64)
                }
                Ok(Err(e)) => ApiError::new(ErrorKind::Transport, e.to_string(), url)
                    .with_details(json!({ "transport_error": e.to_string() })),
            };

            rate_limit_waits = 0;
            if attempt + 1 >= attempts {
                return Err(error);
            }
            if plan.record_metrics {
                self.metrics.retried();
            }
            attempt += 1;
            let delay = backoff_delay(plan.retry_delay, attempt);
            self.logger.warn_with(
                format!("Attempt {}/{} failed: {}", attempt, attempts, error.message),
                json!({ "url": url, "code": error.code, "status": error.status, "next_delay_ms": delay.as_millis() as u64 }),
            );
            pending_backoff = Some(delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_from_base() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_saturates() {
        let delay = backoff_delay(Duration::from_secs(1), 200);
        assert!(delay >= Duration::from_secs(1 << 31));
    }
}
