//! Request metrics.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Counters for one client. Read through [`ResilientHttpClient::metrics`](crate::ResilientHttpClient::metrics),
/// which returns a copy.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestMetrics {
    /// Logical `get` calls, cache hits and validation failures included.
    pub total_requests: u64,
    pub successful_requests: u64,
    /// Logical calls that ended in an error.
    pub failed_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub rate_limited_requests: u64,
    /// Failed attempts inside a call that were followed by another attempt.
    pub retried_attempts: u64,
    pub total_response_time_ms: u64,
    pub errors_by_status_code: BTreeMap<u16, u64>,
    pub requests_by_endpoint: BTreeMap<String, u64>,
}

impl RequestMetrics {
    pub fn average_response_time_ms(&self) -> f64 {
        self.total_response_time_ms as f64 / self.total_requests.max(1) as f64
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.successful_requests as f64 / self.total_requests as f64
        }
    }
}

/// Mutation side of [`RequestMetrics`]; every update takes the lock once.
#[derive(Default)]
pub(crate) struct MetricsRecorder {
    inner: Mutex<RequestMetrics>,
}

impl MetricsRecorder {
    fn update(&self, f: impl FnOnce(&mut RequestMetrics)) {
        let mut m = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut m);
    }

    pub(crate) fn request(&self, endpoint: &str) {
        self.update(|m| {
            m.total_requests += 1;
            *m.requests_by_endpoint.entry(endpoint.to_string()).or_insert(0) += 1;
        });
    }

    /// A call refused before it reached the cache or the network.
    pub(crate) fn rejected(&self) {
        self.update(|m| {
            m.total_requests += 1;
            m.failed_requests += 1;
        });
    }

    pub(crate) fn cache_hit(&self) {
        self.update(|m| m.cache_hits += 1);
    }

    pub(crate) fn cache_miss(&self) {
        self.update(|m| m.cache_misses += 1);
    }

    pub(crate) fn rate_limited(&self) {
        self.update(|m| m.rate_limited_requests += 1);
    }

    pub(crate) fn retried(&self) {
        self.update(|m| m.retried_attempts += 1);
    }

    pub(crate) fn success(&self, elapsed: Duration) {
        self.update(|m| {
            m.successful_requests += 1;
            m.total_response_time_ms += elapsed.as_millis() as u64;
        });
    }

    /// A hit is neither a success nor a failure of the network path; only its time counts.
    pub(crate) fn served_from_cache(&self, elapsed: Duration) {
        self.update(|m| m.total_response_time_ms += elapsed.as_millis() as u64);
    }

    pub(crate) fn failure(&self, status: Option<u16>, elapsed: Duration) {
        self.update(|m| {
            m.failed_requests += 1;
            m.total_response_time_ms += elapsed.as_millis() as u64;
            if let Some(status) = status {
                *m.errors_by_status_code.entry(status).or_insert(0) += 1;
            }
        });
    }

    pub(crate) fn snapshot(&self) -> RequestMetrics {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn reset(&self) {
        self.update(|m| *m = RequestMetrics::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_uses_at_least_one_request() {
        let m = RequestMetrics::default();
        assert_eq!(m.average_response_time_ms(), 0.0);
    }

    #[test]
    fn test_recorder_counts() {
        let rec = MetricsRecorder::default();
        rec.request("/a");
        rec.request("/a");
        rec.request("/b");
        rec.success(Duration::from_millis(30));
        rec.failure(Some(404), Duration::from_millis(10));
        rec.failure(None, Duration::from_millis(20));
        rec.retried();

        let snap = rec.snapshot();
        assert_eq!(snap.total_requests, 3);
        assert_eq!(snap.successful_requests, 1);
        assert_eq!(snap.failed_requests, 2);
        assert_eq!(snap.retried_attempts, 1);
        assert_eq!(snap.requests_by_endpoint.get("/a"), Some(&2));
        assert_eq!(snap.errors_by_status_code.get(&404), Some(&1));
        assert_eq!(snap.total_response_time_ms, 60);
        assert_eq!(snap.average_response_time_ms(), 20.0);

        rec.reset();
        assert_eq!(rec.snapshot(), RequestMetrics::default());
    }
}
