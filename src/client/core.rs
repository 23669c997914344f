use super::config::{ClientConfig, ConfigPatch};
use super::execution::FetchPlan;
use super::metrics::{MetricsRecorder, RequestMetrics};
use super::rate_limit::RateLimitInfo;
use super::types::{ApiResponse, HealthStatus, RequestConfig};
use super::validation::validate_endpoint;
use crate::cache::{CacheKey, ResponseCache};
use crate::events::{ApiEvent, ApiEventKind, EventBus, ListenerId};
use crate::logging::StructuredLogger;
use crate::resilience::RateLimiter;
use crate::transport::{HttpMethod, HttpResponse, HttpTransport};
use crate::ApiError;
use arc_swap::ArcSwap;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::Instant;

pub(crate) const EVENT_SOURCE: &str = "ResilientHttpClient";

/// HTTP client for one REST service: cache lookup, fetch with retry,
/// rate-limit waits, metrics and events around every GET.
///
/// Methods take `&self`; share the client across tasks with an `Arc`.
pub struct ResilientHttpClient {
    pub(crate) config: ArcSwap<ClientConfig>,
    pub(crate) transport: Arc<dyn HttpTransport>,
    pub(crate) cache: ResponseCache,
    pub(crate) metrics: MetricsRecorder,
    pub(crate) events: EventBus,
    pub(crate) logger: StructuredLogger,
}

impl std::fmt::Debug for ResilientHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientHttpClient")
            .field("base_url", &self.config.load().base_url)
            .field("cache_size", &self.cache.len())
            .field("listeners", &self.events.listener_count())
            .finish()
    }
}

impl ResilientHttpClient {
    /// Client with default configuration and the `reqwest` transport.
    pub fn new(base_url: impl Into<String>) -> crate::Result<Self> {
        Self::builder(base_url).build()
    }

    pub fn builder(base_url: impl Into<String>) -> super::builder::ClientBuilder {
        super::builder::ClientBuilder::new(base_url)
    }

    pub(crate) fn from_parts(
        config: ClientConfig,
        transport: Arc<dyn HttpTransport>,
        logger: StructuredLogger,
    ) -> Self {
        let events = EventBus::new(EVENT_SOURCE, config.events.enabled, logger.clone());
        Self {
            config: ArcSwap::from_pointee(config),
            transport,
            cache: ResponseCache::new(),
            metrics: MetricsRecorder::default(),
            events,
            logger,
        }
    }

    /// GET with caching and default per-call settings.
    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<ApiResponse<T>, ApiError> {
        self.get_with(endpoint, true, RequestConfig::default()).await
    }

    pub async fn get_with<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        use_cache: bool,
        request: RequestConfig,
    ) -> Result<ApiResponse<T>, ApiError> {
        let started = Instant::now();
        let cfg = self.config.load_full();
        let label = join_url(&cfg.base_url, endpoint);
        self.events.emit(ApiEventKind::Request {
            url: label.clone(),
            method: HttpMethod::Get,
        });

        let url = match validate_endpoint(endpoint, &label)
            .and_then(|_| build_url(&cfg.base_url, endpoint, &request.params))
        {
            Ok(url) => url,
            Err(err) => {
                self.logger.error_with(
                    "Endpoint validation failed",
                    json!({ "endpoint": endpoint, "error": err.message }),
                );
                self.metrics.rejected();
                self.events.emit(ApiEventKind::Error {
                    url: label,
                    error: err.clone(),
                });
                return Err(err);
            }
        };

        self.metrics.request(endpoint);

        let caching = use_cache && cfg.cache.enabled;
        let key = CacheKey::for_request(&cfg.cache.key_prefix, endpoint, &request.params);
        if caching {
            match self.cache.get(&key, cfg.cache.ttl()) {
                Some(hit) => {
                    self.metrics.cache_hit();
                    let elapsed = started.elapsed();
                    self.metrics.served_from_cache(elapsed);
                    self.events.emit(ApiEventKind::CacheHit {
                        key: key.to_string(),
                        duration_ms: elapsed.as_millis() as u64,
                    });
                    let data = match serde_json::from_value::<T>(hit.value) {
                        Ok(data) => data,
                        Err(e) => {
                            let err = ApiError::parse(
                                format!("Cached response does not match the requested type: {}", e),
                                url.as_str(),
                                200,
                            );
                            return Err(self.fail(err, started));
                        }
                    };
                    let mut headers = hit.headers;
                    headers.insert("x-cache".to_string(), "HIT".to_string());
                    self.logger.debug_with("Cache hit", json!({ "key": key.as_str() }));
                    return Ok(ApiResponse {
                        data,
                        headers,
                        status: 200,
                        url,
                        timestamp: Utc::now(),
                        from_cache: true,
                        rate_limit: None,
                    });
                }
                None => {
                    self.metrics.cache_miss();
                    self.events.emit(ApiEventKind::CacheMiss {
                        key: key.to_string(),
                    });
                }
            }
        }

        let headers = request_headers(&cfg, &request.headers);
        let plan = FetchPlan {
            attempts: request.retries.unwrap_or(cfg.retries),
            retry_delay: request.retry_delay.unwrap_or_else(|| cfg.retry_delay()),
            timeout: request.timeout.unwrap_or_else(|| cfg.timeout()),
            max_rate_limit_waits: cfg.max_rate_limit_waits,
            record_metrics: true,
        };

        let response = match self
            .fetch_with_retry(HttpMethod::Get, &url, &headers, &plan)
            .await
        {
            Ok(response) => response,
            Err(err) => return Err(self.fail(err, started)),
        };

        if !response.is_success() {
            let err = ApiError::http_status(
                response.status,
                &response.status_text,
                url.as_str(),
                &response.text(),
            );
            return Err(self.fail(err, started));
        }

        let value: Value = match serde_json::from_slice(&response.body) {
            Ok(v) => v,
            Err(e) => {
                let err = ApiError::parse(
                    format!("Invalid JSON response: {}", e),
                    url.as_str(),
                    response.status,
                );
                return Err(self.fail(err, started));
            }
        };
        let (parsed, to_store) = if caching && response.status == 200 {
            (serde_json::from_value::<T>(value.clone()), Some(value))
        } else {
            (serde_json::from_value::<T>(value), None)
        };
        let data = match parsed {
            Ok(data) => data,
            Err(e) => {
                let err = ApiError::parse(
                    format!("Response does not match the requested type: {}", e),
                    url.as_str(),
                    response.status,
                );
                return Err(self.fail(err, started));
            }
        };
        if let Some(value) = to_store {
            self.cache.set(key, value, response.headers.clone());
        }

        let rate_limit = RateLimitInfo::from_response(&response);
        let elapsed = started.elapsed();
        self.metrics.success(elapsed);
        self.events.emit(ApiEventKind::Response {
            url: url.clone(),
            status: response.status,
            duration_ms: elapsed.as_millis() as u64,
            cached: false,
        });
        if let Some(info) = rate_limit.as_ref().filter(|info| info.is_low()) {
            self.events.emit(ApiEventKind::from(info));
        }
        self.logger.debug_with(
            format!("GET {} -> {}", endpoint, response.status),
            json!({ "duration_ms": elapsed.as_millis() as u64 }),
        );

        Ok(ApiResponse {
            data,
            headers: response.headers,
            status: response.status,
            url,
            timestamp: Utc::now(),
            from_cache: false,
            rate_limit,
        })
    }

    fn fail(&self, err: ApiError, started: Instant) -> ApiError {
        self.metrics.failure(err.status, started.elapsed());
        self.logger.error_with(
            format!("Request failed: {}", err.message),
            json!({ "url": err.url, "code": err.code, "status": err.status }),
        );
        self.events.emit(ApiEventKind::Error {
            url: err.url.clone(),
            error: err.clone(),
        });
        err
    }

    /// HEAD through the same retry path, without cache, metrics totals or body.
    ///
    /// Any status the server answers with is returned as-is.
    pub async fn head(&self, endpoint: &str) -> Result<ApiResponse<()>, ApiError> {
        let cfg = self.config.load_full();
        let label = join_url(&cfg.base_url, endpoint);
        self.events.emit(ApiEventKind::Request {
            url: label.clone(),
            method: HttpMethod::Head,
        });
        let url = validate_endpoint(endpoint, &label)
            .and_then(|_| build_url(&cfg.base_url, endpoint, &BTreeMap::new()))
            .map_err(|err| {
                self.events.emit(ApiEventKind::Error {
                    url: label.clone(),
                    error: err.clone(),
                });
                err
            })?;

        let headers = request_headers(&cfg, &BTreeMap::new());
        let plan = FetchPlan {
            attempts: cfg.retries,
            retry_delay: cfg.retry_delay(),
            timeout: cfg.timeout(),
            max_rate_limit_waits: cfg.max_rate_limit_waits,
            record_metrics: false,
        };
        match self
            .fetch_with_retry(HttpMethod::Head, &url, &headers, &plan)
            .await
        {
            Ok(response) => Ok(head_response(response, url)),
            Err(err) => {
                self.events.emit(ApiEventKind::Error {
                    url: url.clone(),
                    error: err.clone(),
                });
                Err(err)
            }
        }
    }

    /// Removes every cached entry, or those whose key contains `pattern`.
    pub fn clear_cache(&self, pattern: Option<&str>) -> usize {
        let removed = self.cache.clear(pattern);
        self.logger.debug_with(
            "Cache cleared",
            json!({ "pattern": pattern, "removed": removed }),
        );
        self.events.emit(ApiEventKind::CacheClear {
            key: pattern.unwrap_or("all").to_string(),
            removed,
        });
        removed
    }

    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    /// Applies `patch` atomically. In-flight calls keep the configuration they started with.
    pub fn update_config(&self, patch: ConfigPatch) -> crate::Result<()> {
        let next = self.config.load().patched(&patch);
        next.validate()?;
        if patch.log_level.is_some() {
            self.logger.set_level(next.logger.threshold());
        }
        self.events.set_enabled(next.events.enabled);
        self.config.store(Arc::new(next));
        Ok(())
    }

    /// A copy of the current configuration.
    pub fn config(&self) -> ClientConfig {
        self.config.load().as_ref().clone()
    }

    /// A copy of the current counters.
    pub fn metrics(&self) -> RequestMetrics {
        self.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    pub fn add_event_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ApiEvent) + Send + Sync + 'static,
    {
        self.events.add_listener(listener)
    }

    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        self.events.remove_listener(id)
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    /// A pacer sized from the configured advisory budget.
    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::new((&self.config.load().rate_limit).into())
    }

    /// One uncached GET against the health path. Never fails.
    pub async fn health_check(&self) -> HealthStatus {
        let started = Instant::now();
        let path = self.config.load().health_path.clone();
        let result = self
            .get_with::<Value>(&path, false, RequestConfig::default())
            .await;
        let response_time_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(response) => HealthStatus {
                healthy: response.status == 200,
                response_time_ms,
                status: response.status,
            },
            Err(err) => HealthStatus {
                healthy: false,
                response_time_ms,
                status: err.status.unwrap_or(0),
            },
        }
    }
}

fn head_response(response: HttpResponse, url: String) -> ApiResponse<()> {
    let rate_limit = RateLimitInfo::from_response(&response);
    ApiResponse {
        data: (),
        headers: response.headers,
        status: response.status,
        url,
        timestamp: Utc::now(),
        from_cache: false,
        rate_limit,
    }
}

fn join_url(base_url: &str, endpoint: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), endpoint)
}

fn build_url(
    base_url: &str,
    endpoint: &str,
    params: &BTreeMap<String, Value>,
) -> Result<String, ApiError> {
    let joined = join_url(base_url, endpoint);
    let mut url = url::Url::parse(&joined).map_err(|e| {
        ApiError::validation(format!("Invalid request URL: {}", e), joined.as_str())
    })?;
    if !params.is_empty() {
        let mut query = url.query_pairs_mut();
        for (name, value) in params {
            match value {
                Value::String(s) => query.append_pair(name, s),
                Value::Null => query.append_pair(name, ""),
                other => query.append_pair(name, &other.to_string()),
            };
        }
    }
    Ok(url.to_string())
}

/// Defaults, then client headers, then per-call headers; names lowercased so
/// later layers replace earlier ones regardless of case.
fn request_headers(
    cfg: &ClientConfig,
    overrides: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    headers.insert("user-agent".to_string(), cfg.user_agent.clone());
    headers.insert("accept".to_string(), "application/json".to_string());
    headers.insert("accept-encoding".to_string(), "gzip".to_string());
    for (name, value) in cfg.headers.iter().chain(overrides.iter()) {
        headers.insert(name.to_ascii_lowercase(), value.clone());
    }
    headers
}
