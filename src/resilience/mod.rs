//! 弹性模式模块：提供熔断器、重试策略、错误分发与限流等可靠性保障机制。
//!
//! # Resilience Primitives Module
//!
//! Failure-isolation utilities any caller may wrap around a fallible async
//! operation, independent of the HTTP client.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`circuit_breaker`] | Closed / Open / HalfOpen breaker guarding one operation |
//! | [`retry`] | Named backoff strategies and retry options |
//! | [`dispatcher`] | Kind-keyed error handlers, retry loop, instrumented wrappers |
//! | [`rate_limiter`] | Sliding-window pacer for callers |
//!
//! ## Circuit Breaker
//!
//! - **Closed**: calls pass; failures are counted
//! - **Open**: calls fail fast until the reset timeout has passed
//! - **HalfOpen**: one trial call decides between Closed and Open
//!
//! ```rust
//! use resilient_api_client::logging::StructuredLogger;
//! use resilient_api_client::resilience::{ErrorDispatcher, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! # async fn demo() {
//! let dispatcher = ErrorDispatcher::new(StructuredLogger::new("app"));
//! let guarded = dispatcher.create_circuit_breaker(
//!     "fetch-profile",
//!     |id: u64| async move { Ok::<u64, std::io::Error>(id) },
//!     CircuitBreakerConfig::new()
//!         .with_failure_threshold(5)
//!         .with_reset_timeout(Duration::from_secs(60)),
//! );
//! let id = guarded.call(7).await;
//! # let _ = id;
//! # }
//! ```
//!
//! ## Retry
//!
//! ```rust
//! use resilient_api_client::logging::StructuredLogger;
//! use resilient_api_client::resilience::{ErrorDispatcher, RetryOptions};
//! use resilient_api_client::ApiError;
//!
//! # async fn demo() -> Result<(), ApiError> {
//! let dispatcher = ErrorDispatcher::new(StructuredLogger::new("app"));
//! let value = dispatcher
//!     .retry(
//!         || async { Ok::<_, ApiError>(42) },
//!         RetryOptions::new().with_max_attempts(3).with_strategy("network"),
//!     )
//!     .await?;
//! # let _ = value;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod dispatcher;
pub mod rate_limiter;
pub mod retry;

pub use circuit_breaker::{
    BreakerError, BreakerPermit, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot,
    CircuitOpenError, CircuitState,
};
pub use dispatcher::{
    ErrorDispatcher, ErrorHandledEvent, ErrorHandler, Guarded, HandledBy, PanicError,
    UnhandledError,
};
pub use rate_limiter::{RateLimiter, RateLimiterConfig, RateLimiterSnapshot};
pub use retry::{
    capped_exponential, OnRetry, RetryOptions, RetryStrategy, RetryStrategyRegistry,
    DATABASE_STRATEGY, DEFAULT_STRATEGY, NETWORK_STRATEGY,
};
