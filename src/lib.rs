//! # resilient-api-client
//!
//! 面向 REST 服务的弹性 HTTP 客户端核心：响应缓存、指数退避重试、限流感知、请求指标与事件通知，
//! 以及结构化日志、错误分发和熔断器等故障隔离组件。
//!
//! Resilient HTTP client core for typed REST API wrappers.
//!
//! ## Overview
//!
//! Endpoint wrappers hold a [`ResilientHttpClient`] and call only
//! [`get`](ResilientHttpClient::get) / [`head`](ResilientHttpClient::head).
//! Each GET goes through: endpoint validation → cache lookup → fetch with
//! retry (timeouts, exponential backoff, `429` waits) → JSON parsing → cache
//! store → metrics → events. Every failure comes back as an [`ApiError`].
//!
//! The failure-isolation layer is independent of the client: a
//! [`StructuredLogger`] with pluggable transports, and an
//! [`ErrorDispatcher`] owning kind-keyed handlers, a retry loop over named
//! strategies and circuit-breaker factories.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use resilient_api_client::{ApiEventKind, ResilientHttpClient};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> resilient_api_client::Result<()> {
//!     let client = ResilientHttpClient::builder("https://pokeapi.co/api/v2")
//!         .retries(3)
//!         .retry_delay(Duration::from_millis(500))
//!         .listener(|event| {
//!             if let ApiEventKind::RateLimit { remaining, .. } = event.kind {
//!                 eprintln!("only {} requests left", remaining);
//!             }
//!         })
//!         .build()?;
//!
//!     let pokemon = client.get::<serde_json::Value>("/pokemon/25").await?;
//!     println!("{} (cached: {})", pokemon.data["name"], pokemon.from_cache);
//!     println!("{:?}", client.metrics());
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | The client, its builder, configuration and metrics |
//! | [`cache`] | In-memory TTL response cache |
//! | [`transport`] | HTTP seam and the `reqwest` implementation |
//! | [`events`] | Client events and isolated listener fan-out |
//! | [`logging`] | Structured logger, transports and registry |
//! | [`resilience`] | Circuit breaker, retry strategies, error dispatcher, pacer |
//! | [`batch`] | Batched execution with pauses between batches |

pub mod batch;
pub mod cache;
pub mod client;
pub mod error_code;
pub mod events;
pub mod logging;
pub mod resilience;
pub mod transport;

// Re-export main types for convenience
pub use client::{
    ApiResponse, ClientBuilder, ClientConfig, ConfigPatch, HealthStatus, RateLimitInfo,
    RequestConfig, RequestMetrics, ResilientHttpClient,
};
pub use error::{ApiError, Classify, Error, ErrorContext};
pub use error_code::{ErrorKind, ErrorSeverity};
pub use events::{ApiEvent, ApiEventKind, ListenerId};
pub use logging::{LogLevel, LoggerRegistry, StructuredLogger};
pub use resilience::{CircuitBreaker, CircuitState, ErrorDispatcher, RetryStrategyRegistry};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
