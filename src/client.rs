//! HTTP client for one REST service.
//!
//! Keep the public surface small: [`ResilientHttpClient`] and its
//! [`ClientBuilder`]. Implementation details are split into submodules under
//! `src/client/`.

pub mod builder;
pub mod config;
pub mod core;
mod execution;
pub mod metrics;
pub mod rate_limit;
pub mod types;
mod validation;

pub use builder::ClientBuilder;
pub use config::{
    CacheSettings, ClientConfig, ConfigPatch, EventSettings, LoggerSettings, RateLimitSettings,
    DEFAULT_USER_AGENT,
};
pub use self::core::ResilientHttpClient;
pub use metrics::RequestMetrics;
pub use rate_limit::RateLimitInfo;
pub use types::{ApiResponse, HealthStatus, RequestConfig};
