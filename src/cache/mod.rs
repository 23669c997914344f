//! 响应缓存模块：在内存中按 TTL 缓存成功的 GET 响应，减少重复请求。
//!
//! # Response Caching Module
//!
//! In-memory, ephemeral caching of successful responses keyed by endpoint and
//! query parameters.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ResponseCache`] | TTL keyed store with hit/miss statistics |
//! | [`CacheKey`] | Fingerprint of endpoint path and serialized parameters |
//! | [`Validator`] | `ETag` / `Last-Modified` captured on store |
//!
//! ## Example
//!
//! ```rust
//! use resilient_api_client::cache::{CacheKey, ResponseCache};
//! use std::collections::BTreeMap;
//! use std::time::Duration;
//!
//! let cache = ResponseCache::new();
//! let key = CacheKey::for_request("api", "/pokemon/1", &BTreeMap::new());
//! cache.set(key.clone(), serde_json::json!({"id": 1}), BTreeMap::new());
//! assert!(cache.get(&key, Duration::from_secs(300)).is_some());
//! ```

mod key;
mod store;

pub use key::{CacheKey, DEFAULT_KEY_PREFIX};
pub use store::{CacheStats, CachedResponse, ResponseCache, Validator};
