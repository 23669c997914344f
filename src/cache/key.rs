//! Cache key generation.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

pub const DEFAULT_KEY_PREFIX: &str = "api";

/// Fingerprint of a GET: prefix, endpoint path and (optionally) its query parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// `"{prefix}:{endpoint}"`, or `"{prefix}:{endpoint}:{params}"` when there are
    /// parameters. Params are serialized with keys in sorted order so the same
    /// query always yields the same key.
    pub fn for_request(prefix: &str, endpoint: &str, params: &BTreeMap<String, Value>) -> Self {
        if params.is_empty() {
            return Self(format!("{}:{}", prefix, endpoint));
        }
        // BTreeMap keys are ordered; nested objects keep serde_json's own order.
        let params_json = serde_json::to_string(params).unwrap_or_default();
        Self(format!("{}:{}:{}", prefix, endpoint, params_json))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn contains(&self, pattern: &str) -> bool {
        self.0.contains(pattern)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}
