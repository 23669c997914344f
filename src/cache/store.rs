//! In-memory response store.

use super::key::CacheKey;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;

/// Conditional-request metadata captured from the stored response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Validator {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl Validator {
    fn from_headers(headers: &BTreeMap<String, String>) -> Option<Self> {
        let etag = header(headers, "etag");
        let last_modified = header(headers, "last-modified");
        if etag.is_none() && last_modified.is_none() {
            None
        } else {
            Some(Self {
                etag,
                last_modified,
            })
        }
    }
}

fn header(headers: &BTreeMap<String, String>, name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.clone())
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    stored_at: Instant,
    headers: BTreeMap<String, String>,
    validator: Option<Validator>,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) > ttl
    }
}

/// A live entry handed back on a hit.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub value: Value,
    pub headers: BTreeMap<String, String>,
    pub age: Duration,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    evictions: AtomicU64,
}

impl AtomicStats {
    fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn to_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// TTL keyed store of successful response bodies.
///
/// The TTL is supplied per lookup so the owner can change it at runtime; an
/// entry older than the TTL is treated as absent and evicted on read. The
/// lock is only held for the map operation itself.
pub struct ResponseCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    stats: AtomicStats,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            stats: AtomicStats::new(),
        }
    }

    pub fn get(&self, key: &CacheKey, ttl: Duration) -> Option<CachedResponse> {
        let now = Instant::now();
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            match entries.get(key) {
                None => {
                    self.stats.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
                Some(entry) if !entry.is_expired(ttl, now) => {
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(CachedResponse {
                        value: entry.value.clone(),
                        headers: entry.headers.clone(),
                        age: now.saturating_duration_since(entry.stored_at),
                    });
                }
                Some(_) => {}
            }
        }

        // Expired: re-check under the write lock, another writer may have refreshed it.
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = entries.get(key) {
            if !entry.is_expired(ttl, now) {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                return Some(CachedResponse {
                    value: entry.value.clone(),
                    headers: entry.headers.clone(),
                    age: now.saturating_duration_since(entry.stored_at),
                });
            }
            entries.remove(key);
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Stores `value`, replacing any previous entry.
    pub fn set(&self, key: CacheKey, value: Value, headers: BTreeMap<String, String>) {
        let validator = Validator::from_headers(&headers);
        let entry = CacheEntry {
            value,
            stored_at: Instant::now(),
            headers,
            validator,
        };
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, entry);
        self.stats.sets.fetch_add(1, Ordering::Relaxed);
    }

    /// Removes every entry, or only those whose key contains `pattern`.
    /// Returns the number removed.
    pub fn clear(&self, pattern: Option<&str>) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        match pattern {
            None => entries.clear(),
            Some(p) => entries.retain(|k, _| !k.contains(p)),
        }
        before - entries.len()
    }

    /// Number of stored entries, expired ones included until they are read or purged.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn purge_expired(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(ttl, now));
        let removed = before - entries.len();
        self.stats
            .evictions
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn validator(&self, key: &CacheKey) -> Option<Validator> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .and_then(|e| e.validator.clone())
    }

    pub fn keys(&self) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.to_stats()
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TTL: Duration = Duration::from_secs(300);

    fn headers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_then_get() {
        let cache = ResponseCache::new();
        let key = CacheKey::from("api:/pokemon/1");
        cache.set(key.clone(), json!({"name": "bulbasaur"}), BTreeMap::new());
        let hit = cache.get(&key, TTL).unwrap();
        assert_eq!(hit.value["name"], "bulbasaur");
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = ResponseCache::new();
        let key = CacheKey::from("api:/x");
        cache.set(key.clone(), json!(1), BTreeMap::new());

        tokio::time::advance(TTL).await;
        assert!(cache.get(&key, TTL).is_some(), "exactly ttl old is still live");

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(cache.get(&key, TTL).is_none());
        assert_eq!(cache.len(), 0, "expired entry is evicted on read");
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shorter_ttl_applies_to_existing_entries() {
        let cache = ResponseCache::new();
        let key = CacheKey::from("api:/x");
        cache.set(key.clone(), json!(1), BTreeMap::new());
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(cache.get(&key, Duration::from_secs(5)).is_none());
    }

    #[test]
    fn test_set_overwrites() {
        let cache = ResponseCache::new();
        let key = CacheKey::from("k");
        cache.set(key.clone(), json!(1), BTreeMap::new());
        cache.set(key.clone(), json!(2), BTreeMap::new());
        assert_eq!(cache.get(&key, TTL).unwrap().value, json!(2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_clear_by_pattern() {
        let cache = ResponseCache::new();
        cache.set("api:/pokemon/1".into(), json!(1), BTreeMap::new());
        cache.set("api:/pokemon/2".into(), json!(2), BTreeMap::new());
        cache.set("api:/berry/1".into(), json!(3), BTreeMap::new());

        assert_eq!(cache.clear(Some("/pokemon")), 2);
        assert_eq!(cache.keys(), vec![CacheKey::from("api:/berry/1")]);
        assert_eq!(cache.clear(None), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_validator_captured_from_headers() {
        let cache = ResponseCache::new();
        cache.set(
            "a".into(),
            json!(null),
            headers(&[("ETag", "\"abc\""), ("last-modified", "Tue, 01 Jan 2030 00:00:00 GMT")]),
        );
        cache.set("b".into(), json!(null), headers(&[("content-type", "application/json")]));

        let v = cache.validator(&"a".into()).unwrap();
        assert_eq!(v.etag.as_deref(), Some("\"abc\""));
        assert!(v.last_modified.is_some());
        assert!(cache.validator(&"b".into()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = ResponseCache::new();
        cache.set("old".into(), json!(1), BTreeMap::new());
        tokio::time::advance(Duration::from_secs(10)).await;
        cache.set("new".into(), json!(2), BTreeMap::new());
        assert_eq!(cache.purge_expired(Duration::from_secs(5)), 1);
        assert_eq!(cache.keys(), vec![CacheKey::from("new")]);
    }
}
