//! In-process TTL response cache.
//!
//! Keyed by SHA-256 of `org:group:prompt`, so identical prompts from
//! different callers or groups never share entries. Only safe responses are
//! stored; blocked and error outcomes are always re-evaluated.

use aegis_core::Usage;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};

/// Cache key for a prompt within an org and group.
#[must_use]
pub fn cache_key(org: &str, group: Option<&str>, prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(org.as_bytes());
    hasher.update(b":");
    hasher.update(group.unwrap_or("default").as_bytes());
    hasher.update(b":");
    hasher.update(prompt.as_bytes());
    hex::encode(hasher.finalize())
}

/// What gets stored for a safe response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedCompletion {
    /// Final response text, post-filtering.
    pub text: String,
    /// Provider that served it.
    pub provider: String,
    /// Model that served it.
    pub model: String,
    /// Whether response filtering redacted anything.
    pub modified: bool,
    /// Token usage, when the backend reported it.
    pub usage: Option<Usage>,
}

struct Entry {
    stored_at: Instant,
    value: CachedCompletion,
}

/// TTL-bounded response cache.
pub struct ResponseCache {
    entries: DashMap<String, Entry>,
    ttl: Duration,
    max_entries: usize,
    enabled: bool,
}

impl ResponseCache {
    /// Create a cache.
    #[must_use]
    pub fn new(enabled: bool, ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries,
            enabled,
        }
    }

    /// A disabled cache that stores and returns nothing.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(false, Duration::ZERO, 0)
    }

    /// Fetch a live entry. Expired entries are removed on the way out.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<CachedCompletion> {
        if !self.enabled {
            return None;
        }
        let expired = match self.entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => {
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    /// Store a safe response. A full cache drops expired entries first and
    /// refuses the insert if still at capacity; bounded memory matters more
    /// than hit rate.
    pub fn put(&self, key: String, value: CachedCompletion) {
        if !self.enabled {
            return;
        }
        if self.entries.len() >= self.max_entries {
            self.entries.retain(|_, entry| entry.stored_at.elapsed() < self.ttl);
            if self.entries.len() >= self.max_entries {
                return;
            }
        }
        self.entries.insert(
            key,
            Entry {
                stored_at: Instant::now(),
                value,
            },
        );
    }

    /// Number of resident entries, expired included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completion(text: &str) -> CachedCompletion {
        CachedCompletion {
            text: text.to_string(),
            provider: "ollama".to_string(),
            model: "mistral".to_string(),
            modified: false,
            usage: None,
        }
    }

    #[test]
    fn keys_scope_by_org_and_group() {
        let a = cache_key("org-1", Some("research"), "hello");
        let b = cache_key("org-1", Some("support"), "hello");
        let c = cache_key("org-1", None, "hello");
        let d = cache_key("org-2", Some("research"), "hello");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(a, cache_key("org-1", Some("research"), "hello"));
    }

    #[test]
    fn round_trip_within_ttl() {
        let cache = ResponseCache::new(true, Duration::from_secs(60), 16);
        let key = cache_key("org", None, "hello");
        cache.put(key.clone(), completion("hi"));
        assert_eq!(cache.get(&key).unwrap().text, "hi");
    }

    #[test]
    fn expired_entries_are_evicted_on_read() {
        let cache = ResponseCache::new(true, Duration::ZERO, 16);
        let key = cache_key("org", None, "hello");
        cache.put(key.clone(), completion("hi"));
        assert!(cache.get(&key).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn disabled_cache_stores_nothing() {
        let cache = ResponseCache::disabled();
        let key = cache_key("org", None, "hello");
        cache.put(key.clone(), completion("hi"));
        assert!(cache.get(&key).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn full_cache_refuses_new_live_entries() {
        let cache = ResponseCache::new(true, Duration::from_secs(60), 1);
        cache.put(cache_key("org", None, "one"), completion("1"));
        cache.put(cache_key("org", None, "two"), completion("2"));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&cache_key("org", None, "two")).is_none());
    }
}
