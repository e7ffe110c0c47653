//! Bounded in-memory cache for check results, with TTL expiry and a choice
//! of LRU or FIFO eviction.
//!
//! Keys are SHA-256 digests over `(url, extract key, test flag)` so that the
//! same URL checked under different options occupies distinct entries.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    #[default]
    Lru,
    Fifo,
}

struct CacheEntry {
    version: String,
    expires_at: Instant,
    last_access: Instant,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    // Insertion order, for FIFO eviction.
    queue: VecDeque<String>,
}

pub struct CheckCache {
    inner: Mutex<CacheInner>,
    ttl: Duration,
    max_size: usize,
    policy: EvictionPolicy,
}

impl CheckCache {
    pub fn new(ttl: Duration, max_size: usize, policy: EvictionPolicy) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                queue: VecDeque::new(),
            }),
            ttl,
            max_size,
            policy,
        }
    }

    /// Derive the cache key for a check.
    pub fn key(url: &str, extract_key: &str, check_test_version: bool) -> String {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        hasher.update(b"|");
        hasher.update(extract_key.as_bytes());
        hasher.update(b"|");
        hasher.update(if check_test_version { b"1" } else { b"0" });
        format!("{:x}", hasher.finalize())
    }

    /// Look up a live entry. Expired entries are deleted in place.
    pub fn get(&self, key: &str) -> Option<String> {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();

        let expired = match inner.entries.get(key) {
            None => return None,
            Some(entry) => now >= entry.expires_at,
        };
        if expired {
            Self::remove_key(&mut inner, key);
            return None;
        }

        let entry = inner.entries.get_mut(key).unwrap();
        if self.policy == EvictionPolicy::Lru {
            entry.last_access = now;
        }
        Some(entry.version.clone())
    }

    /// Insert an entry, evicting one first when at capacity.
    pub fn set(&self, key: &str, version: &str) {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();

        if !inner.entries.contains_key(key) && inner.entries.len() >= self.max_size {
            self.evict(&mut inner);
        }

        if inner.entries.insert(
            key.to_string(),
            CacheEntry {
                version: version.to_string(),
                expires_at: now + self.ttl,
                last_access: now,
            },
        ).is_none()
        {
            inner.queue.push_back(key.to_string());
        }
    }

    pub fn delete(&self, key: &str) {
        let mut inner = self.inner.lock().unwrap();
        Self::remove_key(&mut inner, key);
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.clear();
        inner.queue.clear();
        debug!("check cache cleared");
    }

    /// Sweep out every expired entry.
    pub fn clear_expired(&self) {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| now >= e.expires_at)
            .map(|(k, _)| k.clone())
            .collect();
        let count = expired.len();
        for key in expired {
            Self::remove_key(&mut inner, &key);
        }
        if count > 0 {
            debug!(count, "expired cache entries removed");
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict(&self, inner: &mut CacheInner) {
        match self.policy {
            EvictionPolicy::Lru => {
                let oldest = inner
                    .entries
                    .iter()
                    .min_by_key(|(_, e)| e.last_access)
                    .map(|(k, _)| k.clone());
                if let Some(key) = oldest {
                    Self::remove_key(inner, &key);
                }
            }
            EvictionPolicy::Fifo => {
                if let Some(key) = inner.queue.pop_front() {
                    inner.entries.remove(&key);
                }
            }
        }
    }

    fn remove_key(inner: &mut CacheInner, key: &str) {
        inner.entries.remove(key);
        if let Some(pos) = inner.queue.iter().position(|k| k == key) {
            inner.queue.remove(pos);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(ttl_ms: u64, max: usize, policy: EvictionPolicy) -> CheckCache {
        CheckCache::new(Duration::from_millis(ttl_ms), max, policy)
    }

    #[test]
    fn keys_differ_by_every_component() {
        let base = CheckCache::key("https://a", "k", false);
        assert_ne!(base, CheckCache::key("https://b", "k", false));
        assert_ne!(base, CheckCache::key("https://a", "k2", false));
        assert_ne!(base, CheckCache::key("https://a", "k", true));
        assert_eq!(base, CheckCache::key("https://a", "k", false));
    }

    #[test]
    fn get_returns_what_set_stored() {
        let cache = cache(10_000, 10, EvictionPolicy::Lru);
        cache.set("k", "1.2.3");
        assert_eq!(cache.get("k"), Some("1.2.3".to_string()));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn expired_entries_miss_and_are_deleted() {
        let cache = cache(0, 10, EvictionPolicy::Lru);
        cache.set("k", "1.2.3");
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn size_never_exceeds_capacity() {
        let cache = cache(10_000, 3, EvictionPolicy::Lru);
        for i in 0..10 {
            cache.set(&format!("k{i}"), "1.0.0");
            assert!(cache.len() <= 3);
        }
    }

    #[test]
    fn lru_evicts_the_least_recently_used() {
        let cache = cache(10_000, 2, EvictionPolicy::Lru);
        cache.set("a", "1");
        std::thread::sleep(Duration::from_millis(5));
        cache.set("b", "2");
        std::thread::sleep(Duration::from_millis(5));
        // Touch `a` so `b` becomes the eviction victim.
        cache.get("a");
        std::thread::sleep(Duration::from_millis(5));
        cache.set("c", "3");

        assert_eq!(cache.get("a"), Some("1".to_string()));
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("c"), Some("3".to_string()));
    }

    #[test]
    fn fifo_evicts_the_oldest_insertion() {
        let cache = cache(10_000, 2, EvictionPolicy::Fifo);
        cache.set("a", "1");
        cache.set("b", "2");
        // Touching `a` must not save it under FIFO.
        cache.get("a");
        cache.set("c", "3");

        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some("2".to_string()));
        assert_eq!(cache.get("c"), Some("3".to_string()));
    }

    #[test]
    fn clear_expired_sweeps_only_dead_entries() {
        let long = CheckCache::new(Duration::from_secs(60), 10, EvictionPolicy::Lru);
        long.set("live", "1");
        let short = CheckCache::new(Duration::from_millis(0), 10, EvictionPolicy::Lru);
        short.set("dead", "1");

        long.clear_expired();
        short.clear_expired();
        assert_eq!(long.len(), 1);
        assert_eq!(short.len(), 0);
    }

    #[test]
    fn overwriting_a_key_does_not_grow_the_queue() {
        let cache = cache(10_000, 2, EvictionPolicy::Fifo);
        cache.set("a", "1");
        cache.set("a", "2");
        cache.set("b", "3");
        cache.set("c", "4");
        // `a` was the oldest insertion and goes first.
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.len(), 2);
    }
}
