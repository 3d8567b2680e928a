//! In-process cache tier.
//!
//! An LRU-bounded, TTL-aware map. Expiry is lazy: an expired entry is
//! dropped on the read that finds it and reported as a miss.

use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use lru::LruCache;
use metrics::counter;
use serde_json::Value;
use tracing::debug;

use super::config::CacheConfig;
use super::entry::{CacheEntry, CacheTier};
use crate::sync::{rw_read, rw_write};

const SOURCE: &str = "strato::cache::memory";

pub struct MemoryStore {
    entries: RwLock<LruCache<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.memory_entry_limit_non_zero())),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the stored value if present and unexpired.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        let expired_tier = match entries.get(key) {
            Some(entry) if !entry.is_expired() => {
                let value = entry.value.clone();
                self.hits.fetch_add(1, Ordering::Relaxed);
                counter!("strato_cache_memory_hit_total").increment(1);
                return Some(value);
            }
            Some(entry) => Some(entry.tier),
            None => None,
        };
        if let Some(tier) = expired_tier {
            debug!(
                target: "strato::cache::memory",
                key,
                tier = tier.as_str(),
                "dropping expired entry on read"
            );
            entries.pop(key);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        counter!("strato_cache_memory_miss_total").increment(1);
        None
    }

    /// Writes a value with an expiry, replacing any previous entry.
    pub fn set(&self, key: &str, value: Value, ttl: Duration) {
        rw_write(&self.entries, SOURCE, "set").put(
            key.to_string(),
            CacheEntry::new(value, CacheTier::Memory, ttl),
        );
    }

    /// Removes the key. No error if absent.
    pub fn delete(&self, key: &str) {
        rw_write(&self.entries, SOURCE, "delete").pop(key);
    }

    pub fn clear(&self) {
        rw_write(&self.entries, SOURCE, "clear").clear();
    }

    /// Number of resident entries, expired or not.
    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Monotone (hits, misses) for the life of the process.
    pub fn counters(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store_with_limit(limit: usize) -> MemoryStore {
        MemoryStore::new(&CacheConfig {
            memory_entry_limit: limit,
            ..Default::default()
        })
    }

    #[test]
    fn roundtrip_within_ttl() {
        let store = store_with_limit(16);
        assert!(store.get("k1").is_none());

        store.set("k1", json!({"n": 1}), Duration::from_secs(60));
        assert_eq!(store.get("k1"), Some(json!({"n": 1})));

        store.delete("k1");
        assert!(store.get("k1").is_none());
    }

    #[test]
    fn expired_entry_is_absent_and_dropped() {
        let store = store_with_limit(16);
        store.set("k1", json!("v1"), Duration::from_millis(20));
        std::thread::sleep(Duration::from_millis(40));

        assert!(store.get("k1").is_none());
        // the lazy read removed the expired entry
        assert!(store.is_empty());
    }

    #[test]
    fn overwrite_replaces_value_and_expiry() {
        let store = store_with_limit(16);
        store.set("k1", json!("old"), Duration::ZERO);
        store.set("k1", json!("new"), Duration::from_secs(60));
        assert_eq!(store.get("k1"), Some(json!("new")));
    }

    #[test]
    fn lru_eviction_at_capacity() {
        let store = store_with_limit(2);
        store.set("a", json!(1), Duration::from_secs(60));
        store.set("b", json!(2), Duration::from_secs(60));
        store.set("c", json!(3), Duration::from_secs(60));

        assert!(store.get("a").is_none()); // evicted
        assert!(store.get("b").is_some());
        assert!(store.get("c").is_some());
    }

    #[test]
    fn counters_track_reads_and_never_decrease() {
        let store = store_with_limit(16);
        store.set("k1", json!("v"), Duration::from_secs(60));

        let _ = store.get("k1"); // hit
        let _ = store.get("k2"); // miss
        let _ = store.get("k1"); // hit

        let (hits, misses) = store.counters();
        assert_eq!(hits, 2);
        assert_eq!(misses, 1);
    }
}
