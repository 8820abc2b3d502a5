//! In-memory TTL cache backend

use crate::{CacheConfig, CacheKey, CacheStats, PatternStrategy};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Entry in the memory cache
#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    stored_at: Instant,
}

impl<T> CacheEntry<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            stored_at: Instant::now(),
        }
    }

    fn is_valid(&self, ttl: Duration) -> bool {
        self.stored_at.elapsed() < ttl
    }
}

#[derive(Debug, Default)]
struct HitCounters {
    hits: u64,
    misses: u64,
}

/// Typed in-memory cache whose entries expire after the configured TTL.
///
/// Each key is held in a sharded concurrent map, so the check-then-read and
/// the overwrite of a single key are atomic with respect to other handlers.
/// Nothing is guaranteed across keys.
pub struct TtlCache<T> {
    entries: DashMap<CacheKey, CacheEntry<T>>,
    config: CacheConfig,
    counters: Mutex<HitCounters>,
}

impl<T: Clone> TtlCache<T> {
    /// Create a new cache with the given configuration
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            counters: Mutex::new(HitCounters::default()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.config.ttl
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Get a value if present and younger than the TTL
    pub fn get(&self, key: &str) -> Option<T> {
        let ttl = self.config.ttl;
        let lookup = self.entries.get(key).map(|entry| {
            if entry.is_valid(ttl) {
                Some(entry.value.clone())
            } else {
                None
            }
        });

        match lookup {
            Some(Some(value)) => {
                self.counters.lock().hits += 1;
                tracing::trace!(cache = %self.config.name, key, "cache hit");
                Some(value)
            }
            Some(None) => {
                // Another handler may have refreshed the key in between
                self.entries.remove_if(key, |_, entry| !entry.is_valid(ttl));
                self.counters.lock().misses += 1;
                tracing::trace!(cache = %self.config.name, key, "cache entry expired");
                None
            }
            None => {
                self.counters.lock().misses += 1;
                None
            }
        }
    }

    /// Store a value, overwriting any previous entry for the key
    pub fn set(&self, key: impl Into<CacheKey>, value: T) {
        let key = key.into();

        if self.config.sweep_on_set {
            self.sweep_expired();
        }

        if let Some(max_entries) = self.config.max_entries {
            if self.entries.len() >= max_entries && !self.entries.contains_key(&key) {
                self.evict_oldest();
            }
        }

        self.entries.insert(key, CacheEntry::new(value));
    }

    /// Remove a single key; returns whether an entry was present
    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove several keys; returns how many entries were present
    pub fn invalidate_many<K: AsRef<str>>(&self, keys: &[K]) -> usize {
        keys.iter().filter(|key| self.invalidate(key.as_ref())).count()
    }

    /// Remove every key matching the pattern
    pub fn invalidate_matching(&self, pattern: &PatternStrategy) -> usize {
        let keys: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|entry| pattern.matches(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();

        self.invalidate_many(&keys)
    }

    /// Drop all entries past the TTL; returns how many were dropped
    pub fn sweep_expired(&self) -> usize {
        let ttl = self.config.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_valid(ttl));
        let swept = before.saturating_sub(self.entries.len());

        if swept > 0 {
            tracing::debug!(cache = %self.config.name, swept, "swept expired cache entries");
        }
        swept
    }

    /// Remove all entries and reset the hit counters
    pub fn clear(&self) {
        self.entries.clear();
        *self.counters.lock() = HitCounters::default();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let ttl = self.config.ttl;
        let total = self.entries.len();
        let valid = self
            .entries
            .iter()
            .filter(|entry| entry.value().is_valid(ttl))
            .count();
        let counters = self.counters.lock();

        CacheStats {
            total,
            valid: valid.min(total),
            expired: total.saturating_sub(valid),
            hits: counters.hits,
            misses: counters.misses,
        }
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().stored_at)
            .map(|entry| entry.key().clone());

        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

impl<T: Clone> Default for TtlCache<T> {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::sleep;

    fn short_lived(ttl_ms: u64) -> TtlCache<String> {
        TtlCache::new(CacheConfig::new("test").with_ttl(Duration::from_millis(ttl_ms)))
    }

    #[test]
    fn test_basic_operations() {
        let cache: TtlCache<String> = TtlCache::default();

        cache.set("test", "value".to_string());
        assert_eq!(cache.get("test"), Some("value".to_string()));

        assert!(cache.invalidate("test"));
        assert!(!cache.invalidate("test"));
        assert_eq!(cache.get("test"), None);
    }

    #[test]
    fn test_overwrite_replaces_value() {
        let cache: TtlCache<u32> = TtlCache::default();

        cache.set("k", 1);
        cache.set("k", 2);

        assert_eq!(cache.get("k"), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let cache = short_lived(50);
        cache.set("ttl_test", "value".to_string());
        assert!(cache.get("ttl_test").is_some());

        sleep(Duration::from_millis(100)).await;

        assert_eq!(cache.get("ttl_test"), None);
        // Expired read removes the entry
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn test_stats_split_valid_and_expired() {
        let cache = TtlCache::new(
            CacheConfig::new("stats")
                .with_ttl(Duration::from_millis(50))
                .with_sweep_on_set(false),
        );

        cache.set("old", 1u8);
        sleep(Duration::from_millis(100)).await;
        cache.set("fresh", 2u8);

        let stats = cache.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.valid, 1);
        assert_eq!(stats.expired, 1);
    }

    #[tokio::test]
    async fn test_set_sweeps_expired_entries() {
        let cache = short_lived(50);
        cache.set("a", "1".to_string());
        cache.set("b", "2".to_string());

        sleep(Duration::from_millis(100)).await;
        cache.set("c", "3".to_string());

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().expired, 0);
    }

    #[test]
    fn test_hit_and_miss_counters() {
        let cache: TtlCache<i32> = TtlCache::default();
        cache.set("present", 1);

        cache.get("present");
        cache.get("missing");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_ratio(), 0.5);
    }

    #[test]
    fn test_max_entries_evicts_oldest() {
        let cache = TtlCache::new(CacheConfig::new("small").max_entries_limit(2));

        cache.set("key1", 1);
        std::thread::sleep(Duration::from_millis(2));
        cache.set("key2", 2);
        std::thread::sleep(Duration::from_millis(2));
        cache.set("key3", 3);

        assert_eq!(cache.get("key1"), None);
        assert_eq!(cache.get("key2"), Some(2));
        assert_eq!(cache.get("key3"), Some(3));
    }

    #[test]
    fn test_invalidate_matching_prefix() {
        let cache: TtlCache<u8> = TtlCache::default();
        cache.set("tree:ancestors:1:3", 1);
        cache.set("tree:ancestors:1:4", 2);
        cache.set("tree:descendants:1:3", 3);

        let removed =
            cache.invalidate_matching(&PatternStrategy::Prefix("tree:ancestors:1:".to_string()));

        assert_eq!(removed, 2);
        assert_eq!(cache.get("tree:descendants:1:3"), Some(3));
    }

    #[test]
    fn test_clear_resets_everything() {
        let cache: TtlCache<u8> = TtlCache::default();
        cache.set("a", 1);
        cache.get("a");
        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[tokio::test]
    async fn test_concurrent_writers_keep_one_entry_per_key() {
        let cache: Arc<TtlCache<usize>> = Arc::new(TtlCache::default());
        let mut handles = Vec::new();

        for i in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.set(format!("key:{}", i % 4), i);
                cache.get(&format!("key:{}", i % 4))
            }));
        }

        for handle in handles {
            assert!(handle.await.unwrap().is_some());
        }
        assert_eq!(cache.len(), 4);
    }
}
