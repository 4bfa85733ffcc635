//! Bounded map with least-recently-used eviction and a time-to-live.
//!
//! Entries live in an `IndexMap` ordered from least to most recently
//! accessed, so the LRU victim is always index 0. Expiry is lazy: an entry
//! past its TTL is dropped when a lookup finds it.

use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::{Equivalent, IndexMap};
use parking_lot::Mutex;
use serde::Serialize;
use ts_rs::TS;

use crate::clock::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, TS)]
#[ts(export)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct CacheEntry<V> {
    value: Arc<V>,
    last_access: Instant,
}

struct Inner<K, V> {
    entries: IndexMap<K, CacheEntry<V>>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

pub struct BoundedCache<K, V> {
    inner: Mutex<Inner<K, V>>,
    capacity: usize,
    ttl: Option<Duration>,
    clock: Arc<dyn Clock>,
}

impl<K: Hash + Eq, V> BoundedCache<K, V> {
    /// `capacity` is at least 1. A `ttl` of None never expires entries.
    pub fn new(capacity: usize, ttl: Option<Duration>, clock: Arc<dyn Clock>) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                entries: IndexMap::with_capacity(capacity.min(1024)),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            capacity,
            ttl,
            clock,
        }
    }

    fn is_expired(&self, entry: &CacheEntry<V>, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.saturating_duration_since(entry.last_access) >= ttl)
    }

    /// Look up and refresh. Counts a hit or a miss; an expired entry is
    /// removed and counts as both an eviction and a miss.
    pub fn get<Q>(&self, key: &Q) -> Option<Arc<V>>
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let Some((idx, _, entry)) = inner.entries.get_full_mut(key) else {
            inner.misses += 1;
            return None;
        };

        if self.is_expired(entry, now) {
            inner.entries.shift_remove_index(idx);
            inner.evictions += 1;
            inner.misses += 1;
            return None;
        }

        entry.last_access = now;
        let value = Arc::clone(&entry.value);
        let last = inner.entries.len() - 1;
        inner.entries.move_index(idx, last);
        inner.hits += 1;
        Some(value)
    }

    /// Look up without refreshing or touching the counters.
    pub fn peek<Q>(&self, key: &Q) -> Option<Arc<V>>
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        let now = self.clock.now();
        let inner = self.inner.lock();
        inner
            .entries
            .get(key)
            .filter(|entry| !self.is_expired(entry, now))
            .map(|entry| Arc::clone(&entry.value))
    }

    /// Insert or replace as the most recently used entry, then evict from
    /// the LRU end while over capacity.
    pub fn put(&self, key: K, value: Arc<V>) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.entries.shift_remove(&key);
        inner.entries.insert(key, CacheEntry { value, last_access: now });
        while inner.entries.len() > self.capacity {
            inner.entries.shift_remove_index(0);
            inner.evictions += 1;
        }
    }

    pub fn invalidate<Q>(&self, key: &Q) -> bool
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        self.inner.lock().entries.shift_remove(key).is_some()
    }

    /// Remove every entry matching `predicate`. Returns how many were removed.
    pub fn invalidate_where(&self, mut predicate: impl FnMut(&K, &V) -> bool) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|k, e| !predicate(k, &e.value));
        before - inner.entries.len()
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.entries.len(),
            capacity: self.capacity,
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn cache(capacity: usize, ttl: Option<Duration>) -> (BoundedCache<String, u32>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (BoundedCache::new(capacity, ttl, clock.clone()), clock)
    }

    #[test]
    fn get_counts_hits_and_misses() {
        let (cache, _) = cache(4, None);
        cache.put("a".into(), Arc::new(1));
        assert_eq!(cache.get("a").as_deref(), Some(&1));
        assert!(cache.get("b").is_none());
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
    }

    #[test]
    fn evicts_least_recently_used() {
        let (cache, _) = cache(2, None);
        cache.put("a".into(), Arc::new(1));
        cache.put("b".into(), Arc::new(2));
        cache.get("a");
        cache.put("c".into(), Arc::new(3));
        assert!(cache.peek("a").is_some());
        assert!(cache.peek("b").is_none());
        assert!(cache.peek("c").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn peek_does_not_refresh() {
        let (cache, _) = cache(2, None);
        cache.put("a".into(), Arc::new(1));
        cache.put("b".into(), Arc::new(2));
        cache.peek("a");
        cache.put("c".into(), Arc::new(3));
        assert!(cache.peek("a").is_none());
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (0, 0));
    }

    #[test]
    fn replacing_a_key_does_not_evict() {
        let (cache, _) = cache(2, None);
        cache.put("a".into(), Arc::new(1));
        cache.put("b".into(), Arc::new(2));
        cache.put("a".into(), Arc::new(10));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 0);
        // "a" is now most recent, so "b" goes first.
        cache.put("c".into(), Arc::new(3));
        assert!(cache.peek("b").is_none());
        assert_eq!(cache.peek("a").as_deref(), Some(&10));
    }

    #[test]
    fn ttl_expiry_is_lazy_and_counted() {
        let (cache, clock) = cache(4, Some(Duration::from_secs(300)));
        cache.put("a".into(), Arc::new(1));
        clock.advance(Duration::from_secs(299));
        assert!(cache.get("a").is_some());
        // The hit refreshed the entry.
        clock.advance(Duration::from_secs(299));
        assert!(cache.get("a").is_some());
        clock.advance(Duration::from_secs(301));
        assert!(cache.peek("a").is_none());
        assert_eq!(cache.len(), 1);
        assert!(cache.get("a").is_none());
        assert_eq!(cache.len(), 0);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.evictions), (2, 1, 1));
    }

    #[test]
    fn invalidation() {
        let (cache, _) = cache(8, None);
        for (i, key) in ["s1:a", "s1:b", "s2:a"].into_iter().enumerate() {
            cache.put(key.to_string(), Arc::new(u32::try_from(i).unwrap()));
        }
        assert!(cache.invalidate("s2:a"));
        assert!(!cache.invalidate("s2:a"));
        assert_eq!(cache.invalidate_where(|k, _| k.starts_with("s1:")), 2);
        assert!(cache.is_empty());
        cache.put("x".into(), Arc::new(1));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let (cache, _) = cache(0, None);
        cache.put("a".into(), Arc::new(1));
        assert_eq!(cache.capacity(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<BoundedCache<String, u32>>();
    }
}
