//! Capacity-bounded LRU cache with per-entry TTL.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::Duration;

use authz_engine_sdk::CacheStats;
use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;

/// Longest TTL an entry can carry; larger requests are clamped.
pub const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub created_at: Instant,
    pub expires_at: Instant,
}

impl<V> CacheEntry<V> {
    /// Expired strictly after `expires_at`.
    #[must_use]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at < now
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.expires_at.saturating_duration_since(self.created_at)
    }

    #[must_use]
    pub fn remaining_at(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }
}

struct Inner<K: Hash + Eq, V> {
    entries: LruCache<K, CacheEntry<V>>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// LRU ordered map guarded by a single lock. Every get and set mutates
/// recency, so reads take the lock exclusively too.
///
/// Expired entries are dropped lazily when looked up.
pub struct TtlLruCache<K: Hash + Eq, V> {
    inner: Mutex<Inner<K, V>>,
    default_ttl: Duration,
}

impl<K, V> TtlLruCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    #[must_use]
    pub fn new(capacity: NonZeroUsize, default_ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            default_ttl,
        }
    }

    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// A hit promotes the entry to most recently used. An expired entry is
    /// removed and reported as a miss.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        self.get_entry(key).map(|e| e.value)
    }

    /// Like [`get`](Self::get), but returns the expiry bookkeeping as well.
    #[must_use]
    pub fn get_entry(&self, key: &K) -> Option<CacheEntry<V>> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let now = Instant::now();
        match inner.entries.get(key) {
            Some(entry) if !entry.is_expired_at(now) => {
                let entry = entry.clone();
                inner.hits += 1;
                Some(entry)
            }
            Some(_) => {
                inner.entries.pop(key);
                inner.misses += 1;
                None
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Insert or replace; at capacity the least recently used entry goes.
    pub fn set(&self, key: K, value: V, ttl: Option<Duration>) {
        let now = Instant::now();
        let entry = CacheEntry {
            value,
            created_at: now,
            expires_at: now + ttl.unwrap_or(self.default_ttl).min(MAX_TTL),
        };
        let mut inner = self.inner.lock();
        if let Some((old_key, _)) = inner.entries.push(key.clone(), entry)
            && old_key != key
        {
            inner.evictions += 1;
        }
    }

    pub fn remove(&self, key: &K) -> bool {
        self.inner.lock().entries.pop(key).is_some()
    }

    /// Removes every entry whose key satisfies `pred`; returns the count.
    pub fn remove_where<F>(&self, pred: F) -> usize
    where
        F: Fn(&K) -> bool,
    {
        let mut inner = self.inner.lock();
        let doomed: Vec<K> = inner
            .entries
            .iter()
            .filter(|(k, _)| pred(k))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            inner.entries.pop(key);
        }
        doomed.len()
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let lookups = inner.hits + inner.misses;
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            size: inner.entries.len(),
            evictions: inner.evictions,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                inner.hits as f64 / lookups as f64
            },
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn cache(capacity: usize) -> TtlLruCache<String, u32> {
        TtlLruCache::new(NonZeroUsize::new(capacity).unwrap(), Duration::from_secs(60))
    }

    fn key(i: u32) -> String {
        format!("k{i}")
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_ttl_is_clamped() {
        let c = cache(2);
        c.set(key(0), 0, Some(Duration::MAX));
        let entry = c.get_entry(&key(0)).unwrap();
        assert_eq!(entry.ttl(), MAX_TTL);
    }

    #[tokio::test(start_paused = true)]
    async fn overflow_evicts_least_recently_used() {
        let c = cache(3);
        for i in 0..3 {
            c.set(key(i), i, None);
        }
        c.set(key(3), 3, None);

        assert_eq!(c.len(), 3);
        assert_eq!(c.get(&key(0)), None);
        assert_eq!(c.get(&key(1)), Some(1));
        assert_eq!(c.stats().evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn get_protects_from_eviction() {
        let c = cache(3);
        for i in 0..3 {
            c.set(key(i), i, None);
        }
        assert_eq!(c.get(&key(0)), Some(0));
        c.set(key(3), 3, None);

        assert_eq!(c.get(&key(0)), Some(0));
        assert_eq!(c.get(&key(1)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn replacing_a_key_is_not_an_eviction() {
        let c = cache(2);
        c.set(key(0), 0, None);
        c.set(key(0), 10, None);
        assert_eq!(c.get(&key(0)), Some(10));
        assert_eq!(c.stats().evictions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_a_miss_and_removed() {
        let c = cache(4);
        c.set(key(0), 0, Some(Duration::from_secs(5)));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(c.get(&key(0)), Some(0), "still valid at exactly expires_at");

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(c.get(&key(0)), None);
        assert_eq!(c.len(), 0);

        let stats = c.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn remove_where_counts_removed() {
        let c = cache(8);
        for i in 0..6 {
            c.set(key(i), i, None);
        }
        let removed = c.remove_where(|k| k.ends_with('1') || k.ends_with('2'));
        assert_eq!(removed, 2);
        assert_eq!(c.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn entry_reports_remaining_ttl() {
        let c = cache(2);
        c.set(key(0), 0, Some(Duration::from_secs(10)));
        tokio::time::advance(Duration::from_secs(4)).await;

        let entry = c.get_entry(&key(0)).unwrap();
        assert_eq!(entry.ttl(), Duration::from_secs(10));
        assert_eq!(entry.remaining_at(Instant::now()), Duration::from_secs(6));
    }
}
