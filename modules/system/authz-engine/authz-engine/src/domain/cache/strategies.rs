//! Cache-plus-store consistency strategies.
//!
//! Generic building blocks over [`TtlLruCache`] and a [`BackingStore`]:
//!
//! - [`WriteThrough`]: store first, then cache, both before returning.
//! - [`WriteBehind`]: cache now, store later in batches or on a timer.
//! - [`RefreshAhead`]: serve cached values and reload in the background
//!   shortly before they expire.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use authz_engine_sdk::AuthzError;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::ttl_lru::TtlLruCache;
use crate::domain::DomainError;

/// Durable store behind a strategy.
#[async_trait]
pub trait BackingStore<K, V>: Send + Sync {
    /// # Errors
    ///
    /// `StoreUnavailable` on I/O failure.
    async fn load(&self, key: &K) -> Result<Option<V>, AuthzError>;

    /// # Errors
    ///
    /// `StoreUnavailable` on I/O failure.
    async fn store(&self, key: &K, value: &V) -> Result<(), AuthzError>;
}

// ============================================================================
// Write-through
// ============================================================================

pub struct WriteThrough<K: Hash + Eq, V> {
    cache: TtlLruCache<K, V>,
    store: Arc<dyn BackingStore<K, V>>,
}

impl<K, V> WriteThrough<K, V>
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    #[must_use]
    pub fn new(capacity: NonZeroUsize, ttl: Duration, store: Arc<dyn BackingStore<K, V>>) -> Self {
        Self {
            cache: TtlLruCache::new(capacity, ttl),
            store,
        }
    }

    /// Cache first; a miss reads the store and populates the cache.
    ///
    /// # Errors
    ///
    /// Store read failures.
    pub async fn get(&self, key: &K) -> Result<Option<V>, AuthzError> {
        if let Some(v) = self.cache.get(key) {
            return Ok(Some(v));
        }
        let loaded = self.store.load(key).await?;
        if let Some(v) = &loaded {
            self.cache.set(key.clone(), v.clone(), None);
        }
        Ok(loaded)
    }

    /// # Errors
    ///
    /// Store write failures; the cache is left untouched in that case.
    pub async fn set(&self, key: K, value: V) -> Result<(), AuthzError> {
        self.store.store(&key, &value).await?;
        self.cache.set(key, value, None);
        Ok(())
    }

    #[must_use]
    pub fn cache(&self) -> &TtlLruCache<K, V> {
        &self.cache
    }
}

// ============================================================================
// Write-behind
// ============================================================================

struct Flusher {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Writes are acknowledged once cached; the store sees them on the next
/// flush. A flush runs when the queue reaches `max_batch_size` and on every
/// tick of the background timer. Entries whose store write fails go back to
/// the front of the queue unless a newer write of the same key supersedes
/// them.
pub struct WriteBehind<K: Hash + Eq, V> {
    cache: TtlLruCache<K, V>,
    store: Arc<dyn BackingStore<K, V>>,
    queue: Mutex<VecDeque<(K, V)>>,
    flush_lock: tokio::sync::Mutex<()>,
    max_batch_size: usize,
    flush_interval: Duration,
    flusher: Mutex<Option<Flusher>>,
}

impl<K, V> WriteBehind<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(
        capacity: NonZeroUsize,
        ttl: Duration,
        store: Arc<dyn BackingStore<K, V>>,
        max_batch_size: usize,
        flush_interval: Duration,
    ) -> Self {
        Self {
            cache: TtlLruCache::new(capacity, ttl),
            store,
            queue: Mutex::new(VecDeque::new()),
            flush_lock: tokio::sync::Mutex::new(()),
            max_batch_size: max_batch_size.max(1),
            flush_interval,
            flusher: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        self.cache.get(key)
    }

    /// Cache immediately and queue the store write. Store failures are not
    /// reported here; they are retried by later flushes.
    pub async fn set(&self, key: K, value: V) {
        self.cache.set(key.clone(), value.clone(), None);
        let should_flush = {
            let mut queue = self.queue.lock();
            queue.push_back((key, value));
            queue.len() >= self.max_batch_size
        };
        if should_flush {
            self.flush().await;
        }
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.queue.lock().len()
    }

    /// Write every queued entry to the store; returns how many were stored.
    pub async fn flush(&self) -> usize {
        let _serial = self.flush_lock.lock().await;
        let batch: Vec<(K, V)> = self.queue.lock().drain(..).collect();
        if batch.is_empty() {
            return 0;
        }

        let mut stored = 0;
        let mut outcomes = Vec::with_capacity(batch.len());
        for (key, value) in batch {
            let ok = match self.store.store(&key, &value).await {
                Ok(()) => {
                    stored += 1;
                    true
                }
                Err(e) => {
                    debug!(error = %e, "Write-behind store write failed");
                    false
                }
            };
            outcomes.push((key, value, ok));
        }

        let mut queue = self.queue.lock();
        // A failed write is dropped when a later write of the same key exists,
        // either further on in this batch or queued since the batch was taken.
        let mut newer: HashSet<K> = queue.iter().map(|(k, _)| k.clone()).collect();
        let mut requeue = Vec::new();
        for (key, value, ok) in outcomes.into_iter().rev() {
            if !ok && !newer.contains(&key) {
                requeue.push((key.clone(), value));
            }
            newer.insert(key);
        }
        if !requeue.is_empty() {
            warn!(requeued = requeue.len(), "Write-behind flush failed, re-queueing");
            for item in requeue {
                queue.push_front(item);
            }
        }
        stored
    }

    /// Start the periodic flusher.
    ///
    /// # Errors
    ///
    /// `AlreadyRunning` if the flusher was started and not stopped.
    pub fn start(self: &Arc<Self>) -> Result<(), DomainError> {
        let mut slot = self.flusher.lock();
        if slot.is_some() {
            return Err(DomainError::AlreadyRunning("write-behind flusher"));
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let weak: Weak<Self> = Arc::downgrade(self);
        let interval = self.flush_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(this) = weak.upgrade() else { break };
                        this.flush().await;
                    }
                }
            }
        });

        *slot = Some(Flusher { cancel, handle });
        Ok(())
    }

    /// Stop the flusher and drain the queue; returns how many entries the
    /// final flush stored. Safe to call when not started.
    ///
    /// # Errors
    ///
    /// `Internal` if the flusher task panicked.
    pub async fn stop(&self) -> Result<usize, DomainError> {
        let flusher = self.flusher.lock().take();
        if let Some(Flusher { cancel, handle }) = flusher {
            cancel.cancel();
            handle.await?;
        }
        Ok(self.flush().await)
    }
}

// ============================================================================
// Refresh-ahead
// ============================================================================

/// Serves cached values; a hit whose remaining TTL is below
/// `threshold * ttl` schedules one background reload per key while the
/// current value keeps being served. A miss loads synchronously.
pub struct RefreshAhead<K: Hash + Eq, V> {
    cache: TtlLruCache<K, V>,
    store: Arc<dyn BackingStore<K, V>>,
    threshold: f64,
    in_flight: Mutex<HashSet<K>>,
}

impl<K, V> RefreshAhead<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(
        capacity: NonZeroUsize,
        ttl: Duration,
        store: Arc<dyn BackingStore<K, V>>,
        threshold: f64,
    ) -> Self {
        Self {
            cache: TtlLruCache::new(capacity, ttl),
            store,
            threshold,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// # Errors
    ///
    /// Store read failures on a miss.
    pub async fn get(self: &Arc<Self>, key: &K) -> Result<Option<V>, AuthzError> {
        if let Some(entry) = self.cache.get_entry(key) {
            let remaining = entry.remaining_at(Instant::now()).as_secs_f64();
            if remaining < entry.ttl().as_secs_f64() * self.threshold {
                self.schedule_refresh(key.clone());
            }
            return Ok(Some(entry.value));
        }

        let loaded = self.store.load(key).await?;
        if let Some(v) = &loaded {
            self.cache.set(key.clone(), v.clone(), None);
        }
        Ok(loaded)
    }

    /// Write to the store, then the cache.
    ///
    /// # Errors
    ///
    /// Store write failures.
    pub async fn set(&self, key: K, value: V) -> Result<(), AuthzError> {
        self.store.store(&key, &value).await?;
        self.cache.set(key, value, None);
        Ok(())
    }

    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    fn schedule_refresh(self: &Arc<Self>, key: K) {
        if !self.in_flight.lock().insert(key.clone()) {
            return;
        }
        let guard = InFlight {
            owner: Arc::clone(self),
            key,
        };
        tokio::spawn(async move {
            let (this, key) = (&guard.owner, &guard.key);
            match this.store.load(key).await {
                Ok(Some(v)) => this.cache.set(key.clone(), v, None),
                Ok(None) => {
                    this.cache.remove(key);
                }
                Err(e) => warn!(error = %e, "Refresh-ahead reload failed, serving cached value"),
            }
        });
    }
}

/// Releases a key's in-flight mark when the refresh task ends, panics
/// included.
struct InFlight<K: Hash + Eq, V> {
    owner: Arc<RefreshAhead<K, V>>,
    key: K,
}

impl<K: Hash + Eq, V> Drop for InFlight<K, V> {
    fn drop(&mut self) {
        self.owner.in_flight.lock().remove(&self.key);
    }
}
