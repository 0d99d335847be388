use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use super::client::CacheClient;
use super::config::{CacheConfig, EvictionMode};
use super::metrics::{CacheMetrics, CacheMetricsSnapshot};
use super::policy::purge_expired;
use super::size::approximate_entry_size;
use crate::clock::{SharedClock, system_clock};
use crate::query::offset_from;
use crate::errors::{RepoError, Result};

#[derive(Debug, Clone)]
pub(crate) struct CacheEntry {
    pub value: Value,
    pub expires_at: Option<DateTime<Utc>>,
    pub size: usize,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// A thread-safe, in-process [`CacheClient`] with TTL-first + LRU fallback eviction.
///
/// Expiry is checked lazily on access and while making room for inserts, so no
/// background task is needed.
#[derive(Clone)]
pub struct InMemoryCacheClient {
    store: Arc<Mutex<LruCache<String, CacheEntry>>>,
    config: Arc<RwLock<CacheConfig>>,
    metrics: Arc<CacheMetrics>,
    clock: SharedClock,
    fail_next: Arc<AtomicU32>,
}

impl Default for InMemoryCacheClient {
    fn default() -> Self {
        Self::new(CacheConfig::default(), system_clock())
    }
}

fn capacity_of(config: &CacheConfig) -> NonZeroUsize {
    NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN)
}

impl InMemoryCacheClient {
    #[must_use]
    pub fn new(config: CacheConfig, clock: SharedClock) -> Self {
        Self {
            store: Arc::new(Mutex::new(LruCache::new(capacity_of(&config)))),
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(CacheMetrics::default()),
            clock,
            fail_next: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(CacheConfig { capacity, ..Default::default() }, system_clock())
    }

    pub fn metrics_snapshot(&self) -> CacheMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.store.lock().peek(key).is_some_and(|e| !e.is_expired(now))
    }

    pub fn set_eviction_mode(&self, mode: EvictionMode) {
        self.config.write().eviction_mode = mode;
    }

    pub fn set_capacity(&self, capacity: usize) {
        let cap = {
            let mut config = self.config.write();
            config.capacity = capacity.max(1);
            capacity_of(&config)
        };
        let mut store = self.store.lock();
        while store.len() > cap.get() {
            let Some((_, victim)) = store.pop_lru() else { break };
            self.metrics.lru_evictions.fetch_add(1, Ordering::Relaxed);
            self.metrics.release_bytes(victim.size);
        }
        store.resize(cap);
    }

    /// Force a TTL purge now. Returns number evicted.
    pub fn purge_expired_now(&self) -> usize {
        let limit = self.config.read().purge_batch.max(1);
        purge_expired(&mut self.store.lock(), &self.metrics, self.clock.now(), limit)
    }

    /// Makes the next `n` operations fail, to exercise best-effort callers.
    pub fn fail_next_calls(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    fn check_fault(&self) -> Result<()> {
        let injected = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected { Err(RepoError::Cache("injected cache fault".into())) } else { Ok(()) }
    }

    fn make_room(&self, store: &mut LruCache<String, CacheEntry>, now: DateTime<Utc>) {
        if store.len() < store.cap().get() {
            return;
        }
        let (mode, batch) = {
            let config = self.config.read();
            (config.eviction_mode, config.purge_batch.max(1))
        };
        if mode == EvictionMode::TtlFirst && purge_expired(store, &self.metrics, now, batch) > 0 {
            return;
        }
        if let Some((_, victim)) = store.pop_lru() {
            self.metrics.lru_evictions.fetch_add(1, Ordering::Relaxed);
            self.metrics.release_bytes(victim.size);
            crate::devtrace!("{{\"cache\":\"lru_evict\",\"freed_bytes\":{}}}", victim.size);
        }
    }

    fn drop_entry(&self, entry: &CacheEntry) {
        self.metrics.removes.fetch_add(1, Ordering::Relaxed);
        self.metrics.release_bytes(entry.size);
    }
}

#[async_trait]
impl CacheClient for InMemoryCacheClient {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.check_fault()?;
        let now = self.clock.now();
        let mut store = self.store.lock();
        let expired = match store.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => true,
            None => false,
        };
        if expired && let Some(entry) = store.pop(key) {
            self.metrics.ttl_evictions.fetch_add(1, Ordering::Relaxed);
            self.metrics.release_bytes(entry.size);
        }
        self.metrics.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        self.check_fault()?;
        let now = self.clock.now();
        // a ttl past the calendar's end never expires
        let expires_at = ttl.and_then(|ttl| offset_from(now, ttl));
        let size = approximate_entry_size(key, &value);
        let mut store = self.store.lock();
        if let Some(previous) = store.pop(key) {
            self.metrics.release_bytes(previous.size);
        } else {
            self.make_room(&mut store, now);
        }
        store.put(key.to_string(), CacheEntry { value, expires_at, size });
        self.metrics.inserts.fetch_add(1, Ordering::Relaxed);
        self.metrics.memory_bytes.fetch_add(size as u64, Ordering::Relaxed);
        crate::devtrace!("{{\"cache\":\"mem_add\",\"bytes\":{size}}}");
        Ok(())
    }

    async fn remove_all(&self, keys: &[String]) -> Result<u64> {
        self.check_fault()?;
        let mut store = self.store.lock();
        let mut removed = 0u64;
        for key in keys {
            if let Some(entry) = store.pop(key) {
                self.drop_entry(&entry);
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn remove_by_prefix(&self, prefix: &str) -> Result<u64> {
        self.check_fault()?;
        let mut store = self.store.lock();
        let keys: Vec<String> = store.iter().filter(|(k, _)| k.starts_with(prefix)).map(|(k, _)| k.clone()).collect();
        for key in &keys {
            if let Some(entry) = store.pop(key) {
                self.drop_entry(&entry);
            }
        }
        Ok(keys.len() as u64)
    }
}
