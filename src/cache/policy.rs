use chrono::{DateTime, Utc};
use lru::LruCache;
use std::sync::atomic::Ordering;

use super::core::CacheEntry;
use super::metrics::CacheMetrics;

/// Drops up to `limit` expired entries. Returns the number evicted.
pub fn purge_expired(
    store: &mut LruCache<String, CacheEntry>,
    metrics: &CacheMetrics,
    now: DateTime<Utc>,
    limit: usize,
) -> usize {
    let expired: Vec<String> = store
        .iter()
        .filter(|(_, entry)| entry.is_expired(now))
        .map(|(key, _)| key.clone())
        .take(limit)
        .collect();

    let mut freed_bytes = 0usize;
    for key in &expired {
        if let Some(entry) = store.pop(key) {
            metrics.release_bytes(entry.size);
            freed_bytes += entry.size;
        }
    }
    let count = expired.len();
    if count > 0 {
        metrics.ttl_evictions.fetch_add(count as u64, Ordering::Relaxed);
        crate::devtrace!("{{\"cache\":\"ttl_purge\",\"evicted\":{count},\"freed_bytes\":{freed_bytes}}}");
    }
    count
}
