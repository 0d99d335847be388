use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Operation counters for one repository.
#[derive(Default, Debug)]
pub struct RepositoryMetrics {
    pub reads: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub queries: AtomicU64,
    pub documents_written: AtomicU64,
    pub documents_removed: AtomicU64,
    pub documents_patched: AtomicU64,
    pub version_conflicts: AtomicU64,
    pub backend_errors: AtomicU64,
}

impl RepositoryMetrics {
    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RepositoryMetricsSnapshot {
        RepositoryMetricsSnapshot {
            reads: self.reads.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            queries: self.queries.load(Ordering::Relaxed),
            documents_written: self.documents_written.load(Ordering::Relaxed),
            documents_removed: self.documents_removed.load(Ordering::Relaxed),
            documents_patched: self.documents_patched.load(Ordering::Relaxed),
            version_conflicts: self.version_conflicts.load(Ordering::Relaxed),
            backend_errors: self.backend_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RepositoryMetricsSnapshot {
    pub reads: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub queries: u64,
    pub documents_written: u64,
    pub documents_removed: u64,
    pub documents_patched: u64,
    pub version_conflicts: u64,
    pub backend_errors: u64,
}
