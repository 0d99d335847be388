use serde::{Deserialize, Serialize};

/// How the in-memory cache makes room when full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionMode {
    /// Purge expired entries first, then fall back to least-recently-used.
    #[default]
    TtlFirst,
    LruOnly,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
    pub eviction_mode: EvictionMode,
    /// Upper bound on expired entries dropped per purge pass.
    pub purge_batch: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 4096, eviction_mode: EvictionMode::TtlFirst, purge_batch: 64 }
    }
}
