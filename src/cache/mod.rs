//! Caching: the external [`CacheClient`] contract, an in-process LRU/TTL
//! implementation and the per-repository [`CacheCoordinator`].

mod client;
mod config;
mod coordinator;
mod core;
mod metrics;
mod policy;
mod size;

pub use client::CacheClient;
pub use config::{CacheConfig, EvictionMode};
pub use coordinator::CacheCoordinator;
pub use core::InMemoryCacheClient;
pub use metrics::{CacheMetrics, CacheMetricsSnapshot};
