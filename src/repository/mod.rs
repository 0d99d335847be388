//! Typed repository over a [`SearchBackend`](crate::backend::SearchBackend):
//! cached reads, paged queries, versioned writes, patches and change events.

mod builder;
pub mod concurrency;
mod core;
mod fetcher;
mod metrics;
mod patching;
mod write;

pub use builder::RepositoryBuilder;
pub use core::Repository;
pub use metrics::{RepositoryMetrics, RepositoryMetricsSnapshot};
