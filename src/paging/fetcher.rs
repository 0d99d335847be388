use async_trait::async_trait;

use crate::backend::AggregationResults;
use crate::errors::Result;
use crate::types::DocumentId;

#[derive(Debug, Clone, PartialEq)]
pub struct FindHit<T> {
    pub id: DocumentId,
    pub document: T,
    pub score: Option<f64>,
    pub version: Option<u64>,
}

/// What the continuation is asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRequest {
    Offset { page: u32, limit: u32 },
    /// `seen` counts hits already handed out through this cursor.
    Snapshot { cursor_id: String, seen: u64 },
}

/// One fetched page as produced by a [`PageFetcher`].
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub hits: Vec<FindHit<T>>,
    pub total: u64,
    pub aggregations: AggregationResults,
    pub has_more: bool,
    pub cursor_id: Option<String>,
}

/// The "fetch next page" continuation captured by a result set.
#[async_trait]
pub trait PageFetcher<T>: Send + Sync {
    async fn fetch(&self, request: PageRequest) -> Result<Page<T>>;

    /// Releases a server-side cursor. Best-effort.
    async fn release(&self, _cursor_id: &str) {}
}
