//! The search backend seam. Query execution, ranking and storage live behind
//! [`SearchBackend`]; [`InMemoryBackend`] implements it for tests and embedded use.

mod aggregate;
mod memory;
mod types;

use async_trait::async_trait;
use std::time::Duration;

use crate::errors::Result;
use crate::patch::ScriptPatch;
use crate::query::CompiledQuery;
use crate::types::DocumentId;

pub use memory::{InMemoryBackend, ScriptFn};
pub use types::{
    Aggregate, AggregationResults, Bucket, CursorPage, NamedAggregate, SearchHit, SearchRequest,
    SearchResponse, StoredDocument, WriteOp, WriteOutcome,
};

#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn get_by_id(&self, index: &str, id: &DocumentId) -> Result<Option<StoredDocument>>;

    /// Missing ids are left out of the result.
    async fn get_by_ids(&self, index: &str, ids: &[DocumentId]) -> Result<Vec<StoredDocument>>;

    async fn search(&self, index: &str, request: &SearchRequest) -> Result<SearchResponse>;

    async fn count(&self, index: &str, query: &CompiledQuery) -> Result<u64>;

    /// Applies each op independently; one outcome per op, in order.
    async fn bulk_write(&self, index: &str, ops: Vec<WriteOp>) -> Result<Vec<WriteOutcome>>;

    /// Opens a snapshot cursor leased for `lifetime` and returns its first page.
    async fn open_cursor(
        &self,
        index: &str,
        query: &CompiledQuery,
        page_size: usize,
        lifetime: Duration,
    ) -> Result<CursorPage>;

    /// Next page of an open cursor, renewing its lease.
    ///
    /// Fails with `AsyncQueryNotFound` once the cursor expired or was closed.
    async fn advance_cursor(&self, cursor_id: &str, lifetime: Duration) -> Result<CursorPage>;

    async fn close_cursor(&self, cursor_id: &str) -> Result<()>;

    /// Runs a script against each id atomically, bumping versions.
    async fn execute_script(
        &self,
        index: &str,
        ids: &[DocumentId],
        script: &ScriptPatch,
    ) -> Result<Vec<WriteOutcome>>;

    /// Runs a script against every matching document; returns the modified count.
    async fn execute_script_by_query(
        &self,
        index: &str,
        query: &CompiledQuery,
        script: &ScriptPatch,
    ) -> Result<u64>;
}
