use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::core::{Inner, snapshot_has_more};
use crate::document::Document;
use crate::errors::Result;
use crate::paging::{Page, PageFetcher, PageRequest};
use crate::query::CompiledQuery;

/// Continuation captured by [`crate::paging::FindResults`] for repository queries.
pub(crate) struct QueryFetcher<T: Document> {
    inner: Arc<Inner<T>>,
    query: CompiledQuery,
    lifetime: Duration,
    page_size: u32,
}

impl<T: Document> QueryFetcher<T> {
    pub fn new(inner: Arc<Inner<T>>, query: CompiledQuery, lifetime: Duration, page_size: u32) -> Self {
        Self { inner, query, lifetime, page_size }
    }
}

#[async_trait]
impl<T: Document> PageFetcher<T> for QueryFetcher<T> {
    async fn fetch(&self, request: PageRequest) -> Result<Page<T>> {
        match request {
            PageRequest::Offset { page, limit } => self.inner.search_page(&self.query, page, limit).await,
            PageRequest::Snapshot { cursor_id, seen } => {
                let page = self.inner.note_backend_error(self.inner.backend.advance_cursor(&cursor_id, self.lifetime).await)?;
                let returned = page.hits.len();
                Ok(Page {
                    has_more: snapshot_has_more(returned, self.page_size, seen + returned as u64, page.total),
                    hits: self.inner.decode_hits(page.hits)?,
                    total: page.total,
                    aggregations: page.aggregations,
                    cursor_id: Some(page.cursor_id),
                })
            }
        }
    }

    async fn release(&self, cursor_id: &str) {
        if let Err(e) = self.inner.backend.close_cursor(cursor_id).await {
            log::debug!("closing cursor {cursor_id} on '{}' failed: {e}", self.inner.index);
        }
    }
}
