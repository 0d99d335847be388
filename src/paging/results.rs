use std::fmt;
use std::sync::Arc;

use super::fetcher::{FindHit, Page, PageFetcher, PageRequest};
use crate::backend::AggregationResults;
use crate::errors::Result;

/// Page number reported once a result set reaches its terminal state.
pub const TERMINAL_PAGE: u32 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    Offset { limit: u32 },
    Snapshot { cursor_id: String, seen: u64 },
}

/// A page of typed hits plus everything needed to pull the next one.
pub struct FindResults<T> {
    hits: Vec<FindHit<T>>,
    total: u64,
    aggregations: AggregationResults,
    has_more: bool,
    page: u32,
    mode: Mode,
    fetcher: Option<Arc<dyn PageFetcher<T>>>,
}

impl<T> fmt::Debug for FindResults<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FindResults")
            .field("hits", &self.hits.len())
            .field("total", &self.total)
            .field("has_more", &self.has_more)
            .field("page", &self.page)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl<T> FindResults<T> {
    /// A single, complete result set with no continuation.
    pub fn complete(hits: Vec<FindHit<T>>, total: u64, aggregations: AggregationResults) -> Self {
        Self { hits, total, aggregations, has_more: false, page: 1, mode: Mode::Offset { limit: 0 }, fetcher: None }
    }

    pub fn offset(page: Page<T>, number: u32, limit: u32, fetcher: Arc<dyn PageFetcher<T>>) -> Self {
        Self {
            hits: page.hits,
            total: page.total,
            aggregations: page.aggregations,
            has_more: page.has_more,
            page: number,
            mode: Mode::Offset { limit },
            fetcher: Some(fetcher),
        }
    }

    pub fn snapshot(page: Page<T>, cursor_id: String, fetcher: Arc<dyn PageFetcher<T>>) -> Self {
        let seen = page.hits.len() as u64;
        Self {
            hits: page.hits,
            total: page.total,
            aggregations: page.aggregations,
            has_more: page.has_more,
            page: 1,
            mode: Mode::Snapshot { cursor_id, seen },
            fetcher: Some(fetcher),
        }
    }

    /// Total matching documents across all pages.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }

    #[must_use]
    pub fn hits(&self) -> &[FindHit<T>] {
        &self.hits
    }

    pub fn documents(&self) -> impl Iterator<Item = &T> {
        self.hits.iter().map(|h| &h.document)
    }

    #[must_use]
    pub fn into_documents(self) -> Vec<T> {
        self.hits.into_iter().map(|h| h.document).collect()
    }

    #[must_use]
    pub const fn aggregations(&self) -> &AggregationResults {
        &self.aggregations
    }

    #[must_use]
    pub const fn has_more(&self) -> bool {
        self.has_more
    }

    #[must_use]
    pub const fn page(&self) -> u32 {
        self.page
    }

    /// The open snapshot cursor, if this is a snapshot result set.
    #[must_use]
    pub fn cursor_id(&self) -> Option<&str> {
        match &self.mode {
            Mode::Snapshot { cursor_id, .. } => Some(cursor_id),
            Mode::Offset { .. } => None,
        }
    }

    /// Replaces the current page with the next one.
    ///
    /// Returns `Ok(false)` without touching the backend once the set is
    /// exhausted or has no continuation; the page then reads [`TERMINAL_PAGE`].
    ///
    /// # Errors
    /// Propagates fetch failures, including `AsyncQueryNotFound` for an
    /// expired snapshot cursor.
    pub async fn next_page(&mut self) -> Result<bool> {
        let fetcher = match &self.fetcher {
            Some(f) if self.has_more => Arc::clone(f),
            _ => {
                self.has_more = false;
                self.page = TERMINAL_PAGE;
                return Ok(false);
            }
        };
        let request = match &self.mode {
            Mode::Offset { limit } => PageRequest::Offset { page: self.page + 1, limit: *limit },
            Mode::Snapshot { cursor_id, seen } => PageRequest::Snapshot { cursor_id: cursor_id.clone(), seen: *seen },
        };
        let next = fetcher.fetch(request).await?;
        self.page += 1;
        self.total = next.total;
        self.has_more = next.has_more;
        if !next.aggregations.is_empty() {
            self.aggregations = next.aggregations;
        }
        if let Mode::Snapshot { cursor_id, seen } = &mut self.mode {
            *seen += next.hits.len() as u64;
            if let Some(id) = next.cursor_id {
                *cursor_id = id;
            }
            if !self.has_more {
                fetcher.release(cursor_id).await;
            }
        }
        self.hits = next.hits;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Numbers {
        total: u32,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PageFetcher<u32> for Numbers {
        async fn fetch(&self, request: PageRequest) -> Result<Page<u32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let PageRequest::Offset { page, limit } = request else { unreachable!() };
            let start = (page - 1) * limit;
            let hits: Vec<FindHit<u32>> = (start..(start + limit).min(self.total))
                .map(|n| FindHit { id: n.to_string().into(), document: n, score: None, version: None })
                .collect();
            Ok(Page {
                has_more: start + limit < self.total,
                hits,
                total: u64::from(self.total),
                aggregations: AggregationResults::default(),
                cursor_id: None,
            })
        }
    }

    #[tokio::test]
    async fn offset_paging_reaches_idempotent_terminal_state() {
        let fetcher = Arc::new(Numbers { total: 5, calls: AtomicUsize::new(0) });
        let first = fetcher.fetch(PageRequest::Offset { page: 1, limit: 2 }).await.unwrap();
        let mut results = FindResults::offset(first, 1, 2, fetcher.clone());
        assert!(results.next_page().await.unwrap());
        assert_eq!(results.page(), 2);
        assert!(results.next_page().await.unwrap());
        assert_eq!(results.hits().len(), 1);
        assert!(!results.has_more());

        let calls = fetcher.calls.load(Ordering::SeqCst);
        assert!(!results.next_page().await.unwrap());
        assert!(!results.next_page().await.unwrap());
        assert_eq!(results.page(), TERMINAL_PAGE);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn no_continuation_is_terminal() {
        let mut results: FindResults<u32> = FindResults::complete(vec![], 0, AggregationResults::default());
        assert!(!results.next_page().await.unwrap());
        assert_eq!(results.page(), TERMINAL_PAGE);
    }
}
