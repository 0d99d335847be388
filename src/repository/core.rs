use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::builder::RepositoryBuilder;
use super::fetcher::QueryFetcher;
use super::metrics::{RepositoryMetrics, RepositoryMetricsSnapshot};
use crate::backend::{AggregationResults, SearchBackend, SearchHit, SearchRequest, StoredDocument};
use crate::cache::CacheCoordinator;
use crate::clock::SharedClock;
use crate::config::RepositoryConfig;
use crate::document::{Capabilities, Document};
use crate::errors::{RepoError, Result};
use crate::notify::{ChangeNotifier, EventHub, ModifiedDocument};
use crate::paging::{FindHit, FindResults, Page};
use crate::query::{CommandOptions, CompiledQuery, FieldCondition, RepositoryQuery, compile_query};
use crate::types::{DocumentId, IdGenerator};

pub(crate) type Validator<T> = Arc<dyn Fn(&T) -> std::result::Result<(), String> + Send + Sync>;
pub(crate) type DerivedKeys<T> = Arc<dyn Fn(&ModifiedDocument<T>) -> Vec<String> + Send + Sync>;

pub(crate) struct Inner<T: Document> {
    pub index: String,
    pub backend: Arc<dyn SearchBackend>,
    pub cache: CacheCoordinator,
    pub notifier: ChangeNotifier<T>,
    pub clock: SharedClock,
    pub id_generator: IdGenerator,
    pub config: RepositoryConfig,
    pub caps: Capabilities,
    pub system_conditions: Vec<FieldCondition>,
    pub validator: Option<Validator<T>>,
    pub derived_keys: Option<DerivedKeys<T>>,
    pub metrics: RepositoryMetrics,
}

/// A page as stored under an explicit query cache key.
#[derive(Serialize, Deserialize)]
struct CachedPage {
    total: u64,
    hits: Vec<SearchHit>,
    has_more: bool,
    aggregations: AggregationResults,
}

impl<T: Document> Inner<T> {
    /// Typed document from a stored source; the backend's id and version win.
    pub fn decode(&self, id: &DocumentId, version: u64, source: serde_json::Value) -> Result<T> {
        let mut document: T = serde_json::from_value(source)?;
        if document.id() != Some(id) {
            document.set_id(id.clone());
        }
        if self.caps.versioned {
            document.set_version(version);
        }
        Ok(document)
    }

    pub fn decode_stored(&self, stored: StoredDocument) -> Result<T> {
        self.decode(&stored.id, stored.version, stored.source)
    }

    pub fn decode_hit(&self, hit: SearchHit) -> Result<FindHit<T>> {
        let document = self.decode(&hit.id, hit.version, hit.source)?;
        Ok(FindHit { id: hit.id, document, score: hit.score, version: Some(hit.version) })
    }

    pub fn decode_hits(&self, hits: Vec<SearchHit>) -> Result<Vec<FindHit<T>>> {
        hits.into_iter().map(|h| self.decode_hit(h)).collect()
    }

    pub fn compile(&self, query: &impl RepositoryQuery, options: &CommandOptions) -> Result<CompiledQuery> {
        let parts = query.parts();
        parts.check_limits()?;
        Ok(compile_query(parts, options, &self.caps, &self.system_conditions))
    }

    pub fn note_backend_error<R>(&self, result: Result<R>) -> Result<R> {
        if result.as_ref().is_err_and(RepoError::is_transient) {
            RepositoryMetrics::add(&self.metrics.backend_errors, 1);
        }
        result
    }

    pub async fn search_page(&self, query: &CompiledQuery, page: u32, limit: u32) -> Result<Page<T>> {
        let request = SearchRequest {
            query: query.clone(),
            offset: (page.saturating_sub(1) as usize).saturating_mul(limit as usize),
            limit: limit as usize + 1,
        };
        let backend = &self.backend;
        let index = self.index.as_str();
        let request = &request;
        let response = self
            .note_backend_error(self.config.retry.run("search", move || backend.search(index, request)).await)?;
        let mut hits = response.hits;
        let has_more = hits.len() > limit as usize;
        hits.truncate(limit as usize);
        Ok(Page {
            hits: self.decode_hits(hits)?,
            total: response.total,
            aggregations: response.aggregations,
            has_more,
            cursor_id: None,
        })
    }

    pub async fn get_stored(&self, ids: &[DocumentId]) -> Result<HashMap<DocumentId, StoredDocument>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let backend = &self.backend;
        let index = self.index.as_str();
        let stored = self
            .note_backend_error(self.config.retry.run("get_by_ids", move || backend.get_by_ids(index, ids)).await)?;
        Ok(stored.into_iter().map(|s| (s.id.clone(), s)).collect())
    }
}

/// Typed CRUD and search over one backend index.
pub struct Repository<T: Document> {
    pub(super) inner: Arc<Inner<T>>,
}

impl<T: Document> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T: Document> Repository<T> {
    pub fn builder(index: impl Into<String>, backend: Arc<dyn SearchBackend>) -> RepositoryBuilder<T> {
        RepositoryBuilder::new(index.into(), backend)
    }

    pub(super) fn from_inner(inner: Inner<T>) -> Self {
        Self { inner: Arc::new(inner) }
    }

    #[must_use]
    pub fn index(&self) -> &str {
        &self.inner.index
    }

    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.inner.caps
    }

    #[must_use]
    pub fn config(&self) -> &RepositoryConfig {
        &self.inner.config
    }

    /// Local subscribers for this repository's events.
    #[must_use]
    pub fn events(&self) -> &EventHub<T> {
        self.inner.notifier.hub()
    }

    #[must_use]
    pub fn cache(&self) -> &CacheCoordinator {
        &self.inner.cache
    }

    pub fn metrics_snapshot(&self) -> RepositoryMetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Writes the current counters to the metrics log target.
    pub fn log_metrics(&self) {
        let snapshot = self.metrics_snapshot();
        match serde_json::to_string(&snapshot) {
            Ok(json) => log::info!(target: crate::utils::logger::METRICS_TARGET, "{}: {json}", self.inner.index),
            Err(e) => log::warn!("metrics snapshot for '{}' not serializable: {e}", self.inner.index),
        }
    }

    fn cache_ttl(&self, options: &CommandOptions) -> Result<Duration> {
        options.cache_ttl(self.inner.clock.now(), self.inner.cache.default_ttl())
    }

    /// Looks a document up by id, regardless of soft-delete state.
    ///
    /// # Errors
    /// Backend faults after retries; `InvalidOptions` for a past expiration.
    pub async fn get_by_id(&self, id: &DocumentId, options: &CommandOptions) -> Result<Option<T>> {
        let inner = &self.inner;
        RepositoryMetrics::add(&inner.metrics.reads, 1);
        let use_cache = options.should_use_cache() && inner.cache.is_enabled();
        let ttl = if use_cache { Some(self.cache_ttl(options)?) } else { None };
        if use_cache {
            if let Some(hit) = inner.cache.get_document::<T>(id).await {
                RepositoryMetrics::add(&inner.metrics.cache_hits, 1);
                return Ok(Some(hit));
            }
            RepositoryMetrics::add(&inner.metrics.cache_misses, 1);
        }

        let backend = &inner.backend;
        let index = inner.index.as_str();
        let stored = inner.note_backend_error(inner.config.retry.run("get_by_id", move || backend.get_by_id(index, id)).await)?;
        let Some(stored) = stored else {
            return Ok(None);
        };
        let document = inner.decode_stored(stored)?;
        if let Some(ttl) = ttl {
            inner.cache.set_document(id, &document, ttl).await;
        }
        Ok(Some(document))
    }

    /// Documents for `ids` in request order; missing ids are skipped.
    ///
    /// # Errors
    /// See [`Repository::get_by_id`].
    pub async fn get_by_ids(&self, ids: &[DocumentId], options: &CommandOptions) -> Result<Vec<T>> {
        let inner = &self.inner;
        let mut unique: Vec<DocumentId> = Vec::with_capacity(ids.len());
        for id in ids {
            if !unique.contains(id) {
                unique.push(id.clone());
            }
        }
        if unique.len() > crate::query::MAX_IDS {
            return Err(RepoError::InvalidOptions(format!("at most {} ids per lookup", crate::query::MAX_IDS)));
        }
        RepositoryMetrics::add(&inner.metrics.reads, unique.len() as u64);

        let use_cache = options.should_use_cache() && inner.cache.is_enabled();
        let ttl = if use_cache { Some(self.cache_ttl(options)?) } else { None };
        let mut found: HashMap<DocumentId, T> = HashMap::new();
        let mut misses = Vec::new();
        for id in &unique {
            let cached = if use_cache { inner.cache.get_document::<T>(id).await } else { None };
            match cached {
                Some(doc) => {
                    RepositoryMetrics::add(&inner.metrics.cache_hits, 1);
                    found.insert(id.clone(), doc);
                }
                None => misses.push(id.clone()),
            }
        }
        if use_cache {
            RepositoryMetrics::add(&inner.metrics.cache_misses, misses.len() as u64);
        }

        for (id, stored) in inner.get_stored(&misses).await? {
            let document = inner.decode_stored(stored)?;
            if let Some(ttl) = ttl {
                inner.cache.set_document(&id, &document, ttl).await;
            }
            found.insert(id, document);
        }
        Ok(unique.iter().filter_map(|id| found.remove(id)).collect())
    }

    /// # Errors
    /// Backend faults after retries.
    pub async fn exists(&self, id: &DocumentId) -> Result<bool> {
        Ok(self.get_by_id(id, &CommandOptions::default()).await?.is_some())
    }

    /// # Errors
    /// `InvalidOptions` for inconsistent options; backend faults after retries.
    pub async fn count(&self, query: &impl RepositoryQuery, options: &CommandOptions) -> Result<u64> {
        let inner = &self.inner;
        let now = inner.clock.now();
        options.validate_for_query(now)?;
        let compiled = inner.compile(query, options)?;
        inner.notifier.before_query(&compiled);
        RepositoryMetrics::add(&inner.metrics.queries, 1);

        let cache_key = options.cache_key.as_deref().filter(|_| inner.cache.is_enabled());
        if let Some(key) = cache_key
            && let Some(total) = inner.cache.get_query::<u64>(key).await
        {
            RepositoryMetrics::add(&inner.metrics.cache_hits, 1);
            return Ok(total);
        }
        let backend = &inner.backend;
        let index = inner.index.as_str();
        let compiled = &compiled;
        let total = inner.note_backend_error(inner.config.retry.run("count", move || backend.count(index, compiled)).await)?;
        if let Some(key) = cache_key {
            let ttl = self.cache_ttl(options)?;
            inner.cache.set_query(key, &total, ttl).await;
        }
        Ok(total)
    }

    /// Runs a query and returns its first page with a continuation.
    ///
    /// With snapshot paging a server-side cursor is opened (or continued when
    /// `snapshot_id` is set); otherwise pages are read by offset. An explicit
    /// cache key caches the requested offset page under that key, its page
    /// number and its limit.
    ///
    /// # Errors
    /// `InvalidOptions` for inconsistent options, `AsyncQueryNotFound` for an
    /// expired snapshot id, backend faults after retries.
    pub async fn find(&self, query: &impl RepositoryQuery, options: &CommandOptions) -> Result<FindResults<T>> {
        let inner = &self.inner;
        options.validate_for_query(inner.clock.now())?;
        let compiled = inner.compile(query, options)?;
        inner.notifier.before_query(&compiled);
        RepositoryMetrics::add(&inner.metrics.queries, 1);
        let limit = options.effective_limit(inner.config.default_page_limit);

        if options.snapshot_paging {
            return self.find_snapshot(compiled, options, limit).await;
        }

        let page = options.effective_page();
        let cache_key = options
            .cache_key
            .as_deref()
            .filter(|_| inner.cache.is_enabled())
            .map(|key| CacheCoordinator::page_key(key, page, limit));
        let fetcher = Arc::new(QueryFetcher::new(
            Arc::clone(&self.inner),
            compiled.clone(),
            inner.config.snapshot_lifetime(),
            limit,
        ));

        if let Some(key) = &cache_key
            && let Some(cached) = inner.cache.get_query::<CachedPage>(key).await
        {
            RepositoryMetrics::add(&inner.metrics.cache_hits, 1);
            let first = Page {
                hits: inner.decode_hits(cached.hits)?,
                total: cached.total,
                aggregations: cached.aggregations,
                has_more: cached.has_more,
                cursor_id: None,
            };
            return Ok(FindResults::offset(first, page, limit, fetcher));
        }

        let first = inner.search_page(&compiled, page, limit).await?;
        if let Some(key) = &cache_key {
            RepositoryMetrics::add(&inner.metrics.cache_misses, 1);
            let ttl = self.cache_ttl(options)?;
            let hits = first
                .hits
                .iter()
                .map(|h| {
                    Ok(SearchHit {
                        id: h.id.clone(),
                        version: h.version.unwrap_or_default(),
                        score: h.score,
                        source: serde_json::to_value(&h.document)?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let cached = CachedPage { total: first.total, hits, has_more: first.has_more, aggregations: first.aggregations.clone() };
            inner.cache.set_query(key, &cached, ttl).await;
        }
        Ok(FindResults::offset(first, page, limit, fetcher))
    }

    async fn find_snapshot(&self, compiled: CompiledQuery, options: &CommandOptions, limit: u32) -> Result<FindResults<T>> {
        let inner = &self.inner;
        let lifetime = options.snapshot_lifetime.unwrap_or_else(|| inner.config.snapshot_lifetime());
        let fetcher = Arc::new(QueryFetcher::new(Arc::clone(&self.inner), compiled.clone(), lifetime, limit));
        let page = match &options.snapshot_id {
            Some(cursor_id) => inner.note_backend_error(inner.backend.advance_cursor(cursor_id, lifetime).await)?,
            None => inner.note_backend_error(inner.backend.open_cursor(&inner.index, &compiled, limit as usize, lifetime).await)?,
        };
        let cursor_id = page.cursor_id.clone();
        let first = Page {
            has_more: snapshot_has_more(page.hits.len(), limit, page.hits.len() as u64, page.total),
            hits: inner.decode_hits(page.hits)?,
            total: page.total,
            aggregations: page.aggregations,
            cursor_id: Some(page.cursor_id),
        };
        let exhausted = !first.has_more;
        let results = FindResults::snapshot(first, cursor_id.clone(), fetcher);
        if exhausted {
            if let Err(e) = inner.backend.close_cursor(&cursor_id).await {
                log::debug!("closing exhausted cursor {cursor_id} failed: {e}");
            }
        }
        Ok(results)
    }

    /// First match, if any.
    ///
    /// # Errors
    /// See [`Repository::find`].
    pub async fn find_one(&self, query: &impl RepositoryQuery, options: &CommandOptions) -> Result<Option<T>> {
        let options = CommandOptions { snapshot_paging: false, snapshot_id: None, ..options.clone() }.page_limit(1);
        let results = self.find(query, &options).await?;
        Ok(results.into_documents().into_iter().next())
    }
}

/// A snapshot page continues while it came back full and the cursor has not
/// handed out `total` hits yet. A continued cursor undercounts `seen`, which
/// costs at most one empty page.
pub(super) fn snapshot_has_more(returned: usize, page_size: u32, seen: u64, total: u64) -> bool {
    returned > 0 && returned >= page_size as usize && seen < total
}
