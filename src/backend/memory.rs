use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use uuid::Uuid;

use super::SearchBackend;
use super::aggregate::aggregate;
use super::types::{
    CursorPage, SearchHit, SearchRequest, SearchResponse, StoredDocument, WriteOp, WriteOutcome,
};
use crate::clock::{SharedClock, system_clock};
use crate::errors::{RepoError, Result};
use crate::patch::ScriptPatch;
use crate::query::eval::{
    compare_docs, eval_condition, eval_date_range, eval_search, get_path, project_fields,
};
use crate::query::{CompiledQuery, CompiledRelation, SearchText, offset_from};
use crate::types::DocumentId;

/// A server-side script: mutate `source` in place using `params`.
pub type ScriptFn = Arc<dyn Fn(&mut Value, &Value) -> std::result::Result<(), String> + Send + Sync>;

type Index = BTreeMap<DocumentId, StoredDocument>;

struct CursorState {
    index: String,
    hits: Vec<SearchHit>,
    position: usize,
    page_size: usize,
    total: u64,
    expires_at: DateTime<Utc>,
}

/// In-process stand-in for a search cluster: named indices, compare-and-swap
/// versions, leased snapshot cursors and registered scripts.
pub struct InMemoryBackend {
    indices: RwLock<HashMap<String, Index>>,
    cursors: Mutex<HashMap<String, CursorState>>,
    scripts: RwLock<HashMap<String, ScriptFn>>,
    clock: SharedClock,
    fail_next: AtomicU32,
    calls: AtomicU64,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new(system_clock())
    }
}

impl InMemoryBackend {
    #[must_use]
    pub fn new(clock: SharedClock) -> Self {
        Self {
            indices: RwLock::new(HashMap::new()),
            cursors: Mutex::new(HashMap::new()),
            scripts: RwLock::new(HashMap::new()),
            clock,
            fail_next: AtomicU32::new(0),
            calls: AtomicU64::new(0),
        }
    }

    pub fn register_script(
        &self,
        name: impl Into<String>,
        script: impl Fn(&mut Value, &Value) -> std::result::Result<(), String> + Send + Sync + 'static,
    ) {
        self.scripts.write().insert(name.into(), Arc::new(script));
    }

    /// Makes the next `n` calls fail with a transport error.
    pub fn fail_next_calls(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Number of backend calls served (including injected failures).
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn document_count(&self, index: &str) -> usize {
        self.indices.read().get(index).map_or(0, BTreeMap::len)
    }

    pub fn open_cursor_count(&self) -> usize {
        self.cursors.lock().len()
    }

    fn enter(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(RepoError::Repository("injected backend fault".into()));
        }
        Ok(())
    }

    fn script(&self, name: &str) -> Result<ScriptFn> {
        self.scripts
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| RepoError::InvalidPatch(format!("unknown script '{name}'")))
    }

    fn run_query(indices: &HashMap<String, Index>, index: &str, query: &CompiledQuery) -> Vec<SearchHit> {
        let Some(docs) = indices.get(index) else {
            return Vec::new();
        };
        let mut hits: Vec<SearchHit> = docs
            .values()
            .filter(|d| matches(indices, d, query))
            .map(|d| SearchHit {
                id: d.id.clone(),
                version: d.version,
                score: query.search.as_ref().map(|s| score(&d.source, s)),
                source: d.source.clone(),
            })
            .collect();
        if query.sort.is_empty() {
            if query.search.is_some() {
                hits.sort_by(|a, b| b.score.unwrap_or(0.0).total_cmp(&a.score.unwrap_or(0.0)));
            }
        } else {
            hits.sort_by(|a, b| compare_docs(&a.source, &b.source, &query.sort));
        }
        hits
    }
}

fn matches(indices: &HashMap<String, Index>, doc: &StoredDocument, q: &CompiledQuery) -> bool {
    if !q.ids.is_empty() && !q.ids.contains(&doc.id) {
        return false;
    }
    if q.excluded_ids.contains(&doc.id) {
        return false;
    }
    if !q.conditions.iter().all(|c| eval_condition(&doc.source, c)) {
        return false;
    }
    if !q.date_ranges.iter().all(|r| eval_date_range(&doc.source, r)) {
        return false;
    }
    if let Some(search) = &q.search
        && !eval_search(&doc.source, search)
    {
        return false;
    }
    q.relations.iter().all(|r| relation_holds(indices, doc, r))
}

fn relation_holds(indices: &HashMap<String, Index>, doc: &StoredDocument, relation: &CompiledRelation) -> bool {
    match relation {
        CompiledRelation::HasParent { index, parent_field, query } => {
            let Some(parent_id) = get_path(&doc.source, parent_field).and_then(Value::as_str) else {
                return false;
            };
            indices
                .get(index)
                .and_then(|parents| parents.get(&DocumentId::from(parent_id)))
                .is_some_and(|p| matches(indices, p, query))
        }
        CompiledRelation::HasChild { index, parent_field, query } => indices.get(index).is_some_and(|children| {
            children.values().any(|c| {
                get_path(&c.source, parent_field).and_then(Value::as_str) == Some(doc.id.as_str())
                    && matches(indices, c, query)
            })
        }),
    }
}

fn score(source: &Value, search: &SearchText) -> f64 {
    search
        .text
        .split_whitespace()
        .filter(|t| eval_search(source, &SearchText { text: (*t).to_string(), default_operator: search.default_operator }))
        .count() as f64
}

fn project(mut hits: Vec<SearchHit>, fields: &[String]) -> Vec<SearchHit> {
    if !fields.is_empty() {
        for h in &mut hits {
            h.source = project_fields(&h.source, fields);
        }
    }
    hits
}

/// Lease end for a cursor; spans past the calendar's end are capped there.
fn lease_until(now: DateTime<Utc>, lifetime: Duration) -> DateTime<Utc> {
    offset_from(now, lifetime).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[async_trait]
impl SearchBackend for InMemoryBackend {
    async fn get_by_id(&self, index: &str, id: &DocumentId) -> Result<Option<StoredDocument>> {
        self.enter()?;
        Ok(self.indices.read().get(index).and_then(|docs| docs.get(id)).cloned())
    }

    async fn get_by_ids(&self, index: &str, ids: &[DocumentId]) -> Result<Vec<StoredDocument>> {
        self.enter()?;
        let indices = self.indices.read();
        let Some(docs) = indices.get(index) else {
            return Ok(Vec::new());
        };
        Ok(ids.iter().filter_map(|id| docs.get(id)).cloned().collect())
    }

    async fn search(&self, index: &str, request: &SearchRequest) -> Result<SearchResponse> {
        self.enter()?;
        let indices = self.indices.read();
        let hits = Self::run_query(&indices, index, &request.query);
        let total = hits.len() as u64;
        let aggregations = if request.query.aggregations.is_empty() {
            Default::default()
        } else {
            let sources: Vec<&Value> = hits.iter().map(|h| &h.source).collect();
            aggregate(&sources, &request.query.aggregations)
        };
        let page: Vec<SearchHit> = hits.into_iter().skip(request.offset).take(request.limit).collect();
        Ok(SearchResponse { hits: project(page, &request.query.fields), total, aggregations })
    }

    async fn count(&self, index: &str, query: &CompiledQuery) -> Result<u64> {
        self.enter()?;
        let indices = self.indices.read();
        Ok(Self::run_query(&indices, index, query).len() as u64)
    }

    async fn bulk_write(&self, index: &str, ops: Vec<WriteOp>) -> Result<Vec<WriteOutcome>> {
        self.enter()?;
        let mut indices = self.indices.write();
        let docs = indices.entry(index.to_string()).or_default();
        let outcomes = ops
            .into_iter()
            .map(|op| match op {
                WriteOp::Add { id, source } => {
                    if docs.contains_key(&id) {
                        return WriteOutcome::Duplicate { id };
                    }
                    docs.insert(id.clone(), StoredDocument { id: id.clone(), version: 1, source });
                    WriteOutcome::Written { id, version: 1 }
                }
                WriteOp::Update { id, source, expected_version } => match docs.get_mut(&id) {
                    None => WriteOutcome::NotFound { id },
                    Some(stored) if expected_version.is_some_and(|v| v != stored.version) => {
                        WriteOutcome::VersionConflict { id, expected: expected_version, actual: Some(stored.version) }
                    }
                    Some(stored) => {
                        stored.version += 1;
                        stored.source = source;
                        WriteOutcome::Written { id, version: stored.version }
                    }
                },
                WriteOp::Delete { id, expected_version } => match docs.get(&id) {
                    None => WriteOutcome::NotFound { id },
                    Some(stored) if expected_version.is_some_and(|v| v != stored.version) => {
                        WriteOutcome::VersionConflict { id, expected: expected_version, actual: Some(stored.version) }
                    }
                    Some(_) => {
                        docs.remove(&id);
                        WriteOutcome::Deleted { id }
                    }
                },
            })
            .collect();
        Ok(outcomes)
    }

    async fn open_cursor(
        &self,
        index: &str,
        query: &CompiledQuery,
        page_size: usize,
        lifetime: Duration,
    ) -> Result<CursorPage> {
        self.enter()?;
        let (hits, aggregations) = {
            let indices = self.indices.read();
            let hits = Self::run_query(&indices, index, query);
            let aggs = if query.aggregations.is_empty() {
                Default::default()
            } else {
                let sources: Vec<&Value> = hits.iter().map(|h| &h.source).collect();
                aggregate(&sources, &query.aggregations)
            };
            (project(hits, &query.fields), aggs)
        };
        let cursor_id = Uuid::new_v4().simple().to_string();
        let page_size = page_size.max(1);
        let total = hits.len() as u64;
        let first: Vec<SearchHit> = hits.iter().take(page_size).cloned().collect();
        self.cursors.lock().insert(
            cursor_id.clone(),
            CursorState {
                index: index.to_string(),
                position: first.len(),
                hits,
                page_size,
                total,
                expires_at: lease_until(self.clock.now(), lifetime),
            },
        );
        log::debug!("opened snapshot cursor {cursor_id} on '{index}' ({total} hits)");
        Ok(CursorPage { cursor_id, hits: first, total, aggregations })
    }

    async fn advance_cursor(&self, cursor_id: &str, lifetime: Duration) -> Result<CursorPage> {
        self.enter()?;
        let now = self.clock.now();
        let mut cursors = self.cursors.lock();
        let expired = cursors.get(cursor_id).is_none_or(|c| c.expires_at < now);
        if expired {
            cursors.remove(cursor_id);
            return Err(RepoError::AsyncQueryNotFound(cursor_id.to_string()));
        }
        let Some(state) = cursors.get_mut(cursor_id) else {
            return Err(RepoError::AsyncQueryNotFound(cursor_id.to_string()));
        };
        let page: Vec<SearchHit> = state.hits.iter().skip(state.position).take(state.page_size).cloned().collect();
        state.position += page.len();
        state.expires_at = lease_until(now, lifetime);
        log::trace!("advanced cursor {cursor_id} on '{}' to {}", state.index, state.position);
        Ok(CursorPage { cursor_id: cursor_id.to_string(), hits: page, total: state.total, aggregations: Default::default() })
    }

    async fn close_cursor(&self, cursor_id: &str) -> Result<()> {
        self.enter()?;
        self.cursors.lock().remove(cursor_id);
        Ok(())
    }

    async fn execute_script(
        &self,
        index: &str,
        ids: &[DocumentId],
        script: &ScriptPatch,
    ) -> Result<Vec<WriteOutcome>> {
        self.enter()?;
        let f = self.script(&script.script)?;
        let mut indices = self.indices.write();
        let docs = indices.entry(index.to_string()).or_default();
        let outcomes = ids
            .iter()
            .map(|id| match docs.get_mut(id) {
                None => WriteOutcome::NotFound { id: id.clone() },
                Some(stored) => {
                    let mut next = stored.source.clone();
                    match f(&mut next, &script.params) {
                        Ok(()) => {
                            stored.source = next;
                            stored.version += 1;
                            WriteOutcome::Written { id: id.clone(), version: stored.version }
                        }
                        Err(message) => WriteOutcome::Failed { id: id.clone(), message },
                    }
                }
            })
            .collect();
        Ok(outcomes)
    }

    async fn execute_script_by_query(
        &self,
        index: &str,
        query: &CompiledQuery,
        script: &ScriptPatch,
    ) -> Result<u64> {
        self.enter()?;
        let f = self.script(&script.script)?;
        let mut indices = self.indices.write();
        let ids: Vec<DocumentId> = Self::run_query(&indices, index, query).into_iter().map(|h| h.id).collect();
        let Some(docs) = indices.get_mut(index) else {
            return Ok(0);
        };
        let mut modified = 0u64;
        for id in ids {
            if let Some(stored) = docs.get_mut(&id) {
                let mut next = stored.source.clone();
                if f(&mut next, &script.params).is_ok() {
                    stored.source = next;
                    stored.version += 1;
                    modified += 1;
                }
            }
        }
        Ok(modified)
    }
}
