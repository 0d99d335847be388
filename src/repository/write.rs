use std::collections::HashMap;

use super::concurrency::{check_version, expected_version, outcome_error, written_version};
use super::core::{Inner, Repository, snapshot_has_more};
use super::metrics::RepositoryMetrics;
use crate::backend::{SearchHit, StoredDocument, WriteOp, WriteOutcome};
use crate::document::{Document, DocumentExt};
use crate::errors::{RepoError, Result};
use crate::notify::ModifiedDocument;
use crate::query::{CommandOptions, CompiledQuery, RepositoryQuery};
use crate::types::{ChangeType, DocumentId};
use crate::utils::logger::AUDIT_TARGET;

/// Who hears about a committed write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum Announce {
    Quiet,
    /// Local subscribers only; the caller publishes one bulk signal afterwards.
    Local,
    Everywhere,
}

/// Walks every match of a query through a snapshot cursor, one batch at a time.
pub(super) struct Scan<'a, T: Document> {
    inner: &'a Inner<T>,
    query: CompiledQuery,
    batch: u32,
    cursor_id: Option<String>,
    seen: u64,
    done: bool,
}

impl<'a, T: Document> Scan<'a, T> {
    pub fn new(inner: &'a Inner<T>, query: CompiledQuery, batch: usize) -> Self {
        let batch = u32::try_from(batch.max(1)).unwrap_or(u32::MAX);
        Self { inner, query, batch, cursor_id: None, seen: 0, done: false }
    }

    pub async fn next_batch(&mut self) -> Result<Option<Vec<SearchHit>>> {
        if self.done {
            return Ok(None);
        }
        let inner = self.inner;
        let lifetime = inner.config.snapshot_lifetime();
        let page = match &self.cursor_id {
            None => inner.backend.open_cursor(&inner.index, &self.query, self.batch as usize, lifetime).await,
            Some(id) => inner.backend.advance_cursor(id, lifetime).await,
        };
        let page = inner.note_backend_error(page)?;
        self.seen += page.hits.len() as u64;
        if !snapshot_has_more(page.hits.len(), self.batch, self.seen, page.total) {
            self.done = true;
            if let Err(e) = inner.backend.close_cursor(&page.cursor_id).await {
                log::debug!("closing scan cursor {} failed: {e}", page.cursor_id);
            }
        }
        self.cursor_id = Some(page.cursor_id);
        Ok(if page.hits.is_empty() { None } else { Some(page.hits) })
    }
}

impl<T: Document> Repository<T> {
    pub(super) fn notifications(&self, options: &CommandOptions) -> bool {
        options.notifications_enabled(self.inner.config.notifications)
    }

    pub(super) fn announce(&self, options: &CommandOptions, bulk: bool) -> Announce {
        match (self.notifications(options), bulk) {
            (false, _) => Announce::Quiet,
            (true, true) => Announce::Local,
            (true, false) => Announce::Everywhere,
        }
    }

    /// Whether writes must read stored originals first. Originals only travel
    /// in local events, so without subscribers they are not loaded.
    pub(super) fn wants_originals(&self, options: &CommandOptions) -> bool {
        let local = self.notifications(options)
            && options.originals_enabled()
            && self.inner.notifier.hub().has_change_subscribers();
        local || self.inner.derived_keys.is_some()
    }

    pub(super) fn validate(&self, document: &T, options: &CommandOptions) -> Result<()> {
        if options.skip_validation {
            return Ok(());
        }
        match &self.inner.validator {
            Some(validator) => validator(document).map_err(RepoError::DocumentValidation),
            None => Ok(()),
        }
    }

    /// Pairs per-item outcomes with their documents. Successful items get the
    /// backend's version; the first failure is handed back for the caller.
    pub(super) fn settle(
        &self,
        modified: Vec<ModifiedDocument<T>>,
        outcomes: &[WriteOutcome],
    ) -> (Vec<ModifiedDocument<T>>, Option<RepoError>) {
        let metrics = &self.inner.metrics;
        if outcomes.len() != modified.len() {
            log::warn!(
                "backend returned {} outcomes for {} operations on '{}'",
                outcomes.len(),
                modified.len(),
                self.inner.index
            );
        }
        let mut succeeded = Vec::with_capacity(modified.len());
        let mut first_error = None;
        for (mut m, outcome) in modified.into_iter().zip(outcomes) {
            match outcome_error(outcome) {
                None => {
                    if let Some(version) = written_version(outcome)
                        && self.inner.caps.versioned
                    {
                        m.value.set_version(version);
                    }
                    succeeded.push(m);
                }
                Some(e) => {
                    if e.is_version_conflict() {
                        RepositoryMetrics::add(&metrics.version_conflicts, 1);
                    }
                    log::debug!("write to '{}' rejected: {e}", self.inner.index);
                    first_error.get_or_insert(e);
                }
            }
        }
        (succeeded, first_error)
    }

    /// Invalidation, then local events, then the bus.
    pub(super) async fn after_write(&self, change_type: ChangeType, modified: Vec<ModifiedDocument<T>>, announce: Announce) {
        if modified.is_empty() {
            return;
        }
        let inner = &self.inner;
        let derived: Vec<String> = match &inner.derived_keys {
            Some(keys) => modified.iter().flat_map(|m| keys(m)).collect(),
            None => Vec::new(),
        };
        let ids: Vec<DocumentId> = modified.iter().filter_map(|m| m.value.id().cloned()).collect();
        inner.cache.invalidate(&ids, &derived).await;
        log::info!(target: AUDIT_TARGET, "{change_type} {} document(s) in '{}'", ids.len(), inner.index);
        crate::devtrace!("{{\"write\":\"{change_type}\",\"index\":\"{}\",\"count\":{}}}", inner.index, ids.len());
        match announce {
            Announce::Everywhere => inner.notifier.documents_changed(change_type, modified).await,
            Announce::Local => inner.notifier.documents_changed_locally(change_type, modified),
            Announce::Quiet => {}
        }
    }

    /// Adds one document, assigning an id when it has none.
    ///
    /// # Errors
    /// `DocumentValidation`, `DuplicateDocument`, or a backend fault.
    pub async fn add(&self, document: T, options: &CommandOptions) -> Result<T> {
        let mut added = self.add_many(vec![document], options).await?;
        added.pop().ok_or_else(|| RepoError::Repository("backend returned no outcome".into()))
    }

    /// # Errors
    /// Any item failure after the successful items were committed and
    /// announced; validation failures before anything is written.
    pub async fn add_many(&self, documents: Vec<T>, options: &CommandOptions) -> Result<Vec<T>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let inner = &self.inner;
        let now = inner.clock.now();
        let mut modified = Vec::with_capacity(documents.len());
        let mut ops = Vec::with_capacity(documents.len());
        for mut document in documents {
            if document.id().is_none() {
                document.set_id((inner.id_generator)());
            }
            if inner.caps.created_field.is_some() && document.created_utc().is_none() {
                document.set_created_utc(now);
            }
            if inner.caps.updated_field.is_some() {
                document.set_updated_utc(now);
            }
            if inner.caps.versioned {
                document.set_version(1);
            }
            self.validate(&document, options)?;
            ops.push(WriteOp::Add { id: document.require_id()?.clone(), source: serde_json::to_value(&document)? });
            modified.push(ModifiedDocument::added(document));
        }

        let notify = self.notifications(options);
        if notify {
            inner.notifier.before_write(ChangeType::Added, &modified);
        }
        let outcomes = inner.note_backend_error(inner.backend.bulk_write(&inner.index, ops).await)?;
        let (written, error) = self.settle(modified, &outcomes);
        RepositoryMetrics::add(&inner.metrics.documents_written, written.len() as u64);
        let values = written.iter().map(|m| m.value.clone()).collect();
        self.after_write(ChangeType::Added, written, self.announce(options, false)).await;
        match error {
            Some(e) => Err(e),
            None => Ok(values),
        }
    }

    /// Replaces a stored document, enforcing its version when the type is versioned.
    ///
    /// # Errors
    /// `VersionConflict`, `DocumentNotFound`, `DocumentValidation`, or a backend fault.
    pub async fn save(&self, document: T, options: &CommandOptions) -> Result<T> {
        let mut saved = self.save_many(vec![document], options).await?;
        saved.pop().ok_or_else(|| RepoError::Repository("backend returned no outcome".into()))
    }

    /// # Errors
    /// See [`Repository::save`]. Version checks run before anything is written.
    pub async fn save_many(&self, documents: Vec<T>, options: &CommandOptions) -> Result<Vec<T>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let inner = &self.inner;
        let ids = documents.iter().map(|d| d.require_id().cloned()).collect::<Result<Vec<_>>>()?;
        let stored: HashMap<DocumentId, StoredDocument> =
            if inner.caps.versioned || self.wants_originals(options) || inner.caps.created_field.is_some() {
                inner.get_stored(&ids).await?
            } else {
                HashMap::new()
            };

        let now = inner.clock.now();
        let mut modified = Vec::with_capacity(documents.len());
        let mut ops = Vec::with_capacity(documents.len());
        for (mut document, id) in documents.into_iter().zip(ids) {
            let current = stored.get(&id);
            if inner.caps.versioned {
                let current = current.ok_or_else(|| RepoError::DocumentNotFound(id.clone()))?;
                if let Err(e) = check_version(&inner.caps, &document, current) {
                    RepositoryMetrics::add(&inner.metrics.version_conflicts, 1);
                    return Err(e);
                }
            }
            let original = current.cloned().map(|s| inner.decode_stored(s)).transpose()?;
            if inner.caps.created_field.is_some()
                && document.created_utc().is_none()
                && let Some(created) = original.as_ref().and_then(Document::created_utc)
            {
                document.set_created_utc(created);
            }
            if inner.caps.updated_field.is_some() {
                document.set_updated_utc(now);
            }
            let expected = expected_version(&inner.caps, &document);
            if let Some(v) = expected {
                document.set_version(v + 1);
            }
            self.validate(&document, options)?;
            ops.push(WriteOp::Update { id, source: serde_json::to_value(&document)?, expected_version: expected });
            modified.push(ModifiedDocument::changed(document, original));
        }

        let notify = self.notifications(options);
        if notify {
            inner.notifier.before_write(ChangeType::Saved, &modified);
        }
        let outcomes = inner.note_backend_error(inner.backend.bulk_write(&inner.index, ops).await)?;
        let (written, error) = self.settle(modified, &outcomes);
        RepositoryMetrics::add(&inner.metrics.documents_written, written.len() as u64);
        let values = written.iter().map(|m| m.value.clone()).collect();
        self.after_write(ChangeType::Saved, written, self.announce(options, false)).await;
        match error {
            Some(e) => Err(e),
            None => Ok(values),
        }
    }

    /// Deletes the given documents, enforcing versions for versioned types.
    ///
    /// # Errors
    /// `VersionConflict`, `DocumentNotFound`, or a backend fault.
    pub async fn remove(&self, documents: &[T], options: &CommandOptions) -> Result<u64> {
        if documents.is_empty() {
            return Ok(0);
        }
        let inner = &self.inner;
        let mut ops = Vec::with_capacity(documents.len());
        let mut modified = Vec::with_capacity(documents.len());
        for document in documents {
            let id = document.require_id()?.clone();
            ops.push(WriteOp::Delete { id, expected_version: expected_version(&inner.caps, document) });
            modified.push(ModifiedDocument::changed(document.clone(), Some(document.clone())));
        }
        let notify = self.notifications(options);
        if notify {
            inner.notifier.before_write(ChangeType::Removed, &modified);
        }
        let outcomes = inner.note_backend_error(inner.backend.bulk_write(&inner.index, ops).await)?;
        let (removed, error) = self.settle(modified, &outcomes);
        let count = removed.len() as u64;
        RepositoryMetrics::add(&inner.metrics.documents_removed, count);
        self.after_write(ChangeType::Removed, removed, self.announce(options, false)).await;
        match error {
            Some(e) => Err(e),
            None => Ok(count),
        }
    }

    /// Deletes by id without a version check. Unknown ids are ignored.
    ///
    /// # Errors
    /// Backend faults.
    pub async fn remove_by_ids(&self, ids: &[DocumentId], options: &CommandOptions) -> Result<u64> {
        let stored = self.inner.get_stored(ids).await?;
        let mut documents = Vec::with_capacity(stored.len());
        for id in ids {
            if let Some(s) = stored.get(id) {
                let mut document = self.inner.decode_stored(s.clone())?;
                if self.inner.caps.versioned {
                    document.set_version(s.version);
                }
                documents.push(document);
            }
        }
        self.remove(&documents, options).await
    }

    /// Flags documents as deleted and saves them.
    ///
    /// # Errors
    /// `InvalidOptions` for types without soft delete; otherwise as [`Repository::save_many`].
    pub async fn soft_delete(&self, documents: Vec<T>, options: &CommandOptions) -> Result<Vec<T>> {
        if !self.inner.caps.supports_soft_delete() {
            return Err(RepoError::InvalidOptions(format!(
                "'{}' documents do not support soft delete",
                self.inner.index
            )));
        }
        let flagged = documents
            .into_iter()
            .map(|mut d| {
                d.set_deleted(true);
                d
            })
            .collect();
        self.save_many(flagged, options).await
    }

    /// Deletes every match of `query`, batch by batch. Returns the number removed.
    ///
    /// Local subscribers see each batch; the bus gets one bulk signal at the end.
    ///
    /// # Errors
    /// Backend faults; already-deleted batches stay deleted.
    pub async fn remove_all(&self, query: &impl RepositoryQuery, options: &CommandOptions) -> Result<u64> {
        let inner = &self.inner;
        let compiled = CompiledQuery { fields: Vec::new(), aggregations: Default::default(), ..inner.compile(query, options)? };
        let notify = self.notifications(options);
        let mut scan = Scan::new(inner, compiled, inner.config.bulk_batch_size);
        let mut total = 0u64;
        let mut failure = None;
        while let Some(hits) = scan.next_batch().await? {
            let mut ops = Vec::with_capacity(hits.len());
            let mut modified = Vec::with_capacity(hits.len());
            for hit in hits {
                ops.push(WriteOp::Delete { id: hit.id.clone(), expected_version: None });
                let document = inner.decode(&hit.id, hit.version, hit.source)?;
                modified.push(ModifiedDocument::changed(document.clone(), Some(document)));
            }
            if notify {
                inner.notifier.before_write(ChangeType::Removed, &modified);
            }
            let outcomes = inner.note_backend_error(inner.backend.bulk_write(&inner.index, ops).await)?;
            let (removed, error) = self.settle(modified, &outcomes);
            total += removed.len() as u64;
            self.after_write(ChangeType::Removed, removed, self.announce(options, true)).await;
            if let Some(e) = error.filter(|e| !e.is_not_found()) {
                failure = Some(e);
                break;
            }
        }
        RepositoryMetrics::add(&inner.metrics.documents_removed, total);
        if total > 0 {
            inner.cache.invalidate_all().await;
            inner.notifier.publish(ChangeType::Removed, Vec::new()).await;
        }
        failure.map_or(Ok(total), Err)
    }
}
