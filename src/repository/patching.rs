use std::collections::HashMap;

use super::concurrency::outcome_error;
use super::core::Repository;
use super::metrics::RepositoryMetrics;
use super::write::{Announce, Scan};
use crate::backend::{StoredDocument, WriteOp};
use crate::document::Document;
use crate::errors::{RepoError, Result};
use crate::notify::ModifiedDocument;
use crate::patch::{Patch, ScriptPatch, apply, merge};
use crate::query::{CommandOptions, CompiledQuery, RepositoryQuery};
use crate::types::{ChangeType, DocumentId};
use crate::utils::logger::AUDIT_TARGET;

impl<T: Document> Repository<T> {
    /// Applies `patch` to each id. Returns the number of documents modified.
    ///
    /// Operation and partial patches are computed for every id before
    /// anything is written, so a failing `test` leaves every document as it
    /// was. Writes then go out in `bulk_batch_size` chunks. Script patches run
    /// on the backend chunk by chunk.
    ///
    /// # Errors
    /// `DocumentNotFound` for an unknown id, `PatchTestFailed` or `InvalidPatch`
    /// from the patch, `VersionConflict` when a concurrent write won, backend faults.
    pub async fn patch(&self, ids: &[DocumentId], patch: &Patch, options: &CommandOptions) -> Result<u64> {
        self.patch_ids(ids, patch, options, false).await
    }

    async fn patch_ids(&self, ids: &[DocumentId], patch: &Patch, options: &CommandOptions, bulk: bool) -> Result<u64> {
        let announce = self.announce(options, bulk);
        let mut unique: Vec<DocumentId> = Vec::with_capacity(ids.len());
        for id in ids {
            if !unique.contains(id) {
                unique.push(id.clone());
            }
        }
        if unique.is_empty() {
            return Ok(0);
        }
        let batch = self.inner.config.bulk_batch_size.max(1);
        let mut total = 0;
        match patch {
            Patch::Script(script) => {
                for chunk in unique.chunks(batch) {
                    total += self.patch_with_script(chunk, script, options, announce).await?;
                }
            }
            Patch::Operations(_) | Patch::Partial(_) => {
                let mut prepared = Vec::new();
                for chunk in unique.chunks(batch) {
                    prepared.push(self.prepare_patch(chunk, patch, options).await?);
                }
                for (ops, modified) in prepared {
                    total += self.write_patched(ops, modified, options, announce).await?;
                }
            }
        }
        RepositoryMetrics::add(&self.inner.metrics.documents_patched, total);
        Ok(total)
    }

    /// Patches every match of `query`.
    ///
    /// A script patch with notifications off runs as a single backend
    /// update-by-query. Anything else is read through a snapshot and patched
    /// batch by batch, with local subscribers seeing each batch. Either way the
    /// whole cache scope is dropped and one bulk signal goes out on the bus.
    ///
    /// # Errors
    /// As [`Repository::patch`]; batches already written stay written.
    pub async fn patch_all(&self, query: &impl RepositoryQuery, patch: &Patch, options: &CommandOptions) -> Result<u64> {
        let inner = &self.inner;
        let compiled = inner.compile(query, options)?;
        let notify = self.notifications(options);

        if let Patch::Script(script) = patch
            && !notify
            && inner.derived_keys.is_none()
        {
            let modified = inner
                .note_backend_error(inner.backend.execute_script_by_query(&inner.index, &compiled, script).await)?;
            inner.cache.invalidate_all().await;
            inner.notifier.publish(ChangeType::Saved, Vec::new()).await;
            RepositoryMetrics::add(&inner.metrics.documents_patched, modified);
            log::info!(target: AUDIT_TARGET, "script-patched {modified} document(s) in '{}' by query", inner.index);
            return Ok(modified);
        }

        let ids_only = CompiledQuery { fields: vec!["id".into()], aggregations: Default::default(), ..compiled };
        let mut scan = Scan::new(inner, ids_only, inner.config.bulk_batch_size);
        let mut total = 0;
        while let Some(hits) = scan.next_batch().await? {
            let ids: Vec<DocumentId> = hits.into_iter().map(|h| h.id).collect();
            total += self.patch_ids(&ids, patch, options, true).await?;
        }
        if total > 0 {
            inner.cache.invalidate_all().await;
            inner.notifier.publish(ChangeType::Saved, Vec::new()).await;
        }
        Ok(total)
    }

    /// Patched sources for `ids`, without writing anything.
    async fn prepare_patch(
        &self,
        ids: &[DocumentId],
        patch: &Patch,
        options: &CommandOptions,
    ) -> Result<(Vec<WriteOp>, Vec<ModifiedDocument<T>>)> {
        let inner = &self.inner;
        let stored = inner.get_stored(ids).await?;
        let now = inner.clock.now();
        let mut modified = Vec::with_capacity(ids.len());
        let mut ops = Vec::with_capacity(ids.len());
        for id in ids {
            let current = stored.get(id).ok_or_else(|| RepoError::DocumentNotFound(id.clone()))?;
            let mut source = current.source.clone();
            match patch {
                Patch::Operations(operations) => apply(&mut source, operations)?,
                Patch::Partial(partial) => merge(&mut source, partial),
                Patch::Script(_) => return Err(RepoError::InvalidPatch("script patches run on the backend".into())),
            }
            let mut document: T = serde_json::from_value(source)
                .map_err(|e| RepoError::InvalidPatch(format!("patched document {id} no longer decodes: {e}")))?;
            if let Some(patched_id) = document.id()
                && patched_id != id
            {
                return Err(RepoError::InvalidPatch(format!("patch may not change id {id} to {patched_id}")));
            }
            document.set_id(id.clone());
            let original = inner.decode_stored(current.clone())?;
            if inner.caps.updated_field.is_some() {
                document.set_updated_utc(now);
            }
            if inner.caps.created_field.is_some()
                && document.created_utc().is_none()
                && let Some(created) = original.created_utc()
            {
                document.set_created_utc(created);
            }
            let expected = inner.caps.versioned.then_some(current.version);
            if let Some(v) = expected {
                document.set_version(v + 1);
            }
            self.validate(&document, options)?;
            ops.push(WriteOp::Update { id: id.clone(), source: serde_json::to_value(&document)?, expected_version: expected });
            modified.push(ModifiedDocument::changed(document, Some(original)));
        }
        Ok((ops, modified))
    }

    async fn write_patched(
        &self,
        ops: Vec<WriteOp>,
        modified: Vec<ModifiedDocument<T>>,
        options: &CommandOptions,
        announce: Announce,
    ) -> Result<u64> {
        let inner = &self.inner;
        if self.notifications(options) {
            inner.notifier.before_write(ChangeType::Saved, &modified);
        }
        let outcomes = inner.note_backend_error(inner.backend.bulk_write(&inner.index, ops).await)?;
        let (written, error) = self.settle(modified, &outcomes);
        let count = written.len() as u64;
        self.after_write(ChangeType::Saved, written, announce).await;
        match error {
            Some(e) => Err(e),
            None => Ok(count),
        }
    }

    async fn patch_with_script(
        &self,
        ids: &[DocumentId],
        script: &ScriptPatch,
        options: &CommandOptions,
        announce: Announce,
    ) -> Result<u64> {
        let inner = &self.inner;
        let notify = self.notifications(options);
        let originals: HashMap<DocumentId, StoredDocument> =
            if self.wants_originals(options) { inner.get_stored(ids).await? } else { HashMap::new() };
        if notify && !originals.is_empty() {
            let before = originals
                .values()
                .map(|s| inner.decode_stored(s.clone()).map(|d| ModifiedDocument::changed(d.clone(), Some(d))))
                .collect::<Result<Vec<_>>>()?;
            inner.notifier.before_write(ChangeType::Saved, &before);
        }

        let outcomes = inner.note_backend_error(inner.backend.execute_script(&inner.index, ids, script).await)?;
        let mut first_error = None;
        let mut written = Vec::with_capacity(outcomes.len());
        for outcome in &outcomes {
            match outcome_error(outcome) {
                None => written.push(outcome.id().clone()),
                Some(RepoError::Repository(message)) => {
                    first_error.get_or_insert(RepoError::InvalidPatch(message));
                }
                Some(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        let changed = if notify || inner.derived_keys.is_some() || inner.cache.is_enabled() {
            let updated = inner.get_stored(&written).await?;
            let mut changed = Vec::with_capacity(written.len());
            for id in &written {
                let value = match updated.get(id) {
                    Some(s) => inner.decode_stored(s.clone())?,
                    None => continue,
                };
                let original = originals.get(id).cloned().map(|s| inner.decode_stored(s)).transpose()?;
                changed.push(ModifiedDocument::changed(value, original));
            }
            changed
        } else {
            Vec::new()
        };
        if changed.len() < written.len() {
            inner.cache.invalidate(&written, &[]).await;
        }
        self.after_write(ChangeType::Saved, changed, announce).await;

        match first_error {
            Some(e) => Err(e),
            None => Ok(written.len() as u64),
        }
    }
}
