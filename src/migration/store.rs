use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::types::MigrationRecord;
use crate::backend::{SearchBackend, SearchRequest, WriteOp, WriteOutcome};
use crate::errors::{RepoError, Result};
use crate::query::{CompiledQuery, FieldCondition};

/// Where migration progress is persisted.
#[async_trait]
pub trait MigrationStore: Send + Sync {
    async fn records(&self, index: &str) -> Result<Vec<MigrationRecord>>;

    /// Inserts or replaces the record with the same id.
    async fn save(&self, record: &MigrationRecord) -> Result<()>;
}

#[derive(Default)]
pub struct InMemoryMigrationStore {
    records: Mutex<BTreeMap<String, MigrationRecord>>,
}

impl InMemoryMigrationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MigrationStore for InMemoryMigrationStore {
    async fn records(&self, index: &str) -> Result<Vec<MigrationRecord>> {
        Ok(self.records.lock().values().filter(|r| r.index == index).cloned().collect())
    }

    async fn save(&self, record: &MigrationRecord) -> Result<()> {
        self.records.lock().insert(record.id.clone(), record.clone());
        Ok(())
    }
}

/// Keeps migration records as documents in a backend index.
pub struct BackendMigrationStore {
    backend: Arc<dyn SearchBackend>,
    index: String,
}

impl BackendMigrationStore {
    pub fn new(backend: Arc<dyn SearchBackend>, index: impl Into<String>) -> Self {
        Self { backend, index: index.into() }
    }
}

const MAX_RECORDS: usize = 10_000;

#[async_trait]
impl MigrationStore for BackendMigrationStore {
    async fn records(&self, index: &str) -> Result<Vec<MigrationRecord>> {
        let query = CompiledQuery { conditions: vec![FieldCondition::eq("index", index)], ..Default::default() };
        let response = self
            .backend
            .search(&self.index, &SearchRequest { query, offset: 0, limit: MAX_RECORDS })
            .await?;
        response.hits.into_iter().map(|h| serde_json::from_value(h.source).map_err(RepoError::from)).collect()
    }

    async fn save(&self, record: &MigrationRecord) -> Result<()> {
        let source: Value = serde_json::to_value(record)?;
        let id = record.id.clone().into();
        let update = WriteOp::Update { id: record.id.clone().into(), source: source.clone(), expected_version: None };
        let outcome = match self.backend.bulk_write(&self.index, vec![update]).await?.pop() {
            Some(WriteOutcome::NotFound { .. }) => {
                self.backend.bulk_write(&self.index, vec![WriteOp::Add { id, source }]).await?.pop()
            }
            other => other,
        };
        match outcome {
            Some(o) if o.is_success() => Ok(()),
            other => Err(RepoError::Repository(format!("saving migration record {}: {other:?}", record.id))),
        }
    }
}
