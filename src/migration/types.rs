use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::backend::SearchBackend;
use crate::clock::SharedClock;
use crate::errors::Result;

/// Persisted progress of one migration, keyed `{index}-{version}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub id: String,
    pub index: String,
    pub version: u32,
    pub started_utc: DateTime<Utc>,
    /// `None` marks a migration that started but never finished.
    pub completed_utc: Option<DateTime<Utc>>,
}

impl MigrationRecord {
    #[must_use]
    pub fn key(index: &str, version: u32) -> String {
        format!("{index}-{version}")
    }

    pub fn started(index: &str, version: u32, at: DateTime<Utc>) -> Self {
        Self { id: Self::key(index, version), index: index.to_string(), version, started_utc: at, completed_utc: None }
    }

    #[must_use]
    pub const fn is_completed(&self) -> bool {
        self.completed_utc.is_some()
    }
}

/// Handed to each migration while it runs.
#[derive(Clone)]
pub struct MigrationContext {
    pub index: String,
    pub backend: Arc<dyn SearchBackend>,
    pub clock: SharedClock,
}

/// A versioned, one-shot data migration.
#[async_trait]
pub trait Migration: Send + Sync {
    fn version(&self) -> u32;

    fn name(&self) -> String {
        format!("migration v{}", self.version())
    }

    async fn run(&self, ctx: &MigrationContext) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Highest completed version before this run.
    pub starting_version: u32,
    pub applied: Vec<u32>,
}

impl MigrationReport {
    #[must_use]
    pub fn current_version(&self) -> u32 {
        self.applied.last().copied().unwrap_or(self.starting_version)
    }
}
