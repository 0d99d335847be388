use std::collections::HashSet;
use std::sync::Arc;

use super::store::MigrationStore;
use super::types::{Migration, MigrationContext, MigrationRecord, MigrationReport};
use crate::backend::SearchBackend;
use crate::clock::SharedClock;
use crate::errors::{RepoError, Result};

/// Applies pending migrations for one index in ascending version order.
///
/// The applied version is the highest *completed* record. Anything at or
/// below it is skipped, including a version that failed before a higher one
/// completed. Assumes a single runner per index at a time.
pub struct MigrationRunner {
    store: Arc<dyn MigrationStore>,
    ctx: MigrationContext,
}

impl MigrationRunner {
    pub fn new(
        store: Arc<dyn MigrationStore>,
        backend: Arc<dyn SearchBackend>,
        index: impl Into<String>,
        clock: SharedClock,
    ) -> Self {
        Self { store, ctx: MigrationContext { index: index.into(), backend, clock } }
    }

    /// Highest completed version, `0` when nothing completed.
    ///
    /// # Errors
    /// Store failures.
    pub async fn current_version(&self) -> Result<u32> {
        let records = self.store.records(&self.ctx.index).await?;
        Ok(records.iter().filter(|r| r.is_completed()).map(|r| r.version).max().unwrap_or(0))
    }

    /// # Errors
    /// `Migration` for duplicate versions or a failing migration (the run
    /// stops there, leaving its record started but not completed); store
    /// failures otherwise.
    pub async fn run(&self, migrations: &[Arc<dyn Migration>]) -> Result<MigrationReport> {
        let mut seen = HashSet::new();
        if let Some(dup) = migrations.iter().map(|m| m.version()).find(|v| !seen.insert(*v)) {
            return Err(RepoError::Migration { version: dup, message: "duplicate migration version".into() });
        }

        let starting_version = self.current_version().await?;
        let mut pending: Vec<&Arc<dyn Migration>> =
            migrations.iter().filter(|m| m.version() > starting_version).collect();
        pending.sort_by_key(|m| m.version());

        let index = &self.ctx.index;
        let mut report = MigrationReport { starting_version, applied: Vec::new() };
        for migration in pending {
            let version = migration.version();
            let mut record = MigrationRecord::started(index, version, self.ctx.clock.now());
            self.store.save(&record).await?;
            log::info!("running {} on '{index}'", migration.name());

            if let Err(e) = migration.run(&self.ctx).await {
                log::error!("{} on '{index}' failed: {e}", migration.name());
                return Err(RepoError::Migration { version, message: e.to_string() });
            }

            record.completed_utc = Some(self.ctx.clock.now());
            self.store.save(&record).await?;
            log::info!(target: crate::utils::logger::AUDIT_TARGET, "migration {index}-{version} completed");
            report.applied.push(version);
        }
        Ok(report)
    }
}
