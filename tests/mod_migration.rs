use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;

use searchrepo::backend::{InMemoryBackend, SearchBackend, WriteOp};
use searchrepo::clock::{ManualClock, SharedClock};
use searchrepo::errors::{RepoError, Result};
use searchrepo::migration::{
    BackendMigrationStore, InMemoryMigrationStore, Migration, MigrationContext, MigrationRunner, MigrationStore,
};

struct Step {
    version: u32,
    fail: bool,
    log: Arc<Mutex<Vec<u32>>>,
}

#[async_trait]
impl Migration for Step {
    fn version(&self) -> u32 {
        self.version
    }

    async fn run(&self, ctx: &MigrationContext) -> Result<()> {
        if self.fail {
            return Err(RepoError::Repository("boom".into()));
        }
        let id = format!("m{}", self.version);
        ctx.backend
            .bulk_write(&ctx.index, vec![WriteOp::Add { id: id.into(), source: json!({"v": self.version}) }])
            .await?;
        self.log.lock().push(self.version);
        Ok(())
    }
}

fn steps(log: &Arc<Mutex<Vec<u32>>>, versions: &[u32], failing: Option<u32>) -> Vec<Arc<dyn Migration>> {
    versions
        .iter()
        .map(|&version| {
            Arc::new(Step { version, fail: failing == Some(version), log: Arc::clone(log) }) as Arc<dyn Migration>
        })
        .collect()
}

fn runner(store: Arc<dyn MigrationStore>) -> (Arc<InMemoryBackend>, MigrationRunner) {
    let clock: SharedClock = ManualClock::starting_now();
    let backend = Arc::new(InMemoryBackend::new(clock.clone()));
    let runner = MigrationRunner::new(store, backend.clone(), "orders", clock);
    (backend, runner)
}

#[tokio::test]
async fn test_applies_pending_in_version_order_once() {
    let log = Arc::default();
    let (backend, runner) = runner(Arc::new(InMemoryMigrationStore::new()));

    let report = runner.run(&steps(&log, &[3, 1, 2], None)).await.unwrap();
    assert_eq!(report.starting_version, 0);
    assert_eq!(report.applied, vec![1, 2, 3]);
    assert_eq!(*log.lock(), vec![1, 2, 3]);
    assert_eq!(backend.document_count("orders"), 3);

    let again = runner.run(&steps(&log, &[1, 2, 3, 4], None)).await.unwrap();
    assert_eq!(again.applied, vec![4]);
    assert_eq!(again.current_version(), 4);
    assert_eq!(runner.current_version().await.unwrap(), 4);
}

#[tokio::test]
async fn test_failure_stops_the_run_and_is_retried_next_time() {
    let log = Arc::default();
    let store = Arc::new(InMemoryMigrationStore::new());
    let (_, runner) = runner(store.clone());

    let err = runner.run(&steps(&log, &[1, 2, 3], Some(2))).await.unwrap_err();
    assert!(matches!(err, RepoError::Migration { version: 2, .. }));
    assert_eq!(*log.lock(), vec![1]);
    assert_eq!(runner.current_version().await.unwrap(), 1);

    let records = store.records("orders").await.unwrap();
    let failed = records.iter().find(|r| r.version == 2).unwrap();
    assert!(!failed.is_completed());

    let report = runner.run(&steps(&log, &[1, 2, 3], None)).await.unwrap();
    assert_eq!(report.applied, vec![2, 3]);
}

#[tokio::test]
async fn test_duplicate_versions_are_rejected_up_front() {
    let log = Arc::default();
    let (backend, runner) = runner(Arc::new(InMemoryMigrationStore::new()));
    let err = runner.run(&steps(&log, &[1, 2, 2], None)).await.unwrap_err();
    assert!(matches!(err, RepoError::Migration { version: 2, .. }));
    assert_eq!(backend.document_count("orders"), 0);
}

#[tokio::test]
async fn test_backend_store_persists_progress() {
    let clock: SharedClock = ManualClock::starting_now();
    let backend = Arc::new(InMemoryBackend::new(clock.clone()));
    let store: Arc<dyn MigrationStore> = Arc::new(BackendMigrationStore::new(backend.clone(), "migrations"));
    let log = Arc::default();

    let first = MigrationRunner::new(Arc::clone(&store), backend.clone(), "orders", clock.clone());
    first.run(&steps(&log, &[1, 2], None)).await.unwrap();
    assert_eq!(backend.document_count("migrations"), 2);

    let second = MigrationRunner::new(store, backend.clone(), "orders", clock);
    assert_eq!(second.current_version().await.unwrap(), 2);
    let report = second.run(&steps(&log, &[1, 2, 3], None)).await.unwrap();
    assert_eq!(report.applied, vec![3]);

    let stored = backend.get_by_id("migrations", &"orders-3".into()).await.unwrap().unwrap();
    assert_eq!(stored.source["version"], json!(3));
    assert!(stored.version >= 2);
}
