//! Sequential, versioned one-shot migrations with persisted progress.

mod runner;
mod store;
mod types;

pub use runner::MigrationRunner;
pub use store::{BackendMigrationStore, InMemoryMigrationStore, MigrationStore};
pub use types::{Migration, MigrationContext, MigrationRecord, MigrationReport};
