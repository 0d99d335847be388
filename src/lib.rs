//! Generic repository layer over a search backend.
//!
//! A [`Repository`] gives typed CRUD, cached reads, composable queries,
//! optimistic concurrency, partial patches and change notification for one
//! backend index. The backend, cache and message bus sit behind traits; the
//! crate ships in-memory implementations of each.

pub mod backend;
pub mod cache;
pub mod clock;
pub mod config;
pub mod document;
pub mod errors;
pub mod expr;
pub mod migration;
pub mod notify;
pub mod paging;
pub mod patch;
pub mod query;
pub mod repository;
pub mod retry;
pub mod types;
pub mod utils;

pub use backend::{InMemoryBackend, SearchBackend};
pub use cache::{CacheClient, InMemoryCacheClient};
pub use clock::{Clock, ManualClock, SharedClock};
pub use config::RepositoryConfig;
pub use document::{Capabilities, Document};
pub use errors::{RepoError, Result};
pub use expr::{parse_aggregations, parse_field_includes};
pub use notify::{InMemoryMessageBus, MessageBus, ModifiedDocument};
pub use paging::FindResults;
pub use patch::{Patch, PatchOperation, ScriptPatch};
pub use query::{CommandOptions, Query};
pub use repository::{Repository, RepositoryBuilder};
pub use types::{ChangeType, DocumentId, SoftDeleteMode};
