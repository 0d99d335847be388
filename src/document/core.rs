use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::types::Capabilities;
use crate::types::DocumentId;

/// A typed record the repository can store.
///
/// Only `id`/`set_id` are required. Types opt into concurrency, timestamps and
/// soft delete by overriding [`Document::CAPABILITIES`] together with the
/// matching accessors.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const CAPABILITIES: Capabilities = Capabilities::NONE;

    fn id(&self) -> Option<&DocumentId>;

    fn set_id(&mut self, id: DocumentId);

    fn version(&self) -> Option<u64> {
        None
    }

    fn set_version(&mut self, _version: u64) {}

    fn created_utc(&self) -> Option<DateTime<Utc>> {
        None
    }

    fn set_created_utc(&mut self, _at: DateTime<Utc>) {}

    fn updated_utc(&self) -> Option<DateTime<Utc>> {
        None
    }

    fn set_updated_utc(&mut self, _at: DateTime<Utc>) {}

    fn is_deleted(&self) -> bool {
        false
    }

    fn set_deleted(&mut self, _deleted: bool) {}
}

/// Convenience helpers over [`Document`].
pub trait DocumentExt: Document {
    /// Id, or a validation error naming the type when absent.
    fn require_id(&self) -> crate::errors::Result<&DocumentId> {
        self.id().ok_or_else(|| {
            crate::errors::RepoError::DocumentValidation(format!(
                "{} has no id",
                std::any::type_name::<Self>()
            ))
        })
    }
}

impl<T: Document> DocumentExt for T {}
