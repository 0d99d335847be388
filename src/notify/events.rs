use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::query::CompiledQuery;
use crate::types::{ChangeType, DocumentId};

/// A document as written, paired with what was stored before (`None` for adds).
#[derive(Debug, Clone, PartialEq)]
pub struct ModifiedDocument<T> {
    pub value: T,
    pub original: Option<T>,
}

impl<T> ModifiedDocument<T> {
    pub const fn added(value: T) -> Self {
        Self { value, original: None }
    }

    pub const fn changed(value: T, original: Option<T>) -> Self {
        Self { value, original }
    }
}

/// Shared, read-only batch of modified documents.
#[derive(Debug, Clone)]
pub struct ChangeBatch<T> {
    change_type: ChangeType,
    documents: Arc<[ModifiedDocument<T>]>,
}

impl<T> ChangeBatch<T> {
    pub fn new(change_type: ChangeType, documents: Vec<ModifiedDocument<T>>) -> Self {
        Self { change_type, documents: documents.into() }
    }

    #[must_use]
    pub const fn change_type(&self) -> ChangeType {
        self.change_type
    }

    #[must_use]
    pub fn documents(&self) -> &[ModifiedDocument<T>] {
        &self.documents
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Raised before the backend mutation; observers cannot cancel it.
pub type BeforeWrite<T> = ChangeBatch<T>;

/// Raised after the mutation and cache invalidation.
pub type DocumentsChanged<T> = ChangeBatch<T>;

#[derive(Debug, Clone, PartialEq)]
pub struct BeforeQuery {
    pub index: String,
    pub query: CompiledQuery,
}

/// Cross-process change signal published to the message bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityChanged {
    pub index: String,
    pub change_type: ChangeType,
    /// Empty when the affected ids are unknown (bulk operations).
    pub ids: Vec<DocumentId>,
}

impl EntityChanged {
    #[must_use]
    pub fn is_bulk(&self) -> bool {
        self.ids.is_empty()
    }
}
