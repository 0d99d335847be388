use thiserror::Error;

use crate::expr::ExpressionError;
use crate::types::DocumentId;

pub type Result<T, E = RepoError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Document not found: {0}")]
    DocumentNotFound(DocumentId),

    #[error("Document validation failed: {0}")]
    DocumentValidation(String),

    #[error("Duplicate document: {0}")]
    DuplicateDocument(DocumentId),

    #[error("Version conflict on {id}: expected {expected:?}, stored {actual:?}")]
    VersionConflict { id: DocumentId, expected: Option<u64>, actual: Option<u64> },

    #[error("Snapshot cursor not found or expired: {0}")]
    AsyncQueryNotFound(String),

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("Invalid expression: {0}")]
    InvalidExpression(#[from] ExpressionError),

    #[error("Patch test failed at '{path}'")]
    PatchTestFailed { path: String },

    #[error("Invalid patch: {0}")]
    InvalidPatch(String),

    #[error("Migration {version} failed: {message}")]
    Migration { version: u32, message: String },

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Message bus error: {0}")]
    MessageBus(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serde JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl RepoError {
    /// Backend or transport faults that a bounded retry may clear.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Repository(_))
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::DocumentNotFound(_))
    }

    #[must_use]
    pub const fn is_version_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}
