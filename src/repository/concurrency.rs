//! Optimistic concurrency: the version a caller holds must match the stored one.

use crate::backend::{StoredDocument, WriteOutcome};
use crate::document::{Capabilities, Document};
use crate::errors::{RepoError, Result};

/// Version to send with a write; unversioned types write unconditionally.
pub fn expected_version<T: Document>(caps: &Capabilities, document: &T) -> Option<u64> {
    if caps.versioned { document.version() } else { None }
}

/// Rejects a write whose carried version differs from the stored one.
///
/// # Errors
/// `VersionConflict` on mismatch (including a versioned document carrying no version).
pub fn check_version<T: Document>(caps: &Capabilities, document: &T, stored: &StoredDocument) -> Result<()> {
    if !caps.versioned {
        return Ok(());
    }
    match document.version() {
        Some(v) if v == stored.version => Ok(()),
        carried => Err(RepoError::VersionConflict {
            id: stored.id.clone(),
            expected: carried,
            actual: Some(stored.version),
        }),
    }
}

/// Typed failure for an unsuccessful per-item outcome.
pub fn outcome_error(outcome: &WriteOutcome) -> Option<RepoError> {
    match outcome {
        WriteOutcome::Written { .. } | WriteOutcome::Deleted { .. } => None,
        WriteOutcome::NotFound { id } => Some(RepoError::DocumentNotFound(id.clone())),
        WriteOutcome::Duplicate { id } => Some(RepoError::DuplicateDocument(id.clone())),
        WriteOutcome::VersionConflict { id, expected, actual } => {
            Some(RepoError::VersionConflict { id: id.clone(), expected: *expected, actual: *actual })
        }
        WriteOutcome::Failed { id, message } => Some(RepoError::Repository(format!("{id}: {message}"))),
    }
}

/// Version assigned by a successful write.
pub const fn written_version(outcome: &WriteOutcome) -> Option<u64> {
    match outcome {
        WriteOutcome::Written { version, .. } => Some(*version),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocumentId;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Clone, Serialize, Deserialize)]
    struct Versioned {
        id: Option<DocumentId>,
        version: Option<u64>,
    }

    impl Document for Versioned {
        const CAPABILITIES: Capabilities = Capabilities::NONE.versioned();
        fn id(&self) -> Option<&DocumentId> {
            self.id.as_ref()
        }
        fn set_id(&mut self, id: DocumentId) {
            self.id = Some(id);
        }
        fn version(&self) -> Option<u64> {
            self.version
        }
    }

    fn stored(version: u64) -> StoredDocument {
        StoredDocument { id: "a".into(), version, source: json!({}) }
    }

    #[test]
    fn matching_version_passes() {
        let doc = Versioned { id: Some("a".into()), version: Some(3) };
        assert!(check_version(&Versioned::CAPABILITIES, &doc, &stored(3)).is_ok());
        let err = check_version(&Versioned::CAPABILITIES, &doc, &stored(4)).unwrap_err();
        assert!(matches!(err, RepoError::VersionConflict { expected: Some(3), actual: Some(4), .. }));
    }

    #[test]
    fn unversioned_types_bypass() {
        let doc = Versioned { id: Some("a".into()), version: Some(1) };
        assert!(check_version(&Capabilities::NONE, &doc, &stored(9)).is_ok());
        assert_eq!(expected_version(&Capabilities::NONE, &doc), None);
    }

    #[test]
    fn missing_version_on_versioned_type_conflicts() {
        let doc = Versioned { id: Some("a".into()), version: None };
        assert!(check_version(&Versioned::CAPABILITIES, &doc, &stored(1)).unwrap_err().is_version_conflict());
    }
}
