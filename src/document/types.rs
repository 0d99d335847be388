use serde::Serialize;

/// Capability fields a document type declares. Read once when a repository is
/// built; the repository never reads a value for fields it did not declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    /// Optimistic concurrency applies.
    pub versioned: bool,
    /// Source field holding the creation timestamp.
    pub created_field: Option<&'static str>,
    /// Source field holding the last-update timestamp.
    pub updated_field: Option<&'static str>,
    /// Source field holding the soft-delete flag.
    pub soft_delete_field: Option<&'static str>,
}

impl Capabilities {
    pub const NONE: Self =
        Self { versioned: false, created_field: None, updated_field: None, soft_delete_field: None };

    #[must_use]
    pub const fn versioned(mut self) -> Self {
        self.versioned = true;
        self
    }

    #[must_use]
    pub const fn dated(mut self, created: &'static str, updated: &'static str) -> Self {
        self.created_field = Some(created);
        self.updated_field = Some(updated);
        self
    }

    #[must_use]
    pub const fn soft_deletes(mut self, field: &'static str) -> Self {
        self.soft_delete_field = Some(field);
        self
    }

    #[must_use]
    pub const fn supports_soft_delete(&self) -> bool {
        self.soft_delete_field.is_some()
    }

    #[must_use]
    pub const fn supports_dates(&self) -> bool {
        self.created_field.is_some() || self.updated_field.is_some()
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::NONE
    }
}
