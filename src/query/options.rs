use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{RepoError, Result};
use crate::types::SoftDeleteMode;

/// Largest page a caller may request.
pub const MAX_PAGE_LIMIT: u32 = 10_000;

/// Per-call behaviour switches: caching, soft-delete visibility, paging and
/// notification. Built with chained setters; unset values fall back to the
/// repository configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandOptions {
    pub cache_key: Option<String>,
    pub use_cache: bool,
    pub expires_in: Option<Duration>,
    pub expires_at: Option<DateTime<Utc>>,
    pub soft_delete_mode: Option<SoftDeleteMode>,
    pub page_number: Option<u32>,
    pub page_limit: Option<u32>,
    pub snapshot_paging: bool,
    pub snapshot_id: Option<String>,
    pub snapshot_lifetime: Option<Duration>,
    pub notifications: Option<bool>,
    /// Load stored originals so change events carry before/after pairs.
    pub originals: Option<bool>,
    pub skip_validation: bool,
}

impl CommandOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables caching of this call's result under `key`.
    #[must_use]
    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self.use_cache = true;
        self
    }

    /// Consult and populate the id cache.
    #[must_use]
    pub fn use_cache(mut self) -> Self {
        self.use_cache = true;
        self
    }

    #[must_use]
    pub fn expires_in(mut self, ttl: Duration) -> Self {
        self.expires_in = Some(ttl);
        self.expires_at = None;
        self
    }

    #[must_use]
    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self.expires_in = None;
        self
    }

    #[must_use]
    pub fn soft_delete_mode(mut self, mode: SoftDeleteMode) -> Self {
        self.soft_delete_mode = Some(mode);
        self
    }

    #[must_use]
    pub fn page(mut self, number: u32) -> Self {
        self.page_number = Some(number);
        self
    }

    #[must_use]
    pub fn page_limit(mut self, limit: u32) -> Self {
        self.page_limit = Some(limit);
        self
    }

    #[must_use]
    pub fn snapshot_paging(mut self) -> Self {
        self.snapshot_paging = true;
        self
    }

    /// Continue an existing snapshot cursor.
    #[must_use]
    pub fn snapshot_id(mut self, id: impl Into<String>) -> Self {
        self.snapshot_paging = true;
        self.snapshot_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn snapshot_lifetime(mut self, lifetime: Duration) -> Self {
        self.snapshot_lifetime = Some(lifetime);
        self
    }

    #[must_use]
    pub fn notifications(mut self, enabled: bool) -> Self {
        self.notifications = Some(enabled);
        self
    }

    #[must_use]
    pub fn originals(mut self, enabled: bool) -> Self {
        self.originals = Some(enabled);
        self
    }

    #[must_use]
    pub fn skip_validation(mut self) -> Self {
        self.skip_validation = true;
        self
    }

    #[must_use]
    pub fn notifications_enabled(&self, default: bool) -> bool {
        self.notifications.unwrap_or(default)
    }

    #[must_use]
    pub fn originals_enabled(&self) -> bool {
        self.originals.unwrap_or(true)
    }

    /// Whether this call reads or writes the cache at all.
    #[must_use]
    pub fn should_use_cache(&self) -> bool {
        self.use_cache || self.cache_key.is_some()
    }

    /// Single absolute expiration from `expires_in` / `expires_at`.
    ///
    /// # Errors
    /// `InvalidOptions` when `expires_at` is not in the future.
    pub fn resolve_expiration(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        if let Some(at) = self.expires_at {
            if at <= now {
                return Err(RepoError::InvalidOptions(format!("expires_at {at} is in the past")));
            }
            return Ok(Some(at));
        }
        match self.expires_in {
            Some(ttl) => offset_from(now, ttl).map(Some).ok_or_else(|| {
                RepoError::InvalidOptions(format!("expires_in {ttl:?} is beyond the representable time range"))
            }),
            None => Ok(None),
        }
    }

    /// Time-to-live for a cache write, falling back to `default`.
    ///
    /// # Errors
    /// See [`Self::resolve_expiration`].
    pub fn cache_ttl(&self, now: DateTime<Utc>, default: Duration) -> Result<Duration> {
        Ok(match self.resolve_expiration(now)? {
            Some(at) => (at - now).to_std().unwrap_or(default),
            None => default,
        })
    }

    /// Checks the options make sense for a query (`find`/`count`).
    ///
    /// An expiration without a cache key has nothing to expire and is rejected.
    ///
    /// # Errors
    /// `InvalidOptions` describing the first problem found.
    pub fn validate_for_query(&self, now: DateTime<Utc>) -> Result<()> {
        self.resolve_expiration(now)?;
        if self.cache_key.is_none() && (self.expires_in.is_some() || self.expires_at.is_some()) {
            return Err(RepoError::InvalidOptions("expiration set without a cache key".into()));
        }
        if self.cache_key.as_deref().is_some_and(|k| k.trim().is_empty()) {
            return Err(RepoError::InvalidOptions("cache key is empty".into()));
        }
        if self.page_number == Some(0) {
            return Err(RepoError::InvalidOptions("page numbers start at 1".into()));
        }
        if let Some(limit) = self.page_limit
            && (limit == 0 || limit > MAX_PAGE_LIMIT)
        {
            return Err(RepoError::InvalidOptions(format!(
                "page limit must be between 1 and {MAX_PAGE_LIMIT}"
            )));
        }
        if let Some(lifetime) = self.snapshot_lifetime
            && offset_from(now, lifetime).is_none()
        {
            return Err(RepoError::InvalidOptions(format!(
                "snapshot lifetime {lifetime:?} is beyond the representable time range"
            )));
        }
        if self.snapshot_paging && self.cache_key.is_some() {
            return Err(RepoError::InvalidOptions("snapshot paging results cannot be cached".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn effective_page(&self) -> u32 {
        self.page_number.unwrap_or(1).max(1)
    }

    #[must_use]
    pub fn effective_limit(&self, default: u32) -> u32 {
        self.page_limit.unwrap_or(default).clamp(1, MAX_PAGE_LIMIT)
    }
}

/// `now + span`, or `None` when the instant cannot be represented.
pub(crate) fn offset_from(now: DateTime<Utc>, span: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(span).ok().and_then(|span| now.checked_add_signed(span))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiration_resolves_to_one_instant() {
        let now = Utc::now();
        let o = CommandOptions::new().expires_at(now + chrono::Duration::seconds(30));
        let o = o.expires_in(Duration::from_secs(10));
        assert_eq!(o.resolve_expiration(now).unwrap(), Some(now + chrono::Duration::seconds(10)));
        assert!(o.expires_at.is_none());
    }

    #[test]
    fn past_expires_at_is_rejected() {
        let now = Utc::now();
        let o = CommandOptions::new().cache_key("k").expires_at(now - chrono::Duration::seconds(1));
        assert!(matches!(o.resolve_expiration(now), Err(RepoError::InvalidOptions(_))));
        assert!(o.validate_for_query(now).is_err());
    }

    #[test]
    fn expiration_without_key_is_rejected_for_queries() {
        let now = Utc::now();
        let o = CommandOptions::new().expires_in(Duration::from_secs(5));
        assert!(o.validate_for_query(now).is_err());
        let ok = o.cache_key("by-status");
        assert!(ok.validate_for_query(now).is_ok());
        assert_eq!(ok.cache_ttl(now, Duration::from_secs(60)).unwrap(), Duration::from_secs(5));
    }

    #[test]
    fn unrepresentable_spans_are_invalid_options() {
        let now = Utc::now();
        let huge = Duration::from_secs(10_000_000_000_000);
        let o = CommandOptions::new().cache_key("k").expires_in(huge);
        assert!(matches!(o.resolve_expiration(now), Err(RepoError::InvalidOptions(_))));
        assert!(matches!(o.cache_ttl(now, Duration::from_secs(60)), Err(RepoError::InvalidOptions(_))));
        let snapshot = CommandOptions::new().snapshot_paging().snapshot_lifetime(huge);
        assert!(matches!(snapshot.validate_for_query(now), Err(RepoError::InvalidOptions(_))));
        assert!(CommandOptions::new().snapshot_lifetime(Duration::from_secs(60)).validate_for_query(now).is_ok());
    }

    #[test]
    fn paging_defaults() {
        let o = CommandOptions::new();
        assert_eq!(o.effective_page(), 1);
        assert_eq!(o.effective_limit(10), 10);
        assert_eq!(CommandOptions::new().page_limit(50_000).effective_limit(10), MAX_PAGE_LIMIT);
        assert!(CommandOptions::new().page(0).validate_for_query(Utc::now()).is_err());
    }
}
