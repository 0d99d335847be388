//! Repository configuration: defaults, TOML files and `SEARCHREPO_*`
//! environment overrides (env wins over file, file over defaults).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::errors::{RepoError, Result};
use crate::query::MAX_PAGE_LIMIT;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    pub default_page_limit: u32,
    pub default_cache_ttl_secs: u64,
    pub snapshot_lifetime_secs: u64,
    /// Documents per backend call for bulk patch/remove.
    pub bulk_batch_size: usize,
    /// Whether writes raise change events unless a call overrides it.
    pub notifications: bool,
    pub retry: RetryPolicy,
    /// Build an in-process cache from `cache` when no client is supplied.
    pub cache_enabled: bool,
    pub cache: CacheConfig,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            default_page_limit: 10,
            default_cache_ttl_secs: 300,
            snapshot_lifetime_secs: 60,
            bulk_batch_size: 500,
            notifications: true,
            retry: RetryPolicy::default(),
            cache_enabled: false,
            cache: CacheConfig::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| RepoError::Config(format!("{key}: cannot parse '{raw}'"))),
        Err(_) => Ok(None),
    }
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|s| matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

impl RepositoryConfig {
    /// # Errors
    /// `Config` on malformed TOML or invalid values.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(text).map_err(|e| RepoError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// # Errors
    /// `Config` when the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| RepoError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Defaults, then `SEARCHREPO_CONFIG` (a TOML file) when set, then env overrides.
    ///
    /// # Errors
    /// `Config` for unreadable files or unparsable variables.
    pub fn load() -> Result<Self> {
        let mut cfg = match std::env::var("SEARCHREPO_CONFIG") {
            Ok(path) => Self::from_file(&PathBuf::from(path))?,
            Err(_) => Self::default(),
        };
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// # Errors
    /// `Config` when a set variable does not parse.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(v) = env_parse("SEARCHREPO_DEFAULT_PAGE_LIMIT")? {
            self.default_page_limit = v;
        }
        if let Some(v) = env_parse("SEARCHREPO_CACHE_TTL_SECS")? {
            self.default_cache_ttl_secs = v;
        }
        if let Some(v) = env_parse("SEARCHREPO_SNAPSHOT_LIFETIME_SECS")? {
            self.snapshot_lifetime_secs = v;
        }
        if let Some(v) = env_parse("SEARCHREPO_BULK_BATCH_SIZE")? {
            self.bulk_batch_size = v;
        }
        if let Some(v) = env_parse("SEARCHREPO_RETRY_ATTEMPTS")? {
            self.retry.max_attempts = v;
        }
        if let Some(v) = env_parse("SEARCHREPO_CACHE_CAPACITY")? {
            self.cache.capacity = v;
        }
        if let Some(v) = env_flag("SEARCHREPO_CACHE_ENABLED") {
            self.cache_enabled = v;
        }
        if let Some(v) = env_flag("SEARCHREPO_NOTIFICATIONS") {
            self.notifications = v;
        }
        Ok(())
    }

    /// # Errors
    /// `Config` naming the first out-of-range setting.
    pub fn validate(&self) -> Result<()> {
        if self.default_page_limit == 0 || self.default_page_limit > MAX_PAGE_LIMIT {
            return Err(RepoError::Config(format!(
                "default_page_limit must be within 1..={MAX_PAGE_LIMIT}, got {}",
                self.default_page_limit
            )));
        }
        if self.bulk_batch_size == 0 {
            return Err(RepoError::Config("bulk_batch_size must be positive".into()));
        }
        if self.snapshot_lifetime_secs == 0 {
            return Err(RepoError::Config("snapshot_lifetime_secs must be positive".into()));
        }
        if self.cache.capacity == 0 {
            return Err(RepoError::Config("cache.capacity must be positive".into()));
        }
        Ok(())
    }

    #[must_use]
    pub const fn default_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.default_cache_ttl_secs)
    }

    #[must_use]
    pub const fn snapshot_lifetime(&self) -> Duration {
        Duration::from_secs(self.snapshot_lifetime_secs)
    }
}
