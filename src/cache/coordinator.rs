use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use super::client::CacheClient;
use crate::types::DocumentId;

const PAGE_MARKER: &str = ":page:";

/// Read-through cache for one repository scope.
///
/// Every call is best-effort: client faults and undecodable entries are
/// logged and reported as misses so they never fail the surrounding operation.
#[derive(Clone)]
pub struct CacheCoordinator {
    client: Option<Arc<dyn CacheClient>>,
    scope: String,
    default_ttl: Duration,
}

impl CacheCoordinator {
    pub fn new(client: Arc<dyn CacheClient>, scope: impl Into<String>, default_ttl: Duration) -> Self {
        Self { client: Some(client), scope: scope.into(), default_ttl }
    }

    /// A coordinator that never caches.
    pub fn disabled(scope: impl Into<String>) -> Self {
        Self { client: None, scope: scope.into(), default_ttl: Duration::ZERO }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    #[must_use]
    pub const fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    #[must_use]
    pub fn id_key(&self, id: &DocumentId) -> String {
        format!("{}:id:{}", self.scope, id)
    }

    #[must_use]
    pub fn query_key(&self, key: &str) -> String {
        format!("{}:q:{}", self.scope, key)
    }

    /// Scopes a repository-declared derived key the same way query keys are.
    #[must_use]
    pub fn derived_key(&self, key: &str) -> String {
        self.query_key(key)
    }

    /// Unscoped key for one page of a keyed query; pass it to the `*_query` calls.
    #[must_use]
    pub fn page_key(key: &str, page: u32, limit: u32) -> String {
        format!("{key}{PAGE_MARKER}{page}:{limit}")
    }

    async fn get_value<R: DeserializeOwned>(&self, key: &str) -> Option<R> {
        let client = self.client.as_ref()?;
        let raw = match client.get(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                log::warn!("cache get '{key}' failed: {e}");
                return None;
            }
        };
        match serde_json::from_value(raw) {
            Ok(v) => {
                crate::devtrace!("{{\"cache\":\"hit\",\"key\":\"{key}\"}}");
                Some(v)
            }
            Err(e) => {
                log::warn!("cache entry '{key}' could not be decoded: {e}");
                None
            }
        }
    }

    async fn set_value<R: Serialize + Sync>(&self, key: &str, value: &R, ttl: Duration) {
        let Some(client) = &self.client else { return };
        let raw = match serde_json::to_value(value) {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("cache entry '{key}' could not be encoded: {e}");
                return;
            }
        };
        if let Err(e) = client.set(key, raw, Some(ttl)).await {
            log::warn!("cache set '{key}' failed: {e}");
        }
    }

    pub async fn get_document<T: DeserializeOwned>(&self, id: &DocumentId) -> Option<T> {
        self.get_value(&self.id_key(id)).await
    }

    pub async fn set_document<T: Serialize + Sync>(&self, id: &DocumentId, document: &T, ttl: Duration) {
        self.set_value(&self.id_key(id), document, ttl).await;
    }

    pub async fn get_query<R: DeserializeOwned>(&self, key: &str) -> Option<R> {
        self.get_value(&self.query_key(key)).await
    }

    pub async fn set_query<R: Serialize + Sync>(&self, key: &str, value: &R, ttl: Duration) {
        self.set_value(&self.query_key(key), value, ttl).await;
    }

    /// Removes the id keys of `ids`, the given derived keys and every cached
    /// page stored under a derived key.
    pub async fn invalidate<'a>(&self, ids: impl IntoIterator<Item = &'a DocumentId>, derived: &[String]) {
        let Some(client) = &self.client else { return };
        let keys: Vec<String> = ids
            .into_iter()
            .map(|id| self.id_key(id))
            .chain(derived.iter().map(|k| self.derived_key(k)))
            .collect();
        if keys.is_empty() {
            return;
        }
        match client.remove_all(&keys).await {
            Ok(n) => log::debug!("invalidated {n} of {} cache keys in '{}'", keys.len(), self.scope),
            Err(e) => log::warn!("cache invalidation in '{}' failed: {e}", self.scope),
        }
        for key in derived {
            let pages = format!("{}{PAGE_MARKER}", self.derived_key(key));
            if let Err(e) = client.remove_by_prefix(&pages).await {
                log::warn!("cache invalidation of pages under '{pages}' failed: {e}");
            }
        }
    }

    /// Clears the whole repository scope.
    pub async fn invalidate_all(&self) {
        let Some(client) = &self.client else { return };
        let prefix = format!("{}:", self.scope);
        match client.remove_by_prefix(&prefix).await {
            Ok(n) => log::debug!("cleared {n} cache keys in '{}'", self.scope),
            Err(e) => log::warn!("cache clear of '{}' failed: {e}", self.scope),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCacheClient;
    use serde_json::{Value, json};

    #[tokio::test]
    async fn scoped_keys_and_targeted_invalidation() {
        let client = Arc::new(InMemoryCacheClient::with_capacity(32));
        let cache = CacheCoordinator::new(client.clone(), "users", Duration::from_secs(60));
        let a = DocumentId::from("a");
        let b = DocumentId::from("b");
        cache.set_document(&a, &json!({"n": 1}), Duration::from_secs(60)).await;
        cache.set_document(&b, &json!({"n": 2}), Duration::from_secs(60)).await;
        cache.set_query("by-email:x", &json!([1]), Duration::from_secs(60)).await;
        assert!(client.contains_key("users:id:a"));
        assert!(client.contains_key("users:q:by-email:x"));

        cache.invalidate([&a], &["by-email:x".to_string()]).await;
        assert!(cache.get_document::<Value>(&a).await.is_none());
        assert_eq!(cache.get_document::<Value>(&b).await, Some(json!({"n": 2})));
        assert!(cache.get_query::<Value>("by-email:x").await.is_none());

        cache.invalidate_all().await;
        assert!(client.is_empty());
    }

    #[tokio::test]
    async fn derived_key_drops_its_pages() {
        let client = Arc::new(InMemoryCacheClient::with_capacity(32));
        let cache = CacheCoordinator::new(client.clone(), "users", Duration::from_secs(60));
        let ttl = Duration::from_secs(60);
        cache.set_query(&CacheCoordinator::page_key("active", 1, 10), &json!([1]), ttl).await;
        cache.set_query(&CacheCoordinator::page_key("active", 2, 10), &json!([2]), ttl).await;
        cache.set_query(&CacheCoordinator::page_key("archived", 1, 10), &json!([3]), ttl).await;
        assert!(client.contains_key("users:q:active:page:2:10"));

        cache.invalidate(std::iter::empty(), &["active".to_string()]).await;
        assert!(!client.contains_key("users:q:active:page:1:10"));
        assert!(!client.contains_key("users:q:active:page:2:10"));
        assert!(client.contains_key("users:q:archived:page:1:10"));
    }

    #[tokio::test]
    async fn client_faults_read_as_misses() {
        let client = Arc::new(InMemoryCacheClient::with_capacity(8));
        let cache = CacheCoordinator::new(client.clone(), "users", Duration::from_secs(60));
        let id = DocumentId::from("a");
        cache.set_document(&id, &json!(1), Duration::from_secs(60)).await;
        client.fail_next_calls(1);
        assert!(cache.get_document::<Value>(&id).await.is_none());
        assert_eq!(cache.get_document::<Value>(&id).await, Some(json!(1)));
    }
}
