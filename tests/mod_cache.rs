use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use searchrepo::backend::InMemoryBackend;
use searchrepo::cache::{CacheClient, CacheConfig, CacheCoordinator, EvictionMode, InMemoryCacheClient};
use searchrepo::clock::{Clock, ManualClock, SharedClock};
use searchrepo::config::RepositoryConfig;
use searchrepo::document::Document;
use searchrepo::errors::RepoError;
use searchrepo::query::CommandOptions;
use searchrepo::repository::Repository;
use searchrepo::types::DocumentId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Page {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<DocumentId>,
    title: String,
}

impl Document for Page {
    fn id(&self) -> Option<&DocumentId> {
        self.id.as_ref()
    }
    fn set_id(&mut self, id: DocumentId) {
        self.id = Some(id);
    }
}

fn setup(config: CacheConfig) -> (Arc<ManualClock>, Arc<InMemoryBackend>, Arc<InMemoryCacheClient>, Repository<Page>) {
    let clock = ManualClock::starting_now();
    let shared: SharedClock = clock.clone();
    let backend = Arc::new(InMemoryBackend::new(shared.clone()));
    let cache = Arc::new(InMemoryCacheClient::new(config, shared.clone()));
    let repo = Repository::<Page>::builder("pages", backend.clone()).clock(shared).cache(cache.clone()).build().unwrap();
    (clock, backend, cache, repo)
}

fn page(id: &str) -> Page {
    Page { id: Some(id.into()), title: format!("page {id}") }
}

#[tokio::test]
async fn test_per_call_expiration_overrides_the_default_ttl() {
    let (clock, backend, _, repo) = setup(CacheConfig::default());
    repo.add(page("p1"), &CommandOptions::new()).await.unwrap();
    let short = CommandOptions::new().use_cache().expires_in(Duration::from_secs(30));
    repo.get_by_id(&"p1".into(), &short).await.unwrap();

    clock.advance(chrono::Duration::seconds(10));
    let calls = backend.call_count();
    repo.get_by_id(&"p1".into(), &short).await.unwrap();
    assert_eq!(backend.call_count(), calls);

    clock.advance(chrono::Duration::seconds(25));
    repo.get_by_id(&"p1".into(), &short).await.unwrap();
    assert_eq!(backend.call_count(), calls + 1);
}

#[tokio::test]
async fn test_past_expiration_is_rejected() {
    let (clock, _, _, repo) = setup(CacheConfig::default());
    let stale = CommandOptions::new().use_cache().expires_at(clock.now() - chrono::Duration::seconds(1));
    let err = repo.get_by_id(&"p1".into(), &stale).await.unwrap_err();
    assert!(matches!(err, RepoError::InvalidOptions(_)));
}

#[tokio::test]
async fn test_memory_accounting_follows_entries() {
    let (_, _, cache, repo) = setup(CacheConfig::default());
    let opts = CommandOptions::new();
    repo.add_many(vec![page("a"), page("b")], &opts).await.unwrap();
    repo.get_by_ids(&["a".into(), "b".into()], &opts.clone().use_cache()).await.unwrap();
    assert!(cache.metrics_snapshot().memory_bytes > 0);

    repo.remove_by_ids(&["a".into(), "b".into()], &opts).await.unwrap();
    let metrics = cache.metrics_snapshot();
    assert_eq!(metrics.memory_bytes, 0);
    assert_eq!(metrics.removes, 2);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_shrinking_capacity_evicts_least_recent() {
    let clock: SharedClock = ManualClock::starting_now();
    let cache = InMemoryCacheClient::new(CacheConfig { capacity: 4, ..Default::default() }, clock);
    for key in ["a", "b", "c", "d"] {
        cache.set(key, json!(key), None).await.unwrap();
    }
    cache.get("a").await.unwrap();
    cache.set_capacity(2);
    assert_eq!(cache.len(), 2);
    assert!(cache.contains_key("a"));
    assert!(cache.contains_key("d"));
    assert_eq!(cache.metrics_snapshot().lru_evictions, 2);
}

#[tokio::test]
async fn test_lru_only_mode_ignores_expired_entries_when_full() {
    let clock = ManualClock::starting_now();
    let shared: SharedClock = clock.clone();
    let config = CacheConfig { capacity: 2, eviction_mode: EvictionMode::LruOnly, ..Default::default() };
    let cache = InMemoryCacheClient::new(config, shared);
    cache.set("fresh", json!(1), None).await.unwrap();
    cache.set("short", json!(2), Some(Duration::from_secs(1))).await.unwrap();
    clock.advance(chrono::Duration::seconds(5));

    cache.set("new", json!(3), None).await.unwrap();
    let metrics = cache.metrics_snapshot();
    assert_eq!(metrics.lru_evictions, 1);
    assert_eq!(metrics.ttl_evictions, 0);
    assert!(!cache.contains_key("fresh"));
}

#[tokio::test]
async fn test_disabled_coordinator_is_inert() {
    let cache = CacheCoordinator::disabled("pages");
    cache.set_document(&"p1".into(), &page("p1"), Duration::from_secs(60)).await;
    assert!(cache.get_document::<Page>(&"p1".into()).await.is_none());
    cache.invalidate_all().await;
    assert!(!cache.is_enabled());
}

#[tokio::test]
async fn test_cache_enabled_config_builds_a_private_cache() {
    let clock = ManualClock::starting_now();
    let shared: SharedClock = clock.clone();
    let backend = Arc::new(InMemoryBackend::new(shared.clone()));
    let config = RepositoryConfig { cache_enabled: true, ..Default::default() };
    let repo = Repository::<Page>::builder("pages", backend.clone()).clock(shared).config(config).build().unwrap();
    assert!(repo.cache().is_enabled());

    repo.add(page("p1"), &CommandOptions::new()).await.unwrap();
    let cached = CommandOptions::new().use_cache();
    repo.get_by_id(&"p1".into(), &cached).await.unwrap();
    let calls = backend.call_count();
    assert_eq!(repo.get_by_id(&"p1".into(), &cached).await.unwrap(), Some(page("p1")));
    assert_eq!(backend.call_count(), calls);
}

#[tokio::test]
async fn test_cache_stays_off_without_client_or_flag() {
    let clock = ManualClock::starting_now();
    let shared: SharedClock = clock.clone();
    let backend = Arc::new(InMemoryBackend::new(shared.clone()));
    let repo = Repository::<Page>::builder("pages", backend).clock(shared).build().unwrap();
    assert!(!repo.cache().is_enabled());
}

#[tokio::test]
async fn test_hit_ratio_reflects_repository_reads() {
    let (_, _, cache, repo) = setup(CacheConfig::default());
    repo.add(page("p1"), &CommandOptions::new()).await.unwrap();
    let cached = CommandOptions::new().use_cache();
    for _ in 0..4 {
        repo.get_by_id(&"p1".into(), &cached).await.unwrap();
    }
    let metrics = cache.metrics_snapshot();
    assert_eq!((metrics.hits, metrics.misses), (3, 1));
    assert!((metrics.hit_ratio() - 0.75).abs() < f64::EPSILON);
}
