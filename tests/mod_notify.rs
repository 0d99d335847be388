use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use searchrepo::backend::InMemoryBackend;
use searchrepo::cache::{CacheConfig, InMemoryCacheClient};
use searchrepo::clock::{ManualClock, SharedClock};
use searchrepo::document::Document;
use searchrepo::notify::{EntityChanged, InMemoryMessageBus, spawn_cache_invalidator};
use searchrepo::patch::{Patch, ScriptPatch};
use searchrepo::query::{CommandOptions, Query};
use searchrepo::repository::Repository;
use searchrepo::types::{ChangeType, DocumentId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Note {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<DocumentId>,
    text: String,
}

impl Document for Note {
    fn id(&self) -> Option<&DocumentId> {
        self.id.as_ref()
    }
    fn set_id(&mut self, id: DocumentId) {
        self.id = Some(id);
    }
}

fn note(id: &str, text: &str) -> Note {
    Note { id: Some(id.into()), text: text.into() }
}

struct Node {
    cache: Arc<InMemoryCacheClient>,
    repo: Repository<Note>,
}

/// Two repositories over one backend and bus, each with a private cache.
fn cluster(backend: &Arc<InMemoryBackend>, bus: &Arc<InMemoryMessageBus>, clock: &SharedClock) -> Node {
    let cache = Arc::new(InMemoryCacheClient::new(CacheConfig::default(), clock.clone()));
    let repo = Repository::<Note>::builder("notes", backend.clone())
        .clock(clock.clone())
        .cache(cache.clone())
        .message_bus(bus.clone())
        .build()
        .unwrap();
    Node { cache, repo }
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_remote_write_evicts_local_cache_entry() {
    let clock: SharedClock = ManualClock::starting_now();
    let backend = Arc::new(InMemoryBackend::new(clock.clone()));
    let bus = Arc::new(InMemoryMessageBus::default());
    let writer = cluster(&backend, &bus, &clock);
    let reader = cluster(&backend, &bus, &clock);

    let opts = CommandOptions::new();
    writer.repo.add(note("n1", "draft"), &opts).await.unwrap();
    let _task = spawn_cache_invalidator(bus.subscribe(), reader.repo.cache().clone(), "notes".into());
    let cached = reader.repo.get_by_id(&"n1".into(), &opts.clone().use_cache()).await.unwrap().unwrap();
    assert_eq!(cached.text, "draft");
    let key = reader.repo.cache().id_key(&"n1".into());
    assert!(reader.cache.contains_key(&key));

    writer.repo.save(note("n1", "final"), &opts).await.unwrap();
    wait_until(|| !reader.cache.contains_key(&key)).await;

    let fresh = reader.repo.get_by_id(&"n1".into(), &opts.use_cache()).await.unwrap().unwrap();
    assert_eq!(fresh.text, "final");
}

#[tokio::test]
async fn test_bulk_script_patch_signals_every_node() {
    let clock: SharedClock = ManualClock::starting_now();
    let backend = Arc::new(InMemoryBackend::new(clock.clone()));
    backend.register_script("shout", |source, _| {
        let upper = source["text"].as_str().unwrap_or_default().to_uppercase();
        source["text"] = serde_json::Value::String(upper);
        Ok(())
    });
    let bus = Arc::new(InMemoryMessageBus::default());
    let mut signals = bus.subscribe();
    let writer = cluster(&backend, &bus, &clock);
    let reader = cluster(&backend, &bus, &clock);
    let _task = spawn_cache_invalidator(bus.subscribe(), reader.repo.cache().clone(), "notes".into());

    let quiet = CommandOptions::new().notifications(false);
    writer.repo.add_many(vec![note("a", "x"), note("b", "y")], &quiet).await.unwrap();
    reader.repo.get_by_ids(&["a".into(), "b".into()], &CommandOptions::new().use_cache()).await.unwrap();
    assert_eq!(reader.cache.len(), 2);

    let patch = Patch::Script(ScriptPatch::new("shout"));
    assert_eq!(writer.repo.patch_all(&Query::new(), &patch, &quiet).await.unwrap(), 2);

    let signal = signals.recv().await.unwrap();
    assert_eq!(signal, EntityChanged { index: "notes".into(), change_type: ChangeType::Saved, ids: vec![] });
    assert!(signal.is_bulk());
    wait_until(|| reader.cache.is_empty()).await;
}

#[tokio::test]
async fn test_bus_faults_never_fail_a_write() {
    let clock: SharedClock = ManualClock::starting_now();
    let backend = Arc::new(InMemoryBackend::new(clock.clone()));
    let bus = Arc::new(InMemoryMessageBus::default());
    let node = cluster(&backend, &bus, &clock);
    bus.fail_next_calls(1);
    let saved = node.repo.add(note("n1", "hello"), &CommandOptions::new()).await.unwrap();
    assert_eq!(saved.text, "hello");
    assert_eq!(backend.document_count("notes"), 1);
}

#[tokio::test]
async fn test_cache_faults_never_fail_a_read() {
    let clock: SharedClock = ManualClock::starting_now();
    let backend = Arc::new(InMemoryBackend::new(clock.clone()));
    let bus = Arc::new(InMemoryMessageBus::default());
    let node = cluster(&backend, &bus, &clock);
    node.repo.add(note("n1", "hello"), &CommandOptions::new()).await.unwrap();

    node.cache.fail_next_calls(5);
    let read = node.repo.get_by_id(&"n1".into(), &CommandOptions::new().use_cache()).await.unwrap();
    assert_eq!(read.unwrap().text, "hello");
}
