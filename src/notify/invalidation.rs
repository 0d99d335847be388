use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use super::events::EntityChanged;
use crate::cache::CacheCoordinator;

/// Drops cache entries named by a remote change signal for `index`.
pub async fn apply_remote_change(cache: &CacheCoordinator, index: &str, message: &EntityChanged) {
    if message.index != index {
        return;
    }
    if message.is_bulk() {
        cache.invalidate_all().await;
    } else {
        cache.invalidate(&message.ids, &[]).await;
    }
}

/// Keeps `cache` coherent with writes made by other processes. A lagged
/// receiver clears the whole scope since signals were lost.
pub fn spawn_cache_invalidator(
    mut receiver: broadcast::Receiver<EntityChanged>,
    cache: CacheCoordinator,
    index: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(message) => apply_remote_change(&cache, &index, &message).await,
                Err(RecvError::Lagged(missed)) => {
                    log::warn!("cache invalidator for '{index}' missed {missed} signals; clearing scope");
                    cache.invalidate_all().await;
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
