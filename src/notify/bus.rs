use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::broadcast;

use super::events::EntityChanged;
use crate::errors::{RepoError, Result};

/// Cross-process publish channel for change signals.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, message: &EntityChanged) -> Result<()>;
}

/// [`MessageBus`] over a tokio broadcast channel. Publishing with no live
/// subscribers is not an error.
#[derive(Clone)]
pub struct InMemoryMessageBus {
    sender: broadcast::Sender<EntityChanged>,
    fail_next: Arc<AtomicU32>,
}

impl Default for InMemoryMessageBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl InMemoryMessageBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender, fail_next: Arc::new(AtomicU32::new(0)) }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EntityChanged> {
        self.sender.subscribe()
    }

    pub fn fail_next_calls(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessageBus for InMemoryMessageBus {
    async fn publish(&self, message: &EntityChanged) -> Result<()> {
        if self.fail_next.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok() {
            return Err(RepoError::MessageBus("injected bus fault".into()));
        }
        match self.sender.send(message.clone()) {
            Ok(receivers) => log::trace!("published {} change on '{}' to {receivers} subscribers", message.change_type, message.index),
            Err(_) => log::trace!("no subscribers for '{}' change", message.index),
        }
        Ok(())
    }
}
