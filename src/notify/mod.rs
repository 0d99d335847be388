//! Change notification: typed local events, the cross-process message bus and
//! remote cache invalidation.

mod bus;
mod events;
mod hub;
mod invalidation;
mod notifier;

pub use bus::{InMemoryMessageBus, MessageBus};
pub use events::{
    BeforeQuery, BeforeWrite, ChangeBatch, DocumentsChanged, EntityChanged, ModifiedDocument,
};
pub use hub::{EventHub, Handler};
pub use invalidation::{apply_remote_change, spawn_cache_invalidator};
pub use notifier::ChangeNotifier;
