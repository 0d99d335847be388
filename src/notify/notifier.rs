use std::sync::Arc;

use super::bus::MessageBus;
use super::events::{BeforeQuery, ChangeBatch, EntityChanged, ModifiedDocument};
use super::hub::EventHub;
use crate::document::Document;
use crate::query::CompiledQuery;
use crate::types::{ChangeType, DocumentId};

/// Raises change events for one repository: local subscribers first, then
/// the message bus. Neither side can fail the write.
pub struct ChangeNotifier<T> {
    index: String,
    hub: EventHub<T>,
    bus: Option<Arc<dyn MessageBus>>,
}

impl<T: Document> ChangeNotifier<T> {
    pub fn new(index: impl Into<String>, bus: Option<Arc<dyn MessageBus>>) -> Self {
        Self { index: index.into(), hub: EventHub::default(), bus }
    }

    #[must_use]
    pub const fn hub(&self) -> &EventHub<T> {
        &self.hub
    }

    pub fn before_query(&self, query: &CompiledQuery) {
        self.hub.emit_before_query(&BeforeQuery { index: self.index.clone(), query: query.clone() });
    }

    pub fn before_write(&self, change_type: ChangeType, documents: &[ModifiedDocument<T>]) {
        if documents.is_empty() {
            return;
        }
        self.hub.emit_before_write(&ChangeBatch::new(change_type, documents.to_vec()));
    }

    /// Local `DocumentsChanged`, then `EntityChanged` on the bus.
    pub async fn documents_changed(&self, change_type: ChangeType, documents: Vec<ModifiedDocument<T>>) {
        if documents.is_empty() {
            return;
        }
        let ids = documents.iter().filter_map(|d| d.value.id().cloned()).collect();
        self.documents_changed_locally(change_type, documents);
        self.publish(change_type, ids).await;
    }

    /// Local `DocumentsChanged` only; bulk writes signal the bus once at the end.
    pub fn documents_changed_locally(&self, change_type: ChangeType, documents: Vec<ModifiedDocument<T>>) {
        if documents.is_empty() {
            return;
        }
        self.hub.emit_documents_changed(&ChangeBatch::new(change_type, documents));
    }

    /// Bus-only signal for bulk changes whose documents were not loaded.
    pub async fn publish(&self, change_type: ChangeType, ids: Vec<DocumentId>) {
        let Some(bus) = &self.bus else { return };
        let message = EntityChanged { index: self.index.clone(), change_type, ids };
        if let Err(e) = bus.publish(&message).await {
            log::warn!("publishing {change_type} on '{}' failed: {e}", self.index);
        }
    }
}
