use parking_lot::RwLock;
use std::sync::Arc;

use super::events::{BeforeQuery, BeforeWrite, DocumentsChanged};
use crate::errors::Result;

pub type Handler<E> = Arc<dyn Fn(&E) -> Result<()> + Send + Sync>;

/// Synchronous in-process subscribers for one repository.
///
/// A failing handler is logged and the remaining handlers still run.
pub struct EventHub<T> {
    before_write: RwLock<Vec<Handler<BeforeWrite<T>>>>,
    before_query: RwLock<Vec<Handler<BeforeQuery>>>,
    documents_changed: RwLock<Vec<Handler<DocumentsChanged<T>>>>,
}

impl<T> Default for EventHub<T> {
    fn default() -> Self {
        Self {
            before_write: RwLock::new(Vec::new()),
            before_query: RwLock::new(Vec::new()),
            documents_changed: RwLock::new(Vec::new()),
        }
    }
}

fn dispatch<E>(kind: &str, handlers: &RwLock<Vec<Handler<E>>>, event: &E) -> usize {
    // clone out so handlers may subscribe without deadlocking
    let handlers: Vec<Handler<E>> = handlers.read().clone();
    let mut failures = 0;
    for handler in handlers {
        if let Err(e) = handler(event) {
            failures += 1;
            log::warn!("{kind} handler failed: {e}");
        }
    }
    failures
}

impl<T> EventHub<T> {
    pub fn on_before_write(&self, handler: impl Fn(&BeforeWrite<T>) -> Result<()> + Send + Sync + 'static) {
        self.before_write.write().push(Arc::new(handler));
    }

    pub fn on_before_query(&self, handler: impl Fn(&BeforeQuery) -> Result<()> + Send + Sync + 'static) {
        self.before_query.write().push(Arc::new(handler));
    }

    pub fn on_documents_changed(
        &self,
        handler: impl Fn(&DocumentsChanged<T>) -> Result<()> + Send + Sync + 'static,
    ) {
        self.documents_changed.write().push(Arc::new(handler));
    }

    /// Returns the number of failed handlers.
    pub fn emit_before_write(&self, event: &BeforeWrite<T>) -> usize {
        dispatch("before-write", &self.before_write, event)
    }

    pub fn emit_before_query(&self, event: &BeforeQuery) -> usize {
        dispatch("before-query", &self.before_query, event)
    }

    pub fn emit_documents_changed(&self, event: &DocumentsChanged<T>) -> usize {
        dispatch("documents-changed", &self.documents_changed, event)
    }

    #[must_use]
    pub fn has_change_subscribers(&self) -> bool {
        !self.documents_changed.read().is_empty() || !self.before_write.read().is_empty()
    }
}
