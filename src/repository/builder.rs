use std::marker::PhantomData;
use std::sync::Arc;

use super::core::{DerivedKeys, Inner, Repository, Validator};
use super::metrics::RepositoryMetrics;
use crate::backend::SearchBackend;
use crate::cache::{CacheClient, CacheCoordinator, InMemoryCacheClient};
use crate::clock::{SharedClock, system_clock};
use crate::config::RepositoryConfig;
use crate::document::Document;
use crate::errors::{RepoError, Result};
use crate::notify::{ChangeNotifier, MessageBus, ModifiedDocument};
use crate::query::FieldCondition;
use crate::types::{IdGenerator, default_id_generator};

/// Wires a [`Repository`] to its collaborators.
pub struct RepositoryBuilder<T: Document> {
    index: String,
    backend: Arc<dyn SearchBackend>,
    cache: Option<Arc<dyn CacheClient>>,
    bus: Option<Arc<dyn MessageBus>>,
    clock: SharedClock,
    id_generator: IdGenerator,
    config: RepositoryConfig,
    system_conditions: Vec<FieldCondition>,
    validator: Option<Validator<T>>,
    derived_keys: Option<DerivedKeys<T>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Document> RepositoryBuilder<T> {
    pub(super) fn new(index: String, backend: Arc<dyn SearchBackend>) -> Self {
        Self {
            index,
            backend,
            cache: None,
            bus: None,
            clock: system_clock(),
            id_generator: default_id_generator(),
            config: RepositoryConfig::default(),
            system_conditions: Vec::new(),
            validator: None,
            derived_keys: None,
            _marker: PhantomData,
        }
    }

    /// Shared cache client. Without one, `config.cache_enabled` builds a
    /// private in-memory cache from `config.cache`.
    #[must_use]
    pub fn cache(mut self, client: Arc<dyn CacheClient>) -> Self {
        self.cache = Some(client);
        self
    }

    #[must_use]
    pub fn message_bus(mut self, bus: Arc<dyn MessageBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn id_generator(mut self, generator: IdGenerator) -> Self {
        self.id_generator = generator;
        self
    }

    #[must_use]
    pub fn config(mut self, config: RepositoryConfig) -> Self {
        self.config = config;
        self
    }

    /// Adds a predicate applied under every query (tenant scoping and the like).
    #[must_use]
    pub fn system_filter(mut self, condition: FieldCondition) -> Self {
        self.system_conditions.push(condition);
        self
    }

    /// Business rules checked before adds and saves.
    #[must_use]
    pub fn validator(
        mut self,
        validator: impl Fn(&T) -> std::result::Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Extra query cache keys to drop when a document changes.
    #[must_use]
    pub fn derived_cache_keys(
        mut self,
        keys: impl Fn(&ModifiedDocument<T>) -> Vec<String> + Send + Sync + 'static,
    ) -> Self {
        self.derived_keys = Some(Arc::new(keys));
        self
    }

    /// # Errors
    /// `Config` for an empty index name or invalid configuration.
    pub fn build(self) -> Result<Repository<T>> {
        if self.index.trim().is_empty() {
            return Err(RepoError::Config("index name must not be empty".into()));
        }
        self.config.validate()?;
        let client = match self.cache {
            Some(client) => Some(client),
            None if self.config.cache_enabled => {
                let local: Arc<dyn CacheClient> =
                    Arc::new(InMemoryCacheClient::new(self.config.cache.clone(), self.clock.clone()));
                Some(local)
            }
            None => None,
        };
        let cache = match client {
            Some(client) => CacheCoordinator::new(client, self.index.clone(), self.config.default_cache_ttl()),
            None => CacheCoordinator::disabled(self.index.clone()),
        };
        log::debug!(
            "repository '{}' built (caps: {:?}, cache: {})",
            self.index,
            T::CAPABILITIES,
            cache.is_enabled()
        );
        Ok(Repository::from_inner(Inner {
            notifier: ChangeNotifier::new(self.index.clone(), self.bus),
            index: self.index,
            backend: self.backend,
            cache,
            clock: self.clock,
            id_generator: self.id_generator,
            config: self.config,
            caps: T::CAPABILITIES,
            system_conditions: self.system_conditions,
            validator: self.validator,
            derived_keys: self.derived_keys,
            metrics: RepositoryMetrics::default(),
        }))
    }
}
