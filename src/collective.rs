//! Composition root.
//!
//! Builds one [`MessageBus`], one [`PatternEngine`], and one [`FieldCache`]
//! around a shared [`SqliteStore`] so request handlers can be handed explicit
//! instances instead of reaching for globals.

use anyhow::Result;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::bus::MessageBus;
use crate::cache::{FieldCache, FieldData};
use crate::config::AgoraConfig;
use crate::emergence::PatternEngine;
use crate::store::{PatternStore, SecondaryTier, SqliteStore, WisdomStore};

pub struct Collective {
    pub config: Arc<AgoraConfig>,
    pub store: SqliteStore,
    pub bus: Arc<MessageBus>,
    pub engine: Arc<PatternEngine>,
    pub field_cache: Arc<FieldCache<FieldData>>,
}

impl Collective {
    /// Open the configured database and wire every component to it.
    pub fn open(config: AgoraConfig) -> Result<Self> {
        let db_path = config.resolved_db_path();
        let store = SqliteStore::open(&db_path)?;
        tracing::info!(db = %db_path.display(), "database ready");
        Ok(Self::with_store(config, store))
    }

    /// Same wiring over a private in-memory database.
    pub fn in_memory(config: AgoraConfig) -> Result<Self> {
        Ok(Self::with_store(config, SqliteStore::open_in_memory()?))
    }

    pub fn with_store(config: AgoraConfig, store: SqliteStore) -> Self {
        let wisdom_store: Arc<dyn WisdomStore> = Arc::new(store.clone());
        let pattern_store: Arc<dyn PatternStore> = Arc::new(store.clone());
        let secondary: Option<Arc<dyn SecondaryTier>> = config
            .cache
            .mirror_to_store
            .then(|| Arc::new(store.clone()) as Arc<dyn SecondaryTier>);

        let bus = Arc::new(MessageBus::new(config.bus.clone(), Some(wisdom_store)));
        let engine = Arc::new(PatternEngine::new(
            config.emergence.clone(),
            pattern_store,
            Arc::clone(&bus),
        ));
        let field_cache = Arc::new(FieldCache::new(config.cache.clone(), secondary));

        tracing::info!(
            agents = bus.agents().len(),
            cache_namespace = %config.cache.namespace,
            mirrored = config.cache.mirror_to_store,
            "collective ready"
        );

        Self {
            config: Arc::new(config),
            store,
            bus,
            engine,
            field_cache,
        }
    }

    /// Start the candidate sweep and the cache cleanup. The returned handle
    /// belongs to the candidate sweep; the cache owns its own.
    pub fn start_background(&self) -> JoinHandle<()> {
        self.field_cache.start_cleanup();
        self.engine.spawn_sweeper()
    }

    pub fn shutdown(&self, sweeper: JoinHandle<()>) {
        sweeper.abort();
        self.field_cache.shutdown();
    }
}
