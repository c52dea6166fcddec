//! Process-wide shared state: the pieces of (D), (E), (C), (J) that
//! outlive any one session, plus the single commit lock (G).
//!
//! A `Session` (see [`crate::session`]) borrows an `Arc<Engine>` and adds
//! per-thread state (the active transaction, hooks). Everything in
//! `Engine` itself is safe to share across threads: the locator table and
//! arena are internally synchronized, the catalog and index registry sit
//! behind a `RwLock`, and `commit_lock` is the single process-wide
//! exclusive gate spec §4.G requires.

use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::index::{ConcreteIndex, IndexStore};
use crate::locator::LocatorTable;
use crate::persistence::{NullSink, PersistenceSink};
use crate::record::{Arena, IdentityMap};
use graphdb_primitives::IndexId;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) locators: Arc<LocatorTable>,
    pub(crate) arena: RwLock<Arena>,
    pub(crate) identity: IdentityMap,
    pub(crate) catalog: RwLock<Catalog>,
    pub(crate) indexes: RwLock<HashMap<IndexId, ConcreteIndex>>,
    pub(crate) commit_lock: Mutex<()>,
    pub(crate) next_txn_id: AtomicU64,
    pub(crate) sink: Box<dyn PersistenceSink>,
}

impl Engine {
    pub fn open(config: EngineConfig) -> Result<Arc<Engine>> {
        Engine::with_persistence_sink(config, Box::new(NullSink))
    }

    pub fn with_persistence_sink(config: EngineConfig, sink: Box<dyn PersistenceSink>) -> Result<Arc<Engine>> {
        config.validate()?;
        let locators = LocatorTable::new(config.max_locators);
        Ok(Arc::new(Engine {
            locators,
            arena: RwLock::new(Arena::new(config.max_objects)),
            identity: IdentityMap::new(),
            catalog: RwLock::new(Catalog::new()),
            indexes: RwLock::new(HashMap::new()),
            commit_lock: Mutex::new(()),
            next_txn_id: AtomicU64::new(1),
            sink,
            config,
        }))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn register_index(&self, index: ConcreteIndex) {
        self.indexes.write().insert(index.meta().index_id, index);
    }

    pub fn allocate_txn_id(&self) -> graphdb_primitives::TxId {
        graphdb_primitives::TxId(self.next_txn_id.fetch_add(1, Ordering::SeqCst))
    }

    pub(crate) fn with_index<R>(&self, index_id: IndexId, f: impl FnOnce(&ConcreteIndex) -> Result<R>) -> Result<R> {
        let guard = self.indexes.read();
        let index = guard.get(&index_id).ok_or(EngineError::IndexNotFound(index_id))?;
        f(index)
    }
}
