//! Session / transaction manager (component G).
//!
//! Per spec §9's redesign note on "global mutable state": there are no
//! hidden singletons here. All committed state lives in [`crate::engine::Engine`]
//! behind `Arc`; the only global-looking thing is a `thread_local!` session
//! handle, and that handle is exactly the "per-thread session" the spec
//! calls for, not an ambient singleton the rest of the crate reaches into
//! directly. [`with_txn`] is the single seam the object/reference/VLR
//! modules use to reach the active engine and transaction together.

use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::index::maintenance::{self, TxIndexDelta};
use crate::key::Key;
use crate::locator::Snapshot;
use crate::txlog::{LogRecord, TxLog};
use graphdb_primitives::{IndexId, TxId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

type Hook = Box<dyn Fn(TxId) + Send + Sync>;

#[derive(Default)]
struct Hooks {
    begin: Vec<Hook>,
    commit: Vec<Hook>,
    rollback: Vec<Hook>,
}

impl Hooks {
    fn run(hooks: &[Hook], txn_id: TxId) {
        for hook in hooks {
            // Per spec §7: "hooks must not throw; any exception from a
            // hook is logged and swallowed."
            let result = panic::catch_unwind(AssertUnwindSafe(|| hook(txn_id)));
            if result.is_err() {
                log::error!("txn hook panicked during txn {txn_id}; swallowed");
            }
        }
    }
}

/// Everything specific to one open transaction: the log being built, the
/// copy-on-write locator snapshot, and the per-index deltas accumulated
/// so far (component K's uncommitted half).
pub struct TxnState {
    pub txn_id: TxId,
    pub begin_ts: TxId,
    pub snapshot: Snapshot,
    pub log: TxLog,
    pub deltas: HashMap<IndexId, TxIndexDelta>,
}

impl TxnState {
    /// Folds one log record into this index's transaction-local delta;
    /// called by the object API after every payload-affecting write for
    /// each index whose key columns the write touched.
    pub fn record_index_update(&mut self, index_id: IndexId, rec: &LogRecord, old_key: Option<Key>, new_key: Option<Key>) {
        let delta = self.deltas.entry(index_id).or_insert_with(TxIndexDelta::new);
        maintenance::update_index_from_log_record(delta, rec, old_key, new_key);
    }
}

struct Session {
    engine: Arc<Engine>,
    txn: Option<TxnState>,
    hooks: Hooks,
}

thread_local! {
    static SESSION: RefCell<Option<Session>> = const { RefCell::new(None) };
}

pub fn begin_session(engine: Arc<Engine>) -> Result<()> {
    SESSION.with(|cell| {
        let mut slot = cell.borrow_mut();
        if slot.is_some() {
            return Err(EngineError::SessionExists);
        }
        *slot = Some(Session {
            engine,
            txn: None,
            hooks: Hooks::default(),
        });
        log::debug!("session opened");
        Ok(())
    })
}

pub fn end_session() -> Result<()> {
    SESSION.with(|cell| {
        let mut slot = cell.borrow_mut();
        if slot.is_none() {
            return Err(EngineError::NoSessionActive);
        }
        *slot = None;
        log::debug!("session closed");
        Ok(())
    })
}

pub fn is_txn_active() -> Result<bool> {
    SESSION.with(|cell| {
        let slot = cell.borrow();
        let session = slot.as_ref().ok_or(EngineError::NoSessionActive)?;
        Ok(session.txn.is_some())
    })
}

pub fn begin_txn() -> Result<()> {
    SESSION.with(|cell| {
        let mut slot = cell.borrow_mut();
        let session = slot.as_mut().ok_or(EngineError::NoSessionActive)?;
        if session.txn.is_some() {
            return Err(EngineError::TxInProgress);
        }
        let txn_id = session.engine.allocate_txn_id();
        let snapshot = Snapshot::take(&session.engine.locators);
        let log = TxLog::new(session.engine.config().max_log_records);
        session.txn = Some(TxnState {
            txn_id,
            begin_ts: txn_id,
            snapshot,
            log,
            deltas: HashMap::new(),
        });
        Hooks::run(&session.hooks.begin, txn_id);
        log::debug!("txn {txn_id} begin");
        Ok(())
    })
}

pub fn rollback_txn() -> Result<()> {
    SESSION.with(|cell| {
        let mut slot = cell.borrow_mut();
        let session = slot.as_mut().ok_or(EngineError::NoSessionActive)?;
        let txn = session.txn.take().ok_or(EngineError::TxNotOpen)?;
        Hooks::run(&session.hooks.rollback, txn.txn_id);
        log::debug!("txn {} rollback", txn.txn_id);
        Ok(())
    })
}

/// Validates the log against the committed locator map, merges every
/// index delta into its committed index, applies the log to the
/// committed locator map, and hands the sealed log to the persistence
/// sink — all under the single process-wide commit lock, per spec §4.G.
///
/// Index merge happens *before* the locator map is touched: if a unique
/// constraint is violated partway through, nothing in this transaction
/// becomes visible to any snapshot, matching spec §8 scenario 1 ("after
/// rollback, neither row exists"). Any index entries merged for other
/// keys before the failing one are left in place, unreachable because no
/// locator was ever repointed to their offsets; they are inert until a
/// later GC sweep reclaims them.
pub fn commit_txn() -> Result<bool> {
    SESSION.with(|cell| {
        let mut slot = cell.borrow_mut();
        let session = slot.as_mut().ok_or(EngineError::NoSessionActive)?;
        let mut txn = session.txn.take().ok_or(EngineError::TxNotOpen)?;
        let engine = &session.engine;

        let _guard = engine.commit_lock.lock();

        for rec in txn.log.records() {
            if engine.locators.committed_offset(rec.locator) != rec.old_offset {
                Hooks::run(&session.hooks.rollback, txn.txn_id);
                log::warn!("txn {} update conflict on locator {:?}", txn.txn_id, rec.locator);
                return Err(EngineError::TxUpdateConflict);
            }
        }

        {
            let indexes = engine.indexes.read();
            for (index_id, delta) in &txn.deltas {
                let index = indexes.get(index_id).ok_or(EngineError::IndexNotFound(*index_id))?;
                if let Err(err) = maintenance::merge_into_committed(delta, index) {
                    Hooks::run(&session.hooks.rollback, txn.txn_id);
                    log::warn!("txn {} aborted merging index {:?}: {err}", txn.txn_id, index_id);
                    return Err(err);
                }
            }
        }

        txn.log.seal();
        for rec in txn.log.records() {
            engine.locators.apply_committed(rec.locator, rec.new_offset);
        }
        engine.sink.on_commit(txn.txn_id, txn.log.records());

        Hooks::run(&session.hooks.commit, txn.txn_id);
        log::debug!("txn {} commit ({} records)", txn.txn_id, txn.log.len());
        Ok(true)
    })
}

pub fn set_tx_begin_hook(hook: Hook, overwrite: bool) -> Result<()> {
    set_hook(overwrite, hook, |h| &mut h.begin)
}

pub fn set_tx_commit_hook(hook: Hook, overwrite: bool) -> Result<()> {
    set_hook(overwrite, hook, |h| &mut h.commit)
}

pub fn set_tx_rollback_hook(hook: Hook, overwrite: bool) -> Result<()> {
    set_hook(overwrite, hook, |h| &mut h.rollback)
}

fn set_hook(overwrite: bool, hook: Hook, select: impl Fn(&mut Hooks) -> &mut Vec<Hook>) -> Result<()> {
    SESSION.with(|cell| {
        let mut slot = cell.borrow_mut();
        let session = slot.as_mut().ok_or(EngineError::NoSessionActive)?;
        let list = select(&mut session.hooks);
        if overwrite {
            list.clear();
        }
        list.push(hook);
        Ok(())
    })
}

/// The seam every object/reference/VLR operation uses to reach the
/// engine and the active transaction together, without either module
/// needing to carry its own copy of either.
pub(crate) fn with_txn<R>(f: impl FnOnce(&Arc<Engine>, &mut TxnState) -> Result<R>) -> Result<R> {
    SESSION.with(|cell| {
        let mut slot = cell.borrow_mut();
        let session = slot.as_mut().ok_or(EngineError::NoSessionActive)?;
        let engine = session.engine.clone();
        let txn = session.txn.as_mut().ok_or(EngineError::TxNotOpen)?;
        f(&engine, txn)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn fresh_engine() -> Arc<Engine> {
        Engine::open(EngineConfig::default()).unwrap()
    }

    #[test]
    fn double_begin_session_is_rejected() {
        let _ = end_session();
        begin_session(fresh_engine()).unwrap();
        assert!(matches!(begin_session(fresh_engine()), Err(EngineError::SessionExists)));
        end_session().unwrap();
    }

    #[test]
    fn txn_lifecycle_without_a_session_is_rejected() {
        let _ = end_session();
        assert!(matches!(begin_txn(), Err(EngineError::NoSessionActive)));
    }

    #[test]
    fn double_begin_txn_is_rejected() {
        let _ = end_session();
        begin_session(fresh_engine()).unwrap();
        begin_txn().unwrap();
        assert!(matches!(begin_txn(), Err(EngineError::TxInProgress)));
        rollback_txn().unwrap();
        end_session().unwrap();
    }

    #[test]
    fn commit_with_no_writes_succeeds() {
        let _ = end_session();
        begin_session(fresh_engine()).unwrap();
        begin_txn().unwrap();
        assert_eq!(commit_txn().unwrap(), true);
        assert!(matches!(is_txn_active(), Ok(false)));
        end_session().unwrap();
    }

    #[test]
    fn hooks_fire_on_lifecycle_transitions() {
        let _ = end_session();
        begin_session(fresh_engine()).unwrap();
        let fired = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = fired.clone();
        set_tx_commit_hook(Box::new(move |_| { counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst); }), true).unwrap();
        begin_txn().unwrap();
        commit_txn().unwrap();
        assert_eq!(fired.load(std::sync::atomic::Ordering::SeqCst), 1);
        end_session().unwrap();
    }
}
