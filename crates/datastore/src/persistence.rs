//! Optional persistence sink (spec §6).
//!
//! The engine is purely in-memory; a persistence sink is an external
//! collaborator that receives a sealed transaction log at commit and
//! decides what, if anything, to do with it. Recovery is "replay
//! creates/updates/removes in commit order" — the sink only needs to
//! hand back log records in the order it received them, never interpret
//! them.

use crate::txlog::LogRecord;
use graphdb_primitives::TxId;

/// Implemented by an external collaborator that wants a durable copy of
/// every committed transaction. The engine never constructs one itself;
/// a host application supplies one via [`crate::Engine::with_persistence_sink`].
pub trait PersistenceSink: Send + Sync {
    /// Called once per commit, after the commit lock has applied the log
    /// to the committed locator map but before the lock is released.
    /// `records` is already sealed (read-only).
    fn on_commit(&self, txn_id: TxId, records: &[LogRecord]);
}

/// A sink that discards everything; the default when no persistence is
/// configured.
pub struct NullSink;

impl PersistenceSink for NullSink {
    fn on_commit(&self, _txn_id: TxId, _records: &[LogRecord]) {}
}

/// An in-memory sink that retains every committed log in order, useful
/// in tests that want to assert on replay order without standing up
/// real storage.
#[derive(Default)]
pub struct RecordingSink {
    commits: parking_lot::Mutex<Vec<(TxId, Vec<LogRecord>)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        RecordingSink::default()
    }

    pub fn commits(&self) -> Vec<(TxId, Vec<LogRecord>)> {
        self.commits.lock().clone()
    }
}

impl PersistenceSink for RecordingSink {
    fn on_commit(&self, txn_id: TxId, records: &[LogRecord]) {
        self.commits.lock().push((txn_id, records.to_vec()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txlog::Op;
    use graphdb_primitives::{Locator, Offset};

    #[test]
    fn recording_sink_preserves_commit_order() {
        let sink = RecordingSink::new();
        let rec = |n: u32| LogRecord {
            locator: Locator(n),
            old_offset: Offset::NONE,
            new_offset: Offset(n),
            op: Op::Create,
            txn_id: TxId(1),
        };
        sink.on_commit(TxId(1), &[rec(1)]);
        sink.on_commit(TxId(2), &[rec(2)]);
        let commits = sink.commits();
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].0, TxId(1));
        assert_eq!(commits[1].0, TxId(2));
    }
}
