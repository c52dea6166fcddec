//! Index maintenance (component K).
//!
//! Converts transaction-log records into index entries, accumulates them
//! in a per-transaction delta that does not itself enforce uniqueness
//! (two inserts under one uncommitted transaction are allowed to coexist
//! locally), and merges the delta into the committed index at commit time
//! — where uniqueness *is* enforced, against whatever is already
//! committed plus whatever this transaction has merged so far. This is
//! what makes a same-transaction duplicate-key insert surface as a
//! conflict at commit rather than at the second `insert_row` call, per
//! spec §8 scenario 1.

use super::{ConcreteIndex, IndexEntry, IndexOp, IndexStore};
use crate::error::Result;
use crate::key::Key;
use crate::txlog::{LogRecord, Op};
use graphdb_primitives::TxId;

/// A transaction-local, non-enforcing record of index entries to apply to
/// one concrete index at commit. Order is preserved so that, if two
/// entries for the same key both land here, merge order matches log
/// order.
#[derive(Default)]
pub struct TxIndexDelta {
    entries: Vec<(Key, IndexEntry)>,
}

impl TxIndexDelta {
    pub fn new() -> Self {
        TxIndexDelta::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Key, IndexEntry)> {
        self.entries.iter()
    }

    fn record(&mut self, key: Key, entry: IndexEntry) {
        self.entries.push((key, entry));
    }
}

/// Folds one log record into `delta`, given the index key the affected
/// row had before (`old_key`) and/or after (`new_key`) the operation.
/// Per spec §4.K:
/// - `Create`/`Clone` add `{key(new), insert}`.
/// - `Update` adds `{key(old), remove}` then `{key(new), insert}` — even
///   when `old_key == new_key`, since the row's offset still changed and
///   the scan operator's visibility check keys off `offset`, not key
///   identity.
/// - `Remove` adds `{key(old), remove}`.
pub fn update_index_from_log_record(delta: &mut TxIndexDelta, rec: &LogRecord, old_key: Option<Key>, new_key: Option<Key>) {
    match rec.op {
        Op::Create | Op::Clone => {
            let key = new_key.expect("create/clone log record must carry a projected key");
            delta.record(
                key,
                IndexEntry {
                    locator: rec.locator,
                    txn_id: rec.txn_id,
                    offset: rec.new_offset,
                    op: IndexOp::Insert,
                },
            );
        }
        Op::Update => {
            let old = old_key.expect("update log record must carry the row's prior key");
            let new = new_key.expect("update log record must carry the row's new key");
            delta.record(
                old,
                IndexEntry {
                    locator: rec.locator,
                    txn_id: rec.txn_id,
                    offset: rec.old_offset,
                    op: IndexOp::Remove,
                },
            );
            delta.record(
                new,
                IndexEntry {
                    locator: rec.locator,
                    txn_id: rec.txn_id,
                    offset: rec.new_offset,
                    op: IndexOp::Insert,
                },
            );
        }
        Op::Remove => {
            let old = old_key.expect("remove log record must carry the row's key");
            delta.record(
                old,
                IndexEntry {
                    locator: rec.locator,
                    txn_id: rec.txn_id,
                    offset: rec.old_offset,
                    op: IndexOp::Remove,
                },
            );
        }
    }
}

/// Applies every entry in `delta` to `committed`, in log order. On a
/// unique-constraint violation partway through, the caller is expected to
/// abort the whole transaction — entries already merged are not rolled
/// back here; the session/txn manager (component G) is responsible for
/// discarding the committed state's locator repoints on abort, which
/// makes the merged-but-orphaned index entries unreachable from any live
/// locator and eligible for later GC.
pub fn merge_into_committed(delta: &TxIndexDelta, committed: &ConcreteIndex) -> Result<()> {
    for (key, entry) in delta.iter() {
        committed.insert(key.clone(), entry.clone())?;
    }
    Ok(())
}

/// Runs a bounded GC sweep over `committed`, per SPEC_FULL §2's
/// `index_offset_buffer_t`-style batching: callers call this periodically
/// (not on every commit) with the oldest `begin_ts` among still-open
/// sessions as `watermark`, so nothing visible to an open snapshot is
/// reclaimed.
pub fn mark_entries_committed(committed: &ConcreteIndex, watermark: TxId, batch_limit: usize) -> usize {
    committed.collect_garbage(watermark, batch_limit)
}

/// Rebuilds `index` from scratch by projecting `rows` (already-decoded
/// `(Key, Locator, TxId, Offset)` tuples for every live row of the
/// indexed table) and inserting them as committed entries. Used when an
/// index is created after rows already exist, mirroring
/// `index_builder_t::populate_index` in `original_source/`.
pub fn populate_index(index: &ConcreteIndex, rows: impl IntoIterator<Item = (Key, IndexEntry)>) -> Result<()> {
    for (key, entry) in rows {
        index.insert(key, entry)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::hash::HashIndex;
    use crate::index::{IndexMeta, IndexOp};
    use crate::key::Holder;
    use graphdb_primitives::{IndexId, Locator, Offset, TableId};

    fn meta(unique: bool) -> IndexMeta {
        IndexMeta {
            index_id: IndexId(1),
            table_id: TableId(1),
            unique,
        }
    }

    fn key(n: i32) -> Key {
        Key::single(Holder::I32(Some(n)))
    }

    #[test]
    fn create_then_update_then_remove_round_trips_through_a_delta() {
        let mut delta = TxIndexDelta::new();
        update_index_from_log_record(
            &mut delta,
            &LogRecord {
                locator: Locator(1),
                old_offset: Offset::NONE,
                new_offset: Offset(1),
                op: Op::Create,
                txn_id: TxId(1),
            },
            None,
            Some(key(1)),
        );
        update_index_from_log_record(
            &mut delta,
            &LogRecord {
                locator: Locator(1),
                old_offset: Offset(1),
                new_offset: Offset(2),
                op: Op::Update,
                txn_id: TxId(1),
            },
            Some(key(1)),
            Some(key(2)),
        );
        assert_eq!(delta.iter().count(), 3);

        let committed = ConcreteIndex::Hash(HashIndex::new(meta(false)));
        merge_into_committed(&delta, &committed).unwrap();
        let live: Vec<_> = committed.iter_all().into_iter().filter(|(_, e)| e.op == IndexOp::Insert).collect();
        assert_eq!(live.len(), 2);
    }

    #[test]
    fn same_txn_duplicate_insert_is_allowed_in_the_delta_but_fails_at_merge() {
        let mut delta = TxIndexDelta::new();
        update_index_from_log_record(
            &mut delta,
            &LogRecord {
                locator: Locator(1),
                old_offset: Offset::NONE,
                new_offset: Offset(1),
                op: Op::Create,
                txn_id: TxId(1),
            },
            None,
            Some(key(7)),
        );
        update_index_from_log_record(
            &mut delta,
            &LogRecord {
                locator: Locator(2),
                old_offset: Offset::NONE,
                new_offset: Offset(2),
                op: Op::Create,
                txn_id: TxId(1),
            },
            None,
            Some(key(7)),
        );
        assert_eq!(delta.iter().count(), 2, "no uniqueness check happens while building the delta");

        let committed = ConcreteIndex::Hash(HashIndex::new(meta(true)));
        let err = merge_into_committed(&delta, &committed).unwrap_err();
        assert!(matches!(err, crate::error::EngineError::UniqueConstraintViolation(_)));
    }

    #[test]
    fn gc_sweep_reclaims_superseded_entries() {
        let committed = ConcreteIndex::Hash(HashIndex::new(meta(false)));
        committed
            .insert(
                key(1),
                IndexEntry {
                    locator: Locator(1),
                    txn_id: TxId(1),
                    offset: Offset(1),
                    op: IndexOp::Insert,
                },
            )
            .unwrap();
        committed
            .insert(
                key(1),
                IndexEntry {
                    locator: Locator(1),
                    txn_id: TxId(2),
                    offset: Offset(1),
                    op: IndexOp::Remove,
                },
            )
            .unwrap();
        let reclaimed = mark_entries_committed(&committed, TxId(10), 64);
        assert_eq!(reclaimed, 2);
        assert!(committed.is_empty());
    }
}
