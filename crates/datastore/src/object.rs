//! Object API (component "object", spec §6).
//!
//! The thin surface every higher-level API (including the facade crate)
//! is built on: create/update/remove a row's payload, keeping every index
//! registered on its table and every value-linked relationship touching
//! its changed columns in sync. Every operation here runs inside the
//! caller's open transaction via [`with_txn`]; [`crate::vlr::on_object_written`]
//! is always called *after* `with_txn` returns, never from inside it — see
//! the reentrancy note on [`crate::vlr`].

use crate::catalog::TableSchema;
use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::key::Key;
use crate::payload;
use crate::record::ObjectRecord;
use crate::reference;
use crate::scan::{self, Predicate};
use crate::session::{with_txn, TxnState};
use crate::txlog::{LogRecord, Op};
use crate::vlr;
use graphdb_primitives::{IndexId, ObjectId, Offset, TableId};

fn table_schema(engine: &Engine, table_id: TableId) -> Result<TableSchema> {
    engine.catalog.read().table(table_id).cloned().ok_or(EngineError::InvalidObjectType(table_id))
}

/// Projects and records index deltas for every index on `table` touched
/// by this write. `old_payload` is `None` on create; `new_payload` is
/// always present (a remove is handled separately, in [`remove`]).
fn index_new_row(engine: &Engine, txn: &mut TxnState, table: &TableSchema, rec: &LogRecord, old_payload: Option<&[u8]>, new_payload: &[u8]) -> Result<()> {
    let indexes: Vec<_> = engine.catalog.read().list_indexes(table.table_id).cloned().collect();
    for idx in indexes {
        let new_key = engine.catalog.read().project_key(table.table_id, &idx.columns, new_payload)?;
        let old_key = old_payload.map(|p| engine.catalog.read().project_key(table.table_id, &idx.columns, p)).transpose()?;
        txn.record_index_update(idx.index_id, rec, old_key, Some(new_key));
    }
    Ok(())
}

/// Creates a new object of `table_id` with a freshly allocated id.
pub fn create(table_id: TableId, payload_bytes: Vec<u8>) -> Result<ObjectId> {
    let id = with_txn(|engine, _txn| Ok(engine.identity.allocate_id()))?;
    create_with_id(id, table_id, payload_bytes)?;
    Ok(id)
}

/// Creates a new object of `table_id` at a caller-chosen id, failing with
/// [`EngineError::DuplicateId`] if that id is already bound.
pub fn create_with_id(id: ObjectId, table_id: TableId, payload_bytes: Vec<u8>) -> Result<ObjectId> {
    let changed = with_txn(|engine, txn| create_inner(engine, txn, id, table_id, &payload_bytes))?;
    vlr::on_object_written(table_id, id, &changed)?;
    Ok(id)
}

fn create_inner(engine: &Engine, txn: &mut TxnState, id: ObjectId, table_id: TableId, payload_bytes: &[u8]) -> Result<smallvec::SmallVec<[graphdb_primitives::ColPos; 4]>> {
    if engine.identity.contains(id) {
        return Err(EngineError::DuplicateId(id));
    }
    let table = table_schema(engine, table_id)?;
    let locator = engine.locators.allocate()?;
    engine.identity.bind(id, locator);
    engine.identity.observe_id(id);

    let record = ObjectRecord::new(id, table_id, table.num_references as usize, payload_bytes.to_vec());
    let new_offset = engine.arena.write().push(record)?;
    txn.snapshot.set(locator, new_offset);
    let rec = LogRecord {
        locator,
        old_offset: Offset::NONE,
        new_offset,
        op: Op::Create,
        txn_id: txn.txn_id,
    };
    txn.log.append(rec.clone())?;
    index_new_row(engine, txn, &table, &rec, None, payload_bytes)?;

    // Every field is "changed" relative to a nonexistent prior row.
    Ok(table.schema.fields.iter().filter(|f| f.active).map(|f| f.position).collect())
}

/// Replaces `id`'s payload wholesale, re-maintaining every index and
/// value-linked relationship touched by the fields that actually changed.
pub fn update_payload(id: ObjectId, new_payload: Vec<u8>) -> Result<()> {
    let (table_id, changed) = with_txn(|engine, txn| update_payload_inner(engine, txn, id, &new_payload))?;
    vlr::on_object_written(table_id, id, &changed)?;
    Ok(())
}

fn update_payload_inner(engine: &Engine, txn: &mut TxnState, id: ObjectId, new_payload: &[u8]) -> Result<(TableId, smallvec::SmallVec<[graphdb_primitives::ColPos; 4]>)> {
    let locator = engine.identity.locator_of(id).ok_or(EngineError::InvalidObjectId(id))?;
    let old_offset = txn.snapshot.get(locator);
    let old_record = engine.arena.read().get(old_offset).cloned().ok_or(EngineError::InvalidObjectId(id))?;
    let table = table_schema(engine, old_record.ty)?;

    let new_record = old_record.with_payload(new_payload.to_vec());
    let new_offset = engine.arena.write().push(new_record)?;
    txn.snapshot.set(locator, new_offset);
    let rec = LogRecord {
        locator,
        old_offset,
        new_offset,
        op: Op::Update,
        txn_id: txn.txn_id,
    };
    txn.log.append(rec.clone())?;
    index_new_row(engine, txn, &table, &rec, Some(&old_record.payload), new_payload)?;

    let changed = payload::diff(&table.schema, &old_record.payload, new_payload);
    Ok((old_record.ty, changed))
}

/// Captures what deindexing `id` will need, without touching any index
/// delta yet: if the subsequent [`reference::delete_object`] call fails
/// (e.g. `ObjectStillReferenced` without `force`), nothing here should
/// have been recorded against the transaction.
struct PendingRemoval {
    locator: graphdb_primitives::Locator,
    offset: Offset,
    table: TableSchema,
    payload: Vec<u8>,
}

fn capture_for_removal(engine: &Engine, txn: &TxnState, id: ObjectId) -> Result<PendingRemoval> {
    let locator = engine.identity.locator_of(id).ok_or(EngineError::InvalidObjectId(id))?;
    let offset = txn.snapshot.get(locator);
    let record = engine.arena.read().get(offset).cloned().ok_or(EngineError::InvalidObjectId(id))?;
    let table = table_schema(engine, record.ty)?;
    Ok(PendingRemoval {
        locator,
        offset,
        table,
        payload: record.payload,
    })
}

/// Deletes `id`, removing it from every index it was a member of.
/// Referential-integrity checks (and `force` semantics) are delegated to
/// [`reference::delete_object`]; index cleanup only runs once that
/// succeeds, so a failed delete never pollutes the transaction's index
/// deltas.
pub fn remove(id: ObjectId, force: bool) -> Result<()> {
    let pending = with_txn(|engine, txn| capture_for_removal(engine, txn, id))?;
    reference::delete_object(id, force)?;
    with_txn(|engine, txn| {
        let indexes: Vec<_> = engine.catalog.read().list_indexes(pending.table.table_id).cloned().collect();
        for idx in indexes {
            let key: Key = engine.catalog.read().project_key(pending.table.table_id, &idx.columns, &pending.payload)?;
            let rec = LogRecord {
                locator: pending.locator,
                old_offset: pending.offset,
                new_offset: Offset::NONE,
                op: Op::Remove,
                txn_id: txn.txn_id,
            };
            txn.record_index_update(idx.index_id, &rec, Some(key), None);
        }
        Ok(())
    })
}

/// Returns the currently visible payload bytes for `id`, or `None` if it
/// does not exist (or is not visible to the caller's snapshot).
pub fn get(id: ObjectId) -> Result<Option<Vec<u8>>> {
    with_txn(|engine, txn| {
        let Some(locator) = engine.identity.locator_of(id) else { return Ok(None) };
        let offset = txn.snapshot.get(locator);
        Ok(engine.arena.read().get(offset).map(|r| r.payload.clone()))
    })
}

/// Runs `predicate` against `index_id` (component L), merging in the
/// caller's own uncommitted writes the same way the value-linked connector
/// does, and resolves each surviving row back to an [`ObjectId`].
pub fn query_index(index_id: IndexId, predicate: Predicate, limit: Option<usize>) -> Result<Vec<ObjectId>> {
    with_txn(|engine, txn| {
        let delta = txn.deltas.get(&index_id);
        let rows = engine.with_index(index_id, |index| scan::scan(index, delta, &txn.snapshot, &predicate, limit))?;
        Ok(rows.into_iter().filter_map(|row| engine.arena.read().get(row.offset).map(|rec| rec.id)).collect())
    })
}

/// All object ids of `table_id` currently visible to the caller's
/// snapshot. A full scan over the identity map rather than an index scan:
/// there is always exactly one of these per table, unlike indexes, which
/// are optional.
pub fn find_all(table_id: TableId) -> Result<Vec<ObjectId>> {
    with_txn(|engine, txn| {
        let mut out = Vec::new();
        for (id, locator) in engine.identity.snapshot_bindings() {
            let offset = txn.snapshot.get(locator);
            if let Some(rec) = engine.arena.read().get(offset) {
                if rec.ty == table_id {
                    out.push(id);
                }
            }
        }
        Ok(out)
    })
}
