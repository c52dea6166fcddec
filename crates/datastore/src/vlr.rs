//! Value-linked connector (component I).
//!
//! Auto-connect/disconnect driven purely by field-value equality: when an
//! object is created, or an update changes a field that participates in a
//! value-linked relationship (VLR), the matching side of the chain is
//! re-resolved via the linked field's index. Called by the object API
//! (component "object") after every payload write, once per changed
//! column a VLR tracks — see [`crate::payload::diff`].
//!
//! Each step below calls [`with_txn`] separately rather than threading one
//! borrow through the whole operation: [`crate::reference`]'s primitives
//! are themselves `with_txn`-wrapped, and `with_txn`'s thread-local borrow
//! is not reentrant, so a read here and a write in `reference` must never
//! share one borrow.

use crate::catalog::RelationshipSchema;
use crate::engine::Engine;
use crate::error::Result;
use crate::key::Key;
use crate::locator::Snapshot;
use crate::payload;
use crate::reference;
use crate::scan::{self, Predicate};
use crate::session::{with_txn, TxnState};
use graphdb_primitives::{ColPos, ObjectId, TableId};

/// Re-resolves every VLR side affected by a write to `changed_positions`
/// on `object_id` (of `table_id`). A no-op for catalog-owned tables,
/// whose bootstrap happens before any index exists to drive this.
pub fn on_object_written(table_id: TableId, object_id: ObjectId, changed_positions: &[ColPos]) -> Result<()> {
    let (parent_rels, child_rels) = with_txn(|engine, _txn| {
        let catalog = engine.catalog.read();
        if catalog.is_system(table_id) {
            return Ok((Vec::new(), Vec::new()));
        }
        let mut parent_rels = Vec::new();
        let mut child_rels = Vec::new();
        for pos in changed_positions {
            if let Some(rel) = catalog.value_linked_parent_relationship(table_id, *pos) {
                parent_rels.push(rel.clone());
            }
            if let Some(rel) = catalog.value_linked_child_relationship(table_id, *pos) {
                child_rels.push(rel.clone());
            }
        }
        Ok((parent_rels, child_rels))
    })?;
    for rel in &parent_rels {
        parent_side_connect(rel, object_id)?;
    }
    for rel in &child_rels {
        child_side_connect(rel, object_id)?;
    }
    Ok(())
}

/// First live match for `key` on `table_id`'s single-column index over
/// `col`, if one is registered. Every value-linked field is required to
/// carry such an index (SPEC_FULL §3.I), so a missing index here just
/// means no rows can be matched yet.
fn find_one_by_value(engine: &Engine, snapshot: &Snapshot, table_id: TableId, col: ColPos, key: Key) -> Result<Option<ObjectId>> {
    let index_id = {
        let catalog = engine.catalog.read();
        catalog.list_indexes(table_id).find(|idx| idx.columns.len() == 1 && idx.columns[0] == col).map(|idx| idx.index_id)
    };
    let Some(index_id) = index_id else { return Ok(None) };
    let rows = engine.with_index(index_id, |index| scan::scan(index, None, snapshot, &Predicate::EqualRange(key), Some(1)))?;
    let Some(row) = rows.into_iter().next() else { return Ok(None) };
    Ok(engine.arena.read().get(row.offset).map(|rec| rec.id))
}

fn field_key(engine: &Engine, txn: &TxnState, table_id: TableId, object_id: ObjectId, pos: ColPos) -> Result<Key> {
    let locator = engine.identity.locator_of(object_id).expect("object must exist to have been written");
    let offset = txn.snapshot.get(locator);
    let record = engine.arena.read().get(offset).cloned().expect("just-written record must be present");
    let schema = engine.catalog.read().table(table_id).expect("table must be registered").schema.clone();
    Ok(Key::single(payload::read_field(&schema, &record.payload, pos)?))
}

fn anchor_of(engine: &Engine, txn: &TxnState, object_id: ObjectId, slot: u16) -> Result<ObjectId> {
    let locator = engine.identity.locator_of(object_id).expect("object must exist");
    let offset = txn.snapshot.get(locator);
    let record = engine.arena.read().get(offset).cloned().expect("object must be live");
    Ok(record.references[slot as usize])
}

/// Parent-side auto-connect: attach (or newly create) the anchor for
/// `rel` under `parent_id`'s first-child slot, matched by value against
/// the child table's linked field.
fn parent_side_connect(rel: &RelationshipSchema, parent_id: ObjectId) -> Result<()> {
    let (parent_pos, child_pos) = rel.value_link.expect("parent_side_connect requires a value-linked relationship");
    let key = with_txn(|engine, txn| field_key(engine, txn, rel.parent_table, parent_id, parent_pos))?;
    let matched_child = with_txn(|engine, txn| find_one_by_value(engine, &txn.snapshot, rel.child_table, child_pos, key.clone()))?;
    let current_anchor = with_txn(|engine, txn| anchor_of(engine, txn, parent_id, rel.first_child_slot))?;

    match matched_child {
        Some(child_id) => {
            let child_anchor = with_txn(|engine, txn| anchor_of(engine, txn, child_id, rel.parent_slot))?;
            if current_anchor.is_valid() && current_anchor == child_anchor {
                return Ok(());
            }
            if current_anchor.is_valid() {
                reference::detach_parent_anchor(parent_id, rel.relationship_id)?;
            }
            if child_anchor.is_valid() {
                reference::reparent_anchor(child_anchor, parent_id, rel.first_child_slot)?;
            } else {
                reference::insert_into_container(parent_id, child_id, rel.relationship_id)?;
            }
        }
        None => {
            if !current_anchor.is_valid() {
                reference::create_empty_anchor(parent_id, rel.relationship_id)?;
            }
        }
    }
    Ok(())
}

/// Child-side auto-connect: detach from the current chain (if any) and
/// splice into whichever anchor now matches by value — a parent's anchor
/// if one has a matching field, else another child's anchor, else a
/// fresh lone-child anchor.
fn child_side_connect(rel: &RelationshipSchema, child_id: ObjectId) -> Result<()> {
    let (parent_pos, child_pos) = rel.value_link.expect("child_side_connect requires a value-linked relationship");
    reference::remove_from_container(child_id, rel.relationship_id)?;

    let key = with_txn(|engine, txn| field_key(engine, txn, rel.child_table, child_id, child_pos))?;

    if let Some(parent_id) = with_txn(|engine, txn| find_one_by_value(engine, &txn.snapshot, rel.parent_table, parent_pos, key.clone()))? {
        reference::insert_into_container(parent_id, child_id, rel.relationship_id)?;
        return Ok(());
    }

    if let Some(sibling_id) = with_txn(|engine, txn| find_sibling_with_same_value(engine, &txn.snapshot, rel, child_id, key.clone()))? {
        let sibling_anchor = with_txn(|engine, txn| anchor_of(engine, txn, sibling_id, rel.parent_slot))?;
        if sibling_anchor.is_valid() {
            reference::splice_into_anchor(child_id, sibling_anchor, rel.relationship_id)?;
            return Ok(());
        }
    }

    reference::create_lone_child_anchor(child_id, rel.relationship_id)
}

fn find_sibling_with_same_value(engine: &Engine, snapshot: &Snapshot, rel: &RelationshipSchema, self_id: ObjectId, key: Key) -> Result<Option<ObjectId>> {
    let (_, child_pos) = rel.value_link.expect("value-linked relationship");
    let index_id = {
        let catalog = engine.catalog.read();
        catalog
            .list_indexes(rel.child_table)
            .find(|idx| idx.columns.len() == 1 && idx.columns[0] == child_pos)
            .map(|idx| idx.index_id)
    };
    let Some(index_id) = index_id else { return Ok(None) };
    let rows = engine.with_index(index_id, |index| scan::scan(index, None, snapshot, &Predicate::EqualRange(key), None))?;
    for row in rows {
        if let Some(rec) = engine.arena.read().get(row.offset) {
            if rec.id != self_id {
                return Ok(Some(rec.id));
            }
        }
    }
    Ok(None)
}
