//! Reference engine (component H).
//!
//! Implements anchor-node creation/teardown and sibling-chain splicing
//! exactly per spec §4.H. Every operation reads the active transaction's
//! snapshot, writes new record versions into the shared arena, and
//! repoints the snapshot — never touching the committed locator map,
//! which only happens at commit (component G).

use crate::catalog::RelationshipSchema;
use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::record::ObjectRecord;
use crate::session::{with_txn, TxnState};
use crate::txlog::{LogRecord, Op};
use graphdb_primitives::{Locator, ObjectId, Offset, RelationshipId};

fn load(engine: &Engine, txn: &TxnState, id: ObjectId) -> Result<(Locator, ObjectRecord)> {
    let locator = engine.identity.locator_of(id).ok_or(EngineError::InvalidObjectId(id))?;
    let offset = txn.snapshot.get(locator);
    let record = engine.arena.read().get(offset).cloned().ok_or(EngineError::InvalidObjectId(id))?;
    Ok((locator, record))
}

fn write(engine: &Engine, txn: &mut TxnState, locator: Locator, old_offset: Offset, new_record: ObjectRecord, op: Op) -> Result<Offset> {
    let new_offset = engine.arena.write().push(new_record)?;
    txn.snapshot.set(locator, new_offset);
    txn.log.append(LogRecord {
        locator,
        old_offset,
        new_offset,
        op,
        txn_id: txn.txn_id,
    })?;
    Ok(new_offset)
}

fn remove(engine: &Engine, txn: &mut TxnState, locator: Locator, old_offset: Offset) -> Result<()> {
    txn.snapshot.set(locator, Offset::NONE);
    txn.log.append(LogRecord {
        locator,
        old_offset,
        new_offset: Offset::NONE,
        op: Op::Remove,
        txn_id: txn.txn_id,
    })
}

fn relationship(engine: &Engine, relationship_id: RelationshipId) -> Result<RelationshipSchema> {
    engine
        .catalog
        .read()
        .relationship(relationship_id)
        .cloned()
        .ok_or(EngineError::InvalidRelationshipType(relationship_id))
}

/// See spec §4.H. Returns `Ok(false)` only for the idempotent case where
/// `child_id` is already the anchor's current head.
pub fn insert_into_container(parent_id: ObjectId, child_id: ObjectId, relationship_id: RelationshipId) -> Result<bool> {
    with_txn(|engine, txn| insert_into_container_inner(engine, txn, parent_id, child_id, relationship_id))
}

fn insert_into_container_inner(engine: &Engine, txn: &mut TxnState, parent_id: ObjectId, child_id: ObjectId, relationship_id: RelationshipId) -> Result<bool> {
    let rel = relationship(engine, relationship_id)?;
    let (parent_loc, parent_rec) = load(engine, txn, parent_id)?;
    let (child_loc, child_rec) = load(engine, txn, child_id)?;
    if parent_rec.ty != rel.parent_table || child_rec.ty != rel.child_table {
        return Err(EngineError::InvalidRelationshipType(relationship_id));
    }
    let anchor_slot = rel.first_child_slot as usize;
    let parent_slot = rel.parent_slot as usize;
    let next_slot = rel.next_child_slot as usize;
    let prev_slot = rel.prev_child_slot as usize;

    if child_rec.references[parent_slot].is_valid() && child_rec.references[parent_slot] == parent_rec.references[anchor_slot] {
        return Ok(false);
    }
    if child_rec.references[parent_slot].is_valid() {
        return Err(EngineError::ChildAlreadyReferenced(child_id));
    }

    let anchor_id = parent_rec.references[anchor_slot];
    if anchor_id.is_valid() {
        let (anchor_loc, anchor_rec) = load(engine, txn, anchor_id)?;
        let old_head = anchor_rec.references[1];
        if rel.cardinality == graphdb_primitives::Cardinality::One && old_head.is_valid() {
            return Err(EngineError::SingleCardinalityViolation(relationship_id, parent_id));
        }

        let new_child = child_rec
            .with_reference(parent_slot, anchor_id)
            .with_reference(next_slot, old_head)
            .with_reference(prev_slot, ObjectId::INVALID);
        write(engine, txn, child_loc, txn.snapshot.get(child_loc), new_child, Op::Update)?;

        if old_head.is_valid() {
            let (head_loc, head_rec) = load(engine, txn, old_head)?;
            let new_head = head_rec.with_reference(prev_slot, child_id);
            write(engine, txn, head_loc, txn.snapshot.get(head_loc), new_head, Op::Update)?;
        }

        let new_anchor = anchor_rec.with_reference(1, child_id);
        write(engine, txn, anchor_loc, txn.snapshot.get(anchor_loc), new_anchor, Op::Update)?;
    } else {
        let new_anchor_id = engine.identity.allocate_id();
        let anchor_record = ObjectRecord::new(new_anchor_id, rel.anchor_table, 2, Vec::new())
            .with_reference(0, parent_id)
            .with_reference(1, child_id);
        let anchor_loc = engine.locators.allocate()?;
        engine.identity.bind(new_anchor_id, anchor_loc);
        write(engine, txn, anchor_loc, Offset::NONE, anchor_record, Op::Create)?;

        let new_parent = parent_rec.with_reference(anchor_slot, new_anchor_id);
        write(engine, txn, parent_loc, txn.snapshot.get(parent_loc), new_parent, Op::Update)?;

        let new_child = child_rec
            .with_reference(parent_slot, new_anchor_id)
            .with_reference(next_slot, ObjectId::INVALID)
            .with_reference(prev_slot, ObjectId::INVALID);
        write(engine, txn, child_loc, txn.snapshot.get(child_loc), new_child, Op::Update)?;
    }
    Ok(true)
}

/// Unlinks `child_id` from whichever chain it currently occupies under
/// `relationship_id`, fixing sibling neighbors and the anchor's head, and
/// deleting the anchor if the chain becomes empty and the anchor is no
/// longer connected to its parent. A no-op (not an error) if the child
/// isn't currently in any chain for this relationship.
pub fn remove_from_container(child_id: ObjectId, relationship_id: RelationshipId) -> Result<()> {
    with_txn(|engine, txn| remove_from_container_inner(engine, txn, child_id, relationship_id))
}

fn remove_from_container_inner(engine: &Engine, txn: &mut TxnState, child_id: ObjectId, relationship_id: RelationshipId) -> Result<()> {
    let rel = relationship(engine, relationship_id)?;
    let (child_loc, child_rec) = load(engine, txn, child_id)?;
    let parent_slot = rel.parent_slot as usize;
    let next_slot = rel.next_child_slot as usize;
    let prev_slot = rel.prev_child_slot as usize;

    let anchor_id = child_rec.references[parent_slot];
    if !anchor_id.is_valid() {
        return Ok(());
    }
    let (anchor_loc, anchor_rec) = load(engine, txn, anchor_id)?;
    let prev_id = child_rec.references[prev_slot];
    let next_id = child_rec.references[next_slot];

    if let Some(prev_id) = prev_id.is_valid().then_some(prev_id) {
        let (prev_loc, prev_rec) = load(engine, txn, prev_id)?;
        let updated = prev_rec.with_reference(next_slot, next_id);
        write(engine, txn, prev_loc, txn.snapshot.get(prev_loc), updated, Op::Update)?;
    }
    if let Some(next_id) = next_id.is_valid().then_some(next_id) {
        let (next_loc, next_rec) = load(engine, txn, next_id)?;
        let updated = next_rec.with_reference(prev_slot, prev_id);
        write(engine, txn, next_loc, txn.snapshot.get(next_loc), updated, Op::Update)?;
    }

    let detached_child = child_rec
        .with_reference(parent_slot, ObjectId::INVALID)
        .with_reference(next_slot, ObjectId::INVALID)
        .with_reference(prev_slot, ObjectId::INVALID);
    write(engine, txn, child_loc, txn.snapshot.get(child_loc), detached_child, Op::Update)?;

    let chain_now_empty = !prev_id.is_valid() && !next_id.is_valid();
    let anchor_parent_connected = anchor_rec.references[0].is_valid();
    if chain_now_empty && !anchor_parent_connected {
        remove(engine, txn, anchor_loc, txn.snapshot.get(anchor_loc))?;
    } else if !prev_id.is_valid() {
        // The removed child was the head; splice the anchor onto the new head.
        let updated_anchor = anchor_rec.with_reference(1, next_id);
        write(engine, txn, anchor_loc, txn.snapshot.get(anchor_loc), updated_anchor, Op::Update)?;
    }
    Ok(())
}

/// Detaches `child_id` from its current chain (if any) under
/// `relationship_id` and attaches it under `new_parent_id`, enforcing
/// cardinality-one on the new parent.
pub fn update_parent_reference(child_id: ObjectId, new_parent_id: ObjectId, relationship_id: RelationshipId) -> Result<()> {
    remove_from_container(child_id, relationship_id)?;
    insert_into_container(new_parent_id, child_id, relationship_id)?;
    Ok(())
}

/// Creates a fresh, childless anchor owned by `parent_id` — the "no
/// matching child yet" case of value-linked auto-connect (component I).
/// No-op if `parent_id` already has an anchor for this relationship.
pub fn create_empty_anchor(parent_id: ObjectId, relationship_id: RelationshipId) -> Result<()> {
    with_txn(|engine, txn| create_empty_anchor_inner(engine, txn, parent_id, relationship_id))
}

fn create_empty_anchor_inner(engine: &Engine, txn: &mut TxnState, parent_id: ObjectId, relationship_id: RelationshipId) -> Result<()> {
    let rel = relationship(engine, relationship_id)?;
    let (parent_loc, parent_rec) = load(engine, txn, parent_id)?;
    let anchor_slot = rel.first_child_slot as usize;
    if parent_rec.references[anchor_slot].is_valid() {
        return Ok(());
    }
    let anchor_id = engine.identity.allocate_id();
    let anchor_record = ObjectRecord::new(anchor_id, rel.anchor_table, 2, Vec::new()).with_reference(0, parent_id);
    let anchor_loc = engine.locators.allocate()?;
    engine.identity.bind(anchor_id, anchor_loc);
    write(engine, txn, anchor_loc, Offset::NONE, anchor_record, Op::Create)?;

    let new_parent = parent_rec.with_reference(anchor_slot, anchor_id);
    write(engine, txn, parent_loc, txn.snapshot.get(parent_loc), new_parent, Op::Update)?;
    Ok(())
}

/// Creates a fresh anchor with no parent, holding only `child_id` — the
/// "no matching parent or sibling" case of value-linked auto-connect.
pub fn create_lone_child_anchor(child_id: ObjectId, relationship_id: RelationshipId) -> Result<()> {
    with_txn(|engine, txn| create_lone_child_anchor_inner(engine, txn, child_id, relationship_id))
}

fn create_lone_child_anchor_inner(engine: &Engine, txn: &mut TxnState, child_id: ObjectId, relationship_id: RelationshipId) -> Result<()> {
    let rel = relationship(engine, relationship_id)?;
    let (child_loc, child_rec) = load(engine, txn, child_id)?;
    let parent_slot = rel.parent_slot as usize;
    if child_rec.references[parent_slot].is_valid() {
        return Ok(());
    }
    let anchor_id = engine.identity.allocate_id();
    let anchor_record = ObjectRecord::new(anchor_id, rel.anchor_table, 2, Vec::new()).with_reference(1, child_id);
    let anchor_loc = engine.locators.allocate()?;
    engine.identity.bind(anchor_id, anchor_loc);
    write(engine, txn, anchor_loc, Offset::NONE, anchor_record, Op::Create)?;

    let new_child = child_rec
        .with_reference(parent_slot, anchor_id)
        .with_reference(rel.next_child_slot as usize, ObjectId::INVALID)
        .with_reference(rel.prev_child_slot as usize, ObjectId::INVALID);
    write(engine, txn, child_loc, txn.snapshot.get(child_loc), new_child, Op::Update)?;
    Ok(())
}

/// Prepends `child_id` onto an existing, already-anchored chain at
/// `anchor_id` without touching the anchor's parent slot — used when
/// value-linked auto-connect finds a sibling whose anchor already
/// exists but `child_id` itself is unattached.
pub fn splice_into_anchor(child_id: ObjectId, anchor_id: ObjectId, relationship_id: RelationshipId) -> Result<()> {
    with_txn(|engine, txn| splice_into_anchor_inner(engine, txn, child_id, anchor_id, relationship_id))
}

fn splice_into_anchor_inner(engine: &Engine, txn: &mut TxnState, child_id: ObjectId, anchor_id: ObjectId, relationship_id: RelationshipId) -> Result<()> {
    let rel = relationship(engine, relationship_id)?;
    let (child_loc, child_rec) = load(engine, txn, child_id)?;
    let parent_slot = rel.parent_slot as usize;
    let next_slot = rel.next_child_slot as usize;
    let prev_slot = rel.prev_child_slot as usize;
    if child_rec.references[parent_slot].is_valid() {
        return Err(EngineError::ChildAlreadyReferenced(child_id));
    }

    let (anchor_loc, anchor_rec) = load(engine, txn, anchor_id)?;
    let old_head = anchor_rec.references[1];

    let new_child = child_rec
        .with_reference(parent_slot, anchor_id)
        .with_reference(next_slot, old_head)
        .with_reference(prev_slot, ObjectId::INVALID);
    write(engine, txn, child_loc, txn.snapshot.get(child_loc), new_child, Op::Update)?;

    if old_head.is_valid() {
        let (head_loc, head_rec) = load(engine, txn, old_head)?;
        let new_head = head_rec.with_reference(prev_slot, child_id);
        write(engine, txn, head_loc, txn.snapshot.get(head_loc), new_head, Op::Update)?;
    }

    let new_anchor = anchor_rec.with_reference(1, child_id);
    write(engine, txn, anchor_loc, txn.snapshot.get(anchor_loc), new_anchor, Op::Update)?;
    Ok(())
}

/// Reparents an existing anchor (found via a matching child during
/// parent-side auto-connect) onto `new_parent_id`, and points the new
/// parent's anchor slot at it. Does not touch the chain itself.
pub fn reparent_anchor(anchor_id: ObjectId, new_parent_id: ObjectId, parent_first_child_slot: u16) -> Result<()> {
    with_txn(|engine, txn| reparent_anchor_inner(engine, txn, anchor_id, new_parent_id, parent_first_child_slot))
}

fn reparent_anchor_inner(engine: &Engine, txn: &mut TxnState, anchor_id: ObjectId, new_parent_id: ObjectId, parent_first_child_slot: u16) -> Result<()> {
    let (anchor_loc, anchor_rec) = load(engine, txn, anchor_id)?;
    let new_anchor = anchor_rec.with_reference(0, new_parent_id);
    write(engine, txn, anchor_loc, txn.snapshot.get(anchor_loc), new_anchor, Op::Update)?;

    let (parent_loc, parent_rec) = load(engine, txn, new_parent_id)?;
    let new_parent = parent_rec.with_reference(parent_first_child_slot as usize, anchor_id);
    write(engine, txn, parent_loc, txn.snapshot.get(parent_loc), new_parent, Op::Update)?;
    Ok(())
}

/// Orphans the anchor currently under `parent_id`'s first-child slot for
/// `relationship_id` by clearing its parent slot, leaving the chain
/// reachable only from the child side until the next GC sweep or a
/// subsequent auto-connect reclaims it. No-op if there is no anchor.
pub fn detach_parent_anchor(parent_id: ObjectId, relationship_id: RelationshipId) -> Result<()> {
    with_txn(|engine, txn| detach_parent_anchor_inner(engine, txn, parent_id, relationship_id))
}

fn detach_parent_anchor_inner(engine: &Engine, txn: &mut TxnState, parent_id: ObjectId, relationship_id: RelationshipId) -> Result<()> {
    let rel = relationship(engine, relationship_id)?;
    let (_, parent_rec) = load(engine, txn, parent_id)?;
    let anchor_id = parent_rec.references[rel.first_child_slot as usize];
    if !anchor_id.is_valid() {
        return Ok(());
    }
    let (anchor_loc, anchor_rec) = load(engine, txn, anchor_id)?;
    let new_anchor = anchor_rec.with_reference(0, ObjectId::INVALID);
    write(engine, txn, anchor_loc, txn.snapshot.get(anchor_loc), new_anchor, Op::Update)?;
    Ok(())
}

/// Lists every child currently in `parent_id`'s chain for `relationship_id`,
/// head to tail. Read-only — callers in the facade crate use this to walk
/// a `ReferenceContainer` without needing to know the chain's internal
/// slot layout.
pub fn children(parent_id: ObjectId, relationship_id: RelationshipId) -> Result<Vec<ObjectId>> {
    with_txn(|engine, txn| children_inner(engine, txn, parent_id, relationship_id))
}

fn children_inner(engine: &Engine, txn: &TxnState, parent_id: ObjectId, relationship_id: RelationshipId) -> Result<Vec<ObjectId>> {
    let rel = relationship(engine, relationship_id)?;
    let (_, parent_rec) = load(engine, txn, parent_id)?;
    let anchor_id = parent_rec.references[rel.first_child_slot as usize];
    if !anchor_id.is_valid() {
        return Ok(Vec::new());
    }
    let (_, anchor_rec) = load(engine, txn, anchor_id)?;
    let mut out = Vec::new();
    let mut next = anchor_rec.references[1];
    while next.is_valid() {
        let (_, child_rec) = load(engine, txn, next)?;
        out.push(next);
        next = child_rec.references[rel.next_child_slot as usize];
    }
    Ok(out)
}

/// Deletes `id`, failing with `ObjectStillReferenced` if it still parents
/// a nonempty chain under any relationship, unless `force` is set, in
/// which case every such chain is detached first. As a child under any
/// relationship, `id` is unlinked from its chain before being removed.
pub fn delete_object(id: ObjectId, force: bool) -> Result<()> {
    with_txn(|engine, txn| delete_object_inner(engine, txn, id, force))
}

fn delete_object_inner(engine: &Engine, txn: &mut TxnState, id: ObjectId, force: bool) -> Result<()> {
    let (_, record) = load(engine, txn, id)?;
    let table_id = record.ty;

    let as_parent: Vec<RelationshipSchema> = engine.catalog.read().list_relationships_from(table_id).cloned().collect();
    for rel in &as_parent {
        let anchor_slot = rel.first_child_slot as usize;
        let (_, current) = load(engine, txn, id)?;
        let anchor_id = current.references[anchor_slot];
        if !anchor_id.is_valid() {
            continue;
        }
        let (anchor_loc, anchor_rec) = load(engine, txn, anchor_id)?;
        if anchor_rec.references[1].is_valid() && !force {
            return Err(EngineError::ObjectStillReferenced(id));
        }
        // Detach every child in the chain, then the anchor itself.
        let mut next = anchor_rec.references[1];
        while next.is_valid() {
            let (child_loc, child_rec) = load(engine, txn, next)?;
            let following = child_rec.references[rel.next_child_slot as usize];
            let detached = child_rec
                .with_reference(rel.parent_slot as usize, ObjectId::INVALID)
                .with_reference(rel.next_child_slot as usize, ObjectId::INVALID)
                .with_reference(rel.prev_child_slot as usize, ObjectId::INVALID);
            write(engine, txn, child_loc, txn.snapshot.get(child_loc), detached, Op::Update)?;
            next = following;
        }
        remove(engine, txn, anchor_loc, txn.snapshot.get(anchor_loc))?;
    }

    let as_child: Vec<RelationshipSchema> = engine.catalog.read().list_relationships_to(table_id).cloned().collect();
    for rel in &as_child {
        remove_from_container_inner(engine, txn, id, rel.relationship_id)?;
    }

    let (locator, _) = load(engine, txn, id)?;
    let current_offset = txn.snapshot.get(locator);
    remove(engine, txn, locator, current_offset)
}
