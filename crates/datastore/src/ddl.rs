//! Catalog DDL (component C's write half).
//!
//! Creates databases, tables, relationships, and indexes. Per spec §4.C,
//! catalog-owned metadata skips the auto-connect (I) and referential-
//! integrity (H) paths that apply to ordinary objects — these functions
//! never go through [`crate::object`] at all, they mutate the engine's
//! [`crate::catalog::Catalog`] and index registry directly under their own
//! locks. A fully self-hosting catalog (`st_table` et al. materialized as
//! ordinary objects, per the teacher's own bootstrap tables) is recorded
//! as a deliberate simplification in `DESIGN.md`: these calls are not
//! journaled through the transaction log or the commit lock, since they
//! never touch object data or locators.

use crate::catalog::{FieldSchema, IndexSchema, RelationshipSchema, TableSchema};
use crate::engine::Engine;
use crate::error::Result;
use crate::index::hash::HashIndex;
use crate::index::maintenance;
use crate::index::range::RangeIndex;
use crate::index::{ConcreteIndex, IndexEntry, IndexMeta, IndexOp};
use crate::key::HolderKind;
use crate::payload::{BinarySchema, FieldSlot};
use graphdb_primitives::{Cardinality, ColPos, DatabaseId, IndexId, IndexKind, RelationshipId, TableId, TxId};

/// One field to declare when creating a table; `position` is assigned by
/// [`create_table`] in declaration order, starting at 0.
#[derive(Clone, Debug)]
pub struct FieldSpec {
    pub name: String,
    pub kind: HolderKind,
    pub optional: bool,
    pub repeated_count: u16,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: HolderKind) -> Self {
        FieldSpec {
            name: name.into(),
            kind,
            optional: false,
            repeated_count: 1,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

pub fn create_database(engine: &Engine, name: impl Into<String>) -> DatabaseId {
    let _ = name;
    engine.catalog.write().allocate_database_id()
}

/// Registers a new table and returns its id. `is_system` should only ever
/// be `true` for the engine's own bootstrap tables.
pub fn create_table(engine: &Engine, database_id: DatabaseId, name: impl Into<String>, fields: &[FieldSpec], is_system: bool) -> TableId {
    let mut catalog = engine.catalog.write();
    let table_id = catalog.allocate_table_id();
    let mut schema_fields = Vec::with_capacity(fields.len());
    for (i, f) in fields.iter().enumerate() {
        let position = ColPos(i as u16);
        schema_fields.push(FieldSlot {
            name: f.name.clone(),
            kind: f.kind,
            optional: f.optional,
            repeated_count: f.repeated_count,
            position,
            active: true,
        });
        catalog.register_field(FieldSchema {
            table_id,
            name: f.name.clone(),
            kind: f.kind,
            optional: f.optional,
            repeated_count: f.repeated_count,
            position,
            active: true,
        });
    }
    catalog.register_table(TableSchema {
        table_id,
        database_id,
        name: name.into(),
        is_system,
        schema: BinarySchema { fields: schema_fields },
        num_references: 0,
    });
    table_id
}

/// Registers a one-to-one/one-to-many relationship between `parent_table`
/// and `child_table`, claiming a fresh reference slot on each side (the
/// anchor slot on the parent, the parent/next/prev slots on the child) and
/// a synthetic anchor table id to materialize the chain through, per
/// spec §4.H. `value_link` marks this as a value-linked relationship
/// (component I), naming the parent and child field positions whose
/// equality drives auto-connect.
pub fn create_relationship(
    engine: &Engine,
    parent_table: TableId,
    child_table: TableId,
    cardinality: Cardinality,
    value_link: Option<(ColPos, ColPos)>,
) -> Result<RelationshipId> {
    let mut catalog = engine.catalog.write();
    let relationship_id = catalog.allocate_relationship_id();
    let anchor_table = catalog.allocate_table_id();
    catalog.register_table(TableSchema {
        table_id: anchor_table,
        database_id: catalog.table(parent_table).map(|t| t.database_id).unwrap_or(DatabaseId(0)),
        name: format!("anchor_{}", relationship_id.0),
        is_system: true,
        schema: BinarySchema::default(),
        num_references: 2,
    });

    let first_child_slot = catalog.allocate_reference_slots(parent_table, 1)?;
    let parent_slot = catalog.allocate_reference_slots(child_table, 1)?;
    let next_child_slot = catalog.allocate_reference_slots(child_table, 1)?;
    let prev_child_slot = catalog.allocate_reference_slots(child_table, 1)?;

    catalog.register_relationship(RelationshipSchema {
        relationship_id,
        parent_table,
        child_table,
        cardinality,
        first_child_slot,
        parent_slot,
        next_child_slot,
        prev_child_slot,
        anchor_table,
        value_link,
    });
    Ok(relationship_id)
}

/// Registers an index over `columns` of `table_id`, constructs its
/// backing store (hash or range), registers it in the engine's index
/// registry so scans and maintenance can find it by id, and backfills it
/// against whatever rows of `table_id` are already committed (spec
/// §4.L step 1) — without this, an index created after rows already
/// exist would stay permanently empty for all of them.
pub fn create_index(engine: &Engine, table_id: TableId, columns: Vec<ColPos>, kind: IndexKind, unique: bool) -> Result<IndexId> {
    let (index_id, columns_for_backfill) = {
        let mut catalog = engine.catalog.write();
        let index_id = catalog.allocate_index_id();
        catalog.register_index(IndexSchema {
            index_id,
            table_id,
            columns: columns.clone(),
            kind,
            unique,
        });
        (index_id, columns)
    };
    let meta = IndexMeta { index_id, table_id, unique };
    let concrete = match kind {
        IndexKind::Hash => ConcreteIndex::Hash(HashIndex::new(meta)),
        IndexKind::Range => ConcreteIndex::Range(RangeIndex::new(meta)),
    };
    backfill_index(engine, &concrete, table_id, &columns_for_backfill)?;
    engine.register_index(concrete);
    Ok(index_id)
}

/// Projects `(Key, IndexEntry)` pairs for every already-committed row of
/// `table_id` and inserts them via [`maintenance::populate_index`],
/// mirroring `index_builder_t::populate_index` in `original_source/`. A
/// unique index created against data that already has duplicate values
/// fails here the same way a duplicate insert fails at commit.
fn backfill_index(engine: &Engine, index: &ConcreteIndex, table_id: TableId, columns: &[ColPos]) -> Result<()> {
    let rows = engine.identity.snapshot_bindings().into_iter().filter_map(|(_id, locator)| {
        let offset = engine.locators.committed_offset(locator);
        let record = engine.arena.read().get(offset)?.clone();
        if record.ty != table_id {
            return None;
        }
        let key = engine.catalog.read().project_key(table_id, columns, &record.payload).ok()?;
        Some((
            key,
            IndexEntry {
                locator,
                txn_id: TxId(0),
                offset,
                op: IndexOp::Insert,
            },
        ))
    });
    maintenance::populate_index(index, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn creating_a_table_assigns_sequential_field_positions() {
        let engine = Engine::open(EngineConfig::default()).unwrap();
        let db = create_database(&engine, "test");
        let table = create_table(
            &engine,
            db,
            "widgets",
            &[FieldSpec::new("id", HolderKind::I64), FieldSpec::new("name", HolderKind::Str).optional()],
            false,
        );
        let catalog = engine.catalog.read();
        let schema = &catalog.table(table).unwrap().schema;
        assert_eq!(schema.fields[0].position, ColPos(0));
        assert_eq!(schema.fields[1].position, ColPos(1));
        assert!(schema.fields[1].optional);
    }

    #[test]
    fn creating_a_relationship_claims_distinct_slots_on_each_side() {
        let engine = Engine::open(EngineConfig::default()).unwrap();
        let db = create_database(&engine, "test");
        let parent = create_table(&engine, db, "parent", &[], false);
        let child = create_table(&engine, db, "child", &[], false);
        let rel = create_relationship(&engine, parent, child, Cardinality::Many, None).unwrap();
        let catalog = engine.catalog.read();
        let schema = catalog.relationship(rel).unwrap();
        assert_eq!(catalog.table(parent).unwrap().num_references, 1);
        assert_eq!(catalog.table(child).unwrap().num_references, 3);
        assert_ne!(schema.parent_slot, schema.next_child_slot);
        assert_ne!(schema.next_child_slot, schema.prev_child_slot);
    }

    #[test]
    fn creating_an_index_registers_both_metadata_and_a_live_store() {
        let engine = Engine::open(EngineConfig::default()).unwrap();
        let db = create_database(&engine, "test");
        let table = create_table(&engine, db, "widgets", &[FieldSpec::new("id", HolderKind::I64)], false);
        let index_id = create_index(&engine, table, vec![ColPos(0)], IndexKind::Hash, true).unwrap();
        assert!(engine.with_index(index_id, |_| Ok(())).is_ok());
    }

    #[test]
    fn creating_an_index_backfills_rows_that_already_exist() {
        use crate::key::{Holder, HolderKind as HK};
        use crate::object;
        use crate::payload::encode_row;
        use crate::scan::Predicate;
        use crate::session::{begin_session, begin_txn, commit_txn, rollback_txn};

        let engine = Engine::open(EngineConfig::default()).unwrap();
        begin_session(engine.clone()).unwrap();
        let db = create_database(&engine, "test");
        let table = create_table(&engine, db, "widgets", &[FieldSpec::new("tag", HK::Str)], false);
        let schema = catalog_schema(&engine, table);

        begin_txn().unwrap();
        object::create(table, encode_row(&schema, &[(ColPos(0), Holder::Str(Some("a".into())))])).unwrap();
        object::create(table, encode_row(&schema, &[(ColPos(0), Holder::Str(Some("b".into())))])).unwrap();
        assert!(commit_txn().unwrap());

        // The index is created only after both rows already exist.
        let index_id = create_index(&engine, table, vec![ColPos(0)], IndexKind::Hash, true).unwrap();

        begin_txn().unwrap();
        let rows = object::query_index(index_id, Predicate::EqualRange(crate::key::Key::single(Holder::Str(Some("a".into())))), None).unwrap();
        assert_eq!(rows.len(), 1);
        rollback_txn().unwrap();
    }

    fn catalog_schema(engine: &Engine, table: TableId) -> BinarySchema {
        engine.catalog.read().table(table).unwrap().schema.clone()
    }
}
