//! Catalog view (component C).
//!
//! The catalog is itself a set of tables living in the engine: the very
//! first tables ever created are the catalog tables. Operations on
//! catalog-owned types skip the auto-connect (component I) and
//! reference-check (component H) paths that would otherwise depend on a
//! catalog that doesn't exist yet — see [`TableSchema::is_system`].

use crate::error::{EngineError, Result};
use crate::key::{HolderKind, Key};
use crate::payload::{self, BinarySchema};
use graphdb_primitives::{Cardinality, ColPos, DatabaseId, IndexId, IndexKind, RelationshipId, TableId};
use std::collections::HashMap;

#[derive(Clone, Debug)]
pub struct TableSchema {
    pub table_id: TableId,
    pub database_id: DatabaseId,
    pub name: String,
    pub is_system: bool,
    pub schema: BinarySchema,
    /// Number of slots in every object's `references[]` array for this
    /// table, including anchor/sibling-chain slots claimed by
    /// relationships.
    pub num_references: u16,
}

#[derive(Clone, Debug)]
pub struct FieldSchema {
    pub table_id: TableId,
    pub name: String,
    pub kind: HolderKind,
    pub optional: bool,
    pub repeated_count: u16,
    pub position: ColPos,
    pub active: bool,
}

#[derive(Clone, Debug)]
pub struct RelationshipSchema {
    pub relationship_id: RelationshipId,
    pub parent_table: TableId,
    pub child_table: TableId,
    pub cardinality: Cardinality,
    /// Slot in the parent's `references[]` holding the anchor id.
    pub first_child_slot: u16,
    /// Slot in the child's `references[]` holding the anchor id.
    pub parent_slot: u16,
    /// Slot in the child's `references[]` holding the next-sibling id.
    pub next_child_slot: u16,
    /// Slot in the child's `references[]` holding the prev-sibling id.
    pub prev_child_slot: u16,
    /// Table id of the synthetic anchor object this relationship
    /// materializes chains through. Anchor records always have exactly
    /// two reference slots: `[0] = parent id`, `[1] = first-child id`.
    pub anchor_table: TableId,
    /// If this is a value-linked relationship, the field positions whose
    /// equality drives auto-connect/disconnect.
    pub value_link: Option<(ColPos, ColPos)>,
}

#[derive(Clone, Debug)]
pub struct IndexSchema {
    pub index_id: graphdb_primitives::IndexId,
    pub table_id: TableId,
    pub columns: Vec<ColPos>,
    pub kind: IndexKind,
    pub unique: bool,
}

/// The catalog's own in-memory bootstrap state: every table/field/
/// relationship/index record, held as plain structs rather than objects
/// stored through the general object machinery, so that the engine can
/// answer catalog queries before any user table exists.
#[derive(Default)]
pub struct Catalog {
    tables: HashMap<TableId, TableSchema>,
    fields: HashMap<TableId, Vec<FieldSchema>>,
    relationships_from: HashMap<TableId, Vec<RelationshipSchema>>,
    relationships_to: HashMap<TableId, Vec<RelationshipSchema>>,
    relationships: HashMap<RelationshipId, RelationshipSchema>,
    indexes: HashMap<TableId, Vec<IndexSchema>>,
    type_to_table: HashMap<TableId, TableId>,
    next_database_id: u32,
    next_table_id: u32,
    next_relationship_id: u32,
    next_index_id: u32,
}

impl Catalog {
    pub fn new() -> Self {
        Catalog {
            next_database_id: 1,
            next_table_id: 1,
            next_relationship_id: 1,
            next_index_id: 1,
            ..Self::default()
        }
    }

    /// Allocates the next id in each DDL namespace. Catalog mutation runs
    /// under the engine's catalog `RwLock` write guard, so a plain counter
    /// (rather than an `AtomicU32`) is enough — there is never a concurrent
    /// reader of `next_*` while a writer holds `&mut self`.
    pub fn allocate_database_id(&mut self) -> DatabaseId {
        let id = self.next_database_id;
        self.next_database_id += 1;
        DatabaseId(id)
    }

    pub fn allocate_table_id(&mut self) -> TableId {
        let id = self.next_table_id;
        self.next_table_id += 1;
        TableId(id)
    }

    pub fn allocate_relationship_id(&mut self) -> RelationshipId {
        let id = self.next_relationship_id;
        self.next_relationship_id += 1;
        RelationshipId(id)
    }

    pub fn allocate_index_id(&mut self) -> IndexId {
        let id = self.next_index_id;
        self.next_index_id += 1;
        IndexId(id)
    }

    /// Reserves `count` contiguous slots at the end of `table_id`'s
    /// `references[]` array (for a relationship's anchor/sibling-chain
    /// slots) and returns the first reserved slot.
    pub fn allocate_reference_slots(&mut self, table_id: TableId, count: u16) -> Result<u16> {
        let table = self.tables.get_mut(&table_id).ok_or(EngineError::InvalidObjectType(table_id))?;
        let start = table.num_references;
        table.num_references += count;
        Ok(start)
    }

    pub fn register_table(&mut self, schema: TableSchema) {
        self.type_to_table.insert(schema.table_id, schema.table_id);
        self.tables.insert(schema.table_id, schema);
    }

    pub fn register_field(&mut self, field: FieldSchema) {
        self.fields.entry(field.table_id).or_default().push(field);
    }

    pub fn register_relationship(&mut self, rel: RelationshipSchema) {
        self.relationships_from.entry(rel.parent_table).or_default().push(rel.clone());
        self.relationships_to.entry(rel.child_table).or_default().push(rel.clone());
        self.relationships.insert(rel.relationship_id, rel);
    }

    pub fn relationship(&self, id: RelationshipId) -> Option<&RelationshipSchema> {
        self.relationships.get(&id)
    }

    pub fn register_index(&mut self, index: IndexSchema) {
        self.indexes.entry(index.table_id).or_default().push(index);
    }

    pub fn drop_table(&mut self, table_id: TableId) {
        self.tables.remove(&table_id);
        self.fields.remove(&table_id);
        self.indexes.remove(&table_id);
        self.type_to_table.remove(&table_id);
    }

    pub fn drop_relationship(&mut self, relationship_id: RelationshipId) {
        for list in self.relationships_from.values_mut() {
            list.retain(|r| r.relationship_id != relationship_id);
        }
        for list in self.relationships_to.values_mut() {
            list.retain(|r| r.relationship_id != relationship_id);
        }
        self.relationships.remove(&relationship_id);
    }

    pub fn table(&self, table_id: TableId) -> Option<&TableSchema> {
        self.tables.get(&table_id)
    }

    pub fn list_tables(&self, database_id: DatabaseId) -> impl Iterator<Item = &TableSchema> {
        self.tables.values().filter(move |t| t.database_id == database_id)
    }

    pub fn list_fields(&self, table_id: TableId) -> impl Iterator<Item = &FieldSchema> {
        self.fields.get(&table_id).into_iter().flatten()
    }

    pub fn list_indexes(&self, table_id: TableId) -> impl Iterator<Item = &IndexSchema> {
        self.indexes.get(&table_id).into_iter().flatten()
    }

    pub fn list_relationships_from(&self, table_id: TableId) -> impl Iterator<Item = &RelationshipSchema> {
        self.relationships_from.get(&table_id).into_iter().flatten()
    }

    pub fn list_relationships_to(&self, table_id: TableId) -> impl Iterator<Item = &RelationshipSchema> {
        self.relationships_to.get(&table_id).into_iter().flatten()
    }

    pub fn type_to_table(&self, ty: TableId) -> Option<TableId> {
        self.type_to_table.get(&ty).copied()
    }

    pub fn is_system(&self, table_id: TableId) -> bool {
        self.tables.get(&table_id).map(|t| t.is_system).unwrap_or(false)
    }

    /// Builds an index [`Key`] directly from a row's encoded payload,
    /// projecting `columns` in order via the table's [`BinarySchema`] —
    /// the `index_key_t`-style reflection helper from SPEC_FULL §2, so
    /// callers never have to hand-decode fields just to maintain an
    /// index.
    pub fn project_key(&self, table_id: TableId, columns: &[ColPos], payload_bytes: &[u8]) -> Result<Key> {
        let schema = &self.table(table_id).expect("project_key called on an unregistered table").schema;
        let holders = columns
            .iter()
            .map(|pos| payload::read_field(schema, payload_bytes, *pos))
            .collect::<Result<Vec<_>>>()?;
        Ok(Key::new(holders))
    }

    /// The relationship (if any) under which `table_id` participates as a
    /// child with a value-linked field at `pos`.
    pub fn value_linked_child_relationship(&self, table_id: TableId, pos: ColPos) -> Option<&RelationshipSchema> {
        self.relationships_to
            .get(&table_id)
            .into_iter()
            .flatten()
            .find(|r| matches!(r.value_link, Some((_, child_pos)) if child_pos == pos))
    }

    /// The relationship (if any) under which `table_id` participates as a
    /// parent with a value-linked field at `pos`.
    pub fn value_linked_parent_relationship(&self, table_id: TableId, pos: ColPos) -> Option<&RelationshipSchema> {
        self.relationships_from
            .get(&table_id)
            .into_iter()
            .flatten()
            .find(|r| matches!(r.value_link, Some((parent_pos, _)) if parent_pos == pos))
    }
}
