//! Typed row builder (component M).
//!
//! `Writer<T>` stages a value and, on [`Writer::insert`], hands its
//! encoded payload to [`graphdb_datastore::object::create`] in one call —
//! the engine's object API only ever writes a whole row at a time (B/E),
//! so there is no partial-field builder state to accumulate here beyond
//! the value itself.

use crate::entity::Entity;
use crate::error::Result;
use crate::object::Object;
use graphdb_datastore::object;
use graphdb_primitives::ObjectId;

pub struct Writer<T> {
    value: T,
}

impl<T: Entity> Writer<T> {
    pub fn new(value: T) -> Self {
        Writer { value }
    }

    /// Creates a new row with a freshly allocated id.
    pub fn insert(self) -> Result<Object<T>> {
        let id = object::create(T::table_id(), self.value.to_payload())?;
        log::debug!("inserted object {id} into table {:?}", T::table_id());
        Ok(Object::new(id))
    }

    /// Creates a new row at a caller-chosen id, failing with
    /// `EngineError::DuplicateId` if it is already in use.
    pub fn insert_with_id(self, id: ObjectId) -> Result<Object<T>> {
        let id = object::create_with_id(id, T::table_id(), self.value.to_payload())?;
        Ok(Object::new(id))
    }
}
