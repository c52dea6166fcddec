//! Whole-table container (component M).

use crate::entity::Entity;
use crate::error::Result;
use crate::expr::{self, Expr};
use crate::object::Object;
use graphdb_datastore::{object, reference};
use graphdb_primitives::RelationshipId;
use std::marker::PhantomData;

/// Every currently-visible row of `T::table_id()`, scoped to the caller's
/// open transaction.
pub struct Container<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T: Entity> Default for Container<T> {
    fn default() -> Self {
        Container { _marker: PhantomData }
    }
}

impl<T: Entity> Container<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, value: T) -> Result<Object<T>> {
        crate::writer::Writer::new(value).insert()
    }

    pub fn get(&self, id: graphdb_primitives::ObjectId) -> Object<T> {
        Object::new(id)
    }

    pub fn iter(&self) -> Result<Vec<Object<T>>> {
        Ok(object::find_all(T::table_id())?.into_iter().map(Object::new).collect())
    }

    /// Every row for which `expr` evaluates to `Value::Bool(true)`, per
    /// [`crate::expr::eval`]. `IsEmpty`/`Count` nodes in `expr` are
    /// resolved against each row's own id.
    pub fn where_(&self, expr: &Expr) -> Result<Vec<Object<T>>> {
        let schema = T::schema();
        let mut out = Vec::new();
        for id in object::find_all(T::table_id())? {
            let Some(bytes) = object::get(id)? else { continue };
            let children_of = |rel: RelationshipId| -> Result<Vec<graphdb_primitives::ObjectId>> { Ok(reference::children(id, rel)?) };
            if matches!(expr::eval(expr, &schema, &bytes, &children_of)?, expr::Value::Bool(true)) {
                out.push(Object::new(id));
            }
        }
        Ok(out)
    }
}
