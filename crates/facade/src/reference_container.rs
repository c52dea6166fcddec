//! Typed relationship container (component M): the sibling chain under one
//! parent object for one relationship, viewed as a collection of
//! `Object<C>` handles.

use crate::entity::Entity;
use crate::error::Result;
use crate::expr::{self, Expr};
use crate::object::Object;
use crate::writer::Writer;
use graphdb_datastore::{object, reference};
use graphdb_primitives::{ObjectId, RelationshipId};
use std::marker::PhantomData;

pub struct ReferenceContainer<C> {
    parent_id: ObjectId,
    relationship_id: RelationshipId,
    _marker: PhantomData<fn() -> C>,
}

impl<C: Entity> ReferenceContainer<C> {
    pub fn new(parent_id: ObjectId, relationship_id: RelationshipId) -> Self {
        ReferenceContainer {
            parent_id,
            relationship_id,
            _marker: PhantomData,
        }
    }

    /// Creates a new child row of `C` and attaches it under this
    /// container's parent in one step.
    pub fn insert(&self, value: C) -> Result<Object<C>> {
        let child = Writer::new(value).insert()?;
        self.connect(&child)?;
        Ok(child)
    }

    /// Attaches an already-existing child object under this container's
    /// parent, per [`graphdb_datastore::reference::insert_into_container`].
    pub fn connect(&self, child: &Object<C>) -> Result<()> {
        reference::insert_into_container(self.parent_id, child.id(), self.relationship_id)?;
        Ok(())
    }

    /// Detaches `child` from this container without deleting it.
    pub fn disconnect(&self, child: &Object<C>) -> Result<()> {
        reference::remove_from_container(child.id(), self.relationship_id)?;
        Ok(())
    }

    /// Detaches `child` from this container and deletes it.
    pub fn erase(&self, child: &Object<C>) -> Result<()> {
        self.disconnect(child)?;
        object::remove(child.id(), false)?;
        log::debug!("erased {} from relationship {:?}", child.id(), self.relationship_id);
        Ok(())
    }

    /// Detaches every child currently in this container, leaving each one
    /// otherwise intact.
    pub fn clear(&self) -> Result<()> {
        for id in reference::children(self.parent_id, self.relationship_id)? {
            reference::remove_from_container(id, self.relationship_id)?;
        }
        Ok(())
    }

    pub fn iter(&self) -> Result<Vec<Object<C>>> {
        Ok(reference::children(self.parent_id, self.relationship_id)?.into_iter().map(Object::new).collect())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(reference::children(self.parent_id, self.relationship_id)?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Every child for which `expr` evaluates to `Value::Bool(true)`.
    /// `IsEmpty`/`Count` nodes in `expr` are resolved against each child's
    /// own id, not the parent's.
    pub fn where_(&self, expr: &Expr) -> Result<Vec<Object<C>>> {
        let schema = C::schema();
        let mut out = Vec::new();
        for id in reference::children(self.parent_id, self.relationship_id)? {
            let Some(bytes) = object::get(id)? else { continue };
            let children_of = |rel: RelationshipId| -> Result<Vec<ObjectId>> { Ok(reference::children(id, rel)?) };
            if matches!(expr::eval(expr, &schema, &bytes, &children_of)?, expr::Value::Bool(true)) {
                out.push(Object::new(id));
            }
        }
        Ok(out)
    }
}
