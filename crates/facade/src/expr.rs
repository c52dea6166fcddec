//! Predicate expression algebra (component M, spec §9's "C++
//! expression-builder" strategy note): build a `where` clause either as a
//! plain Rust closure or as this small AST, then evaluate it against one
//! row at a time via [`eval`]. Pushed down to an index scan where the
//! caller already knows the shape (an `Expr::BinOp(Eq, Field(p), Const(k))`
//! over an indexed column is just [`graphdb_datastore::scan::Predicate::EqualRange`]
//! in disguise); otherwise it is evaluated by walking the tree against a
//! decoded row, which is what [`crate::container::Container::where_`] and
//! [`crate::reference_container::ReferenceContainer::where_`] do.

use crate::error::{FacadeError, Result};
use graphdb_datastore::key::Holder;
use graphdb_datastore::payload::{self, BinarySchema};
use graphdb_primitives::{ColPos, RelationshipId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnOp {
    Not,
}

#[derive(Clone, Debug)]
pub enum Expr {
    Field(ColPos),
    Const(Holder),
    BinOp(BinOp, Box<Expr>, Box<Expr>),
    UnOp(UnOp, Box<Expr>),
    /// Whether the field at `ColPos` equals the given `Holder` — distinct
    /// from `BinOp(Eq, ...)` only in name, kept separate so a future
    /// repeated (array-valued) field can implement true membership without
    /// changing the AST shape callers build against.
    Contains(ColPos, Holder),
    /// Whether the object's container for this relationship currently has
    /// no children.
    IsEmpty(RelationshipId),
    /// The number of children currently in this relationship's container,
    /// usable as the left- or right-hand side of a `BinOp` comparison.
    Count(RelationshipId),
}

impl Expr {
    pub fn eq(pos: ColPos, value: Holder) -> Self {
        Expr::BinOp(BinOp::Eq, Box::new(Expr::Field(pos)), Box::new(Expr::Const(value)))
    }

    pub fn and(self, other: Expr) -> Self {
        Expr::BinOp(BinOp::And, Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Expr) -> Self {
        Expr::BinOp(BinOp::Or, Box::new(self), Box::new(other))
    }

    pub fn not(self) -> Self {
        Expr::UnOp(UnOp::Not, Box::new(self))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Holder(Holder),
    Bool(bool),
    Count(i64),
}

impl Value {
    fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(FacadeError::Decode(format!("expected a boolean expression, found {other:?}"))),
        }
    }
}

/// Evaluates `expr` against one row. `schema`/`payload` decode `Field`
/// reads; `children_of` resolves `IsEmpty`/`Count` by returning the
/// object's current children for a relationship (callers pass a closure
/// backed by [`graphdb_datastore::reference::children`] bound to the row's
/// own id).
pub fn eval(expr: &Expr, schema: &BinarySchema, payload: &[u8], children_of: &dyn Fn(RelationshipId) -> Result<Vec<graphdb_primitives::ObjectId>>) -> Result<Value> {
    Ok(match expr {
        Expr::Field(pos) => Value::Holder(payload::read_field(schema, payload, *pos)?),
        Expr::Const(h) => Value::Holder(h.clone()),
        Expr::Contains(pos, want) => {
            let have = payload::read_field(schema, payload, *pos)?;
            Value::Bool(&have == want)
        }
        Expr::IsEmpty(rel) => Value::Bool(children_of(*rel)?.is_empty()),
        Expr::Count(rel) => Value::Count(children_of(*rel)?.len() as i64),
        Expr::UnOp(UnOp::Not, inner) => Value::Bool(!eval(inner, schema, payload, children_of)?.as_bool()?),
        Expr::BinOp(op @ (BinOp::And | BinOp::Or), lhs, rhs) => {
            let l = eval(lhs, schema, payload, children_of)?.as_bool()?;
            let r = eval(rhs, schema, payload, children_of)?.as_bool()?;
            Value::Bool(match op {
                BinOp::And => l && r,
                BinOp::Or => l || r,
                _ => unreachable!(),
            })
        }
        Expr::BinOp(op, lhs, rhs) => {
            let l = eval(lhs, schema, payload, children_of)?;
            let r = eval(rhs, schema, payload, children_of)?;
            Value::Bool(compare(*op, &l, &r)?)
        }
    })
}

fn compare(op: BinOp, l: &Value, r: &Value) -> Result<bool> {
    use std::cmp::Ordering;
    let ord = match (l, r) {
        (Value::Holder(a), Value::Holder(b)) => a.cmp(b),
        (Value::Count(a), Value::Count(b)) => a.cmp(b),
        _ => return Err(FacadeError::Decode(format!("cannot compare {l:?} with {r:?}"))),
    };
    Ok(match op {
        BinOp::Eq => ord == Ordering::Equal,
        BinOp::Ne => ord != Ordering::Equal,
        BinOp::Lt => ord == Ordering::Less,
        BinOp::Le => ord != Ordering::Greater,
        BinOp::Gt => ord == Ordering::Greater,
        BinOp::Ge => ord != Ordering::Less,
        BinOp::And | BinOp::Or => unreachable!("handled by the boolean branch above"),
    })
}
