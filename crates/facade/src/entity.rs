//! The trait a Rust type implements to become a typed row. Implementations
//! are hand-written, not generated: spec's Non-goals rule out codegen for
//! typed accessors, so `Object<T>`/`Container<T>` are generic over whatever
//! `Entity` impl the caller provides.

use graphdb_datastore::payload::BinarySchema;
use graphdb_primitives::TableId;

pub trait Entity: Sized {
    /// The table this type's rows live in, as registered via
    /// [`graphdb_datastore::ddl::create_table`].
    fn table_id() -> TableId;

    /// The same field layout that was passed to `create_table` — used to
    /// decode raw payload bytes back into field values for [`crate::expr`]
    /// evaluation.
    fn schema() -> BinarySchema;

    /// Serializes `self` into the row's on-disk payload representation.
    fn to_payload(&self) -> Vec<u8>;

    /// Parses a row's raw payload bytes back into `Self`.
    fn from_payload(bytes: &[u8]) -> crate::error::Result<Self>;
}
