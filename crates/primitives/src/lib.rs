//! Stable identifier newtypes used throughout the storage engine.
//!
//! None of these types carry behavior beyond identity, ordering, and
//! display; they exist so that a `u64` meant as an object id is never
//! accidentally passed where a locator or a transaction id is expected.

use derive_more::{Display, From, Into};
use std::num::NonZeroU64;

/// A process-unique, monotonically allocated object identity.
///
/// Ids are never reused, even after the object they named is deleted.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
pub struct ObjectId(pub u64);

impl ObjectId {
    /// Sentinel used in reference slots for "no object" (an invalid/absent id).
    pub const INVALID: ObjectId = ObjectId(0);

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

/// A process-local small integer naming an object independently of its
/// current storage offset.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
pub struct Locator(pub u32);

impl Locator {
    pub const INVALID: Locator = Locator(0);

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

/// Position within the shared object arena of one specific record version.
///
/// `0` is reserved to mean "no current record" (deleted or never
/// materialized), matching the spec's `offset == 0` invariant.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
pub struct Offset(pub u32);

impl Offset {
    pub const NONE: Offset = Offset(0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// A monotonically increasing transaction timestamp (both `begin_ts` and
/// `commit_ts` are values of this type, compared against each other).
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
pub struct TxId(pub u64);

/// Identifies a table (and, equivalently, its type tag) in the catalog.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
pub struct TableId(pub u32);

/// Identifies a database within the engine.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
pub struct DatabaseId(pub u32);

/// A field's position within its table's payload/reference schema.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
pub struct ColPos(pub u16);

/// Identifies a relationship definition in the catalog.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
pub struct RelationshipId(pub u32);

/// Identifies an index definition in the catalog.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
pub struct IndexId(pub u32);

/// A position within an object's `references[]` array that a relationship
/// has claimed (first-child, parent, next-child, or prev-child slot).
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
pub struct RefSlot(pub u16);

/// Relationship cardinality, as carried by the catalog's relationship rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Cardinality {
    One,
    Many,
}

/// The two concrete index structures the engine supports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexKind {
    Hash,
    Range,
}

/// A non-zero variant of [`TxId`], used for the commit-lock watermark so
/// "no committed transaction yet" can be represented as `None` rather than
/// a sentinel zero value threaded through arithmetic.
pub type NonZeroTxId = NonZeroU64;

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn object_id_round_trips_through_u64(n in any::<u64>()) {
            let id: ObjectId = n.into();
            let back: u64 = id.into();
            prop_assert_eq!(back, n);
        }

        #[test]
        fn object_id_ord_agrees_with_underlying_u64(a in any::<u64>(), b in any::<u64>()) {
            prop_assert_eq!(ObjectId(a).cmp(&ObjectId(b)), a.cmp(&b));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_sentinels_are_falsy() {
        assert!(!ObjectId::INVALID.is_valid());
        assert!(!Locator::INVALID.is_valid());
        assert!(Offset::NONE.is_none());
        assert!(ObjectId(1).is_valid());
        assert!(Locator(1).is_valid());
        assert!(!Offset(1).is_none());
    }

    #[test]
    fn ids_order_by_underlying_value() {
        assert!(ObjectId(1) < ObjectId(2));
        assert!(TxId(10) < TxId(11));
    }
}
