//! Index core (component J) and index maintenance (component K).
//!
//! Two concrete multimap flavors key typed [`crate::key::Key`]s to
//! [`IndexEntry`] records: [`hash::HashIndex`] (unordered) and
//! [`range::RangeIndex`] (ordered). Both accumulate per-transaction
//! deltas via [`maintenance::update_index_from_log_record`], merged into
//! the committed index at commit by [`maintenance::merge_into_committed`].

pub mod hash;
pub mod maintenance;
pub mod range;

use crate::error::Result;
use crate::key::Key;
use graphdb_primitives::{IndexId, Locator, Offset, TableId, TxId};

/// Whether an [`IndexEntry`] represents the row being added to, or
/// removed from, the index at the entry's `key`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexOp {
    Insert,
    Remove,
}

/// One `(key, object offset)` entry produced by an insert or remove,
/// per spec §3's index-record definition. The same locator may appear in
/// many entries across transactions; visibility resolution (component L)
/// selects at most one as "currently live".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    pub locator: Locator,
    pub txn_id: TxId,
    pub offset: Offset,
    pub op: IndexOp,
}

/// Catalog-level identity of a concrete index, independent of which
/// backing structure (hash/range) implements it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexMeta {
    pub index_id: IndexId,
    pub table_id: TableId,
    pub unique: bool,
}

/// Operations every concrete index backing implements, so maintenance
/// (component K) and the scan operator (component L) can treat
/// [`hash::HashIndex`] and [`range::RangeIndex`] uniformly wherever the
/// scan doesn't need range-specific bound queries.
pub trait IndexStore {
    fn meta(&self) -> IndexMeta;
    fn insert(&self, key: Key, entry: IndexEntry) -> Result<()>;
    fn iter_all(&self) -> Vec<(Key, IndexEntry)>;
    fn is_empty(&self) -> bool;
    fn clear(&self);
    /// Physically drops entries whose originating transaction is below
    /// `watermark` and whose key bucket holds a matching remove/insert
    /// pair, per spec §4.K's `mark_entries_committed`. Returns the number
    /// of entries reclaimed, bounded by `batch_limit` per call (the
    /// `index_offset_buffer_t`-style GC buffering from SPEC_FULL §2).
    fn collect_garbage(&self, watermark: TxId, batch_limit: usize) -> usize;
}

/// Either concrete index flavor, named by its catalog `kind`. The scan
/// operator downcasts to [`range::RangeIndex`] only when it actually needs
/// a bound query; everything else goes through [`IndexStore`].
pub enum ConcreteIndex {
    Hash(hash::HashIndex),
    Range(range::RangeIndex),
}

impl ConcreteIndex {
    pub fn as_range(&self) -> Option<&range::RangeIndex> {
        match self {
            ConcreteIndex::Range(r) => Some(r),
            ConcreteIndex::Hash(_) => None,
        }
    }
}

impl IndexStore for ConcreteIndex {
    fn meta(&self) -> IndexMeta {
        match self {
            ConcreteIndex::Hash(h) => h.meta(),
            ConcreteIndex::Range(r) => r.meta(),
        }
    }

    fn insert(&self, key: Key, entry: IndexEntry) -> Result<()> {
        match self {
            ConcreteIndex::Hash(h) => h.insert(key, entry),
            ConcreteIndex::Range(r) => r.insert(key, entry),
        }
    }

    fn iter_all(&self) -> Vec<(Key, IndexEntry)> {
        match self {
            ConcreteIndex::Hash(h) => h.iter_all(),
            ConcreteIndex::Range(r) => r.iter_all(),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            ConcreteIndex::Hash(h) => h.is_empty(),
            ConcreteIndex::Range(r) => r.is_empty(),
        }
    }

    fn clear(&self) {
        match self {
            ConcreteIndex::Hash(h) => h.clear(),
            ConcreteIndex::Range(r) => r.clear(),
        }
    }

    fn collect_garbage(&self, watermark: TxId, batch_limit: usize) -> usize {
        match self {
            ConcreteIndex::Hash(h) => h.collect_garbage(watermark, batch_limit),
            ConcreteIndex::Range(r) => r.collect_garbage(watermark, batch_limit),
        }
    }
}
