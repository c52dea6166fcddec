//! Index scan operator (component L).
//!
//! Resolves a [`Predicate`] against one concrete index, merging the
//! committed index with the calling transaction's own uncommitted delta
//! (component K's [`crate::index::maintenance::TxIndexDelta`]) so a
//! session can see its own writes before they commit. Visibility is
//! decided purely by comparing each candidate entry's `offset` against
//! the locator's offset in the caller's [`Snapshot`]: a later write in
//! the same snapshot always supersedes an earlier one, so no entry needs
//! an explicit tombstone check beyond that comparison.

use crate::error::{EngineError, Result};
use crate::index::maintenance::TxIndexDelta;
use crate::index::{ConcreteIndex, IndexEntry, IndexOp, IndexStore};
use crate::key::Key;
use crate::locator::Snapshot;
use graphdb_primitives::{Locator, Offset};
use std::ops::Bound;

#[derive(Clone, Debug)]
pub enum Predicate {
    /// Full scan: every live row in the index, subject only to `limit`.
    None,
    /// Exact-key lookup that forces `limit = 1` regardless of what the
    /// caller passed, per SPEC_FULL §2's point-read specialization.
    PointRead(Key),
    /// Exact-key lookup returning every live row at that key (a unique
    /// index's `EqualRange` happens to return at most one row, but the
    /// predicate itself does not assume uniqueness).
    EqualRange(Key),
    /// Ordered-bound scan; only valid against a [`crate::index::range::RangeIndex`].
    Range { lower: Bound<Key>, upper: Bound<Key> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanRow {
    pub locator: Locator,
    pub offset: Offset,
}

fn key_in_bounds(key: &Key, lower: &Bound<Key>, upper: &Bound<Key>) -> bool {
    let above_lower = match lower {
        Bound::Unbounded => true,
        Bound::Included(l) => key >= l,
        Bound::Excluded(l) => key > l,
    };
    let below_upper = match upper {
        Bound::Unbounded => true,
        Bound::Included(u) => key <= u,
        Bound::Excluded(u) => key < u,
    };
    above_lower && below_upper
}

fn predicate_matches(predicate: &Predicate, key: &Key) -> bool {
    match predicate {
        Predicate::None => true,
        Predicate::PointRead(k) | Predicate::EqualRange(k) => key == k,
        Predicate::Range { lower, upper } => key_in_bounds(key, lower, upper),
    }
}

/// Runs `predicate` against `index`, merging in `delta` (the calling
/// transaction's own uncommitted writes, if any) and filtering every
/// candidate against `snapshot` so only rows actually live in this
/// transaction's view are returned.
///
/// `limit` is advisory except for [`Predicate::PointRead`], which always
/// behaves as if `limit` were `Some(1)`.
pub fn scan(index: &ConcreteIndex, delta: Option<&TxIndexDelta>, snapshot: &Snapshot, predicate: &Predicate, limit: Option<usize>) -> Result<Vec<ScanRow>> {
    let effective_limit = match predicate {
        Predicate::PointRead(_) => Some(1),
        _ => limit,
    };

    let mut candidates: Vec<(Key, IndexEntry)> = match predicate {
        Predicate::None => index.iter_all(),
        Predicate::PointRead(key) | Predicate::EqualRange(key) => match index {
            ConcreteIndex::Hash(h) => h.equal_range(key).into_iter().map(|e| (key.clone(), e)).collect(),
            ConcreteIndex::Range(r) => r.equal_range(key),
        },
        Predicate::Range { lower, upper } => {
            let range_index = index.as_range().ok_or(EngineError::IndexOperationNotSupported)?;
            range_index.range(lower.clone(), upper.clone())
        }
    };

    if let Some(delta) = delta {
        candidates.extend(delta.iter().filter(|(k, _)| predicate_matches(predicate, k)).cloned());
    }

    let mut rows: Vec<ScanRow> = candidates
        .into_iter()
        .filter(|(_, entry)| entry.op == IndexOp::Insert && snapshot.get(entry.locator) == entry.offset)
        .map(|(_, entry)| ScanRow {
            locator: entry.locator,
            offset: entry.offset,
        })
        .collect();

    rows.sort_by_key(|r| r.locator);
    rows.dedup();

    if let Some(limit) = effective_limit {
        rows.truncate(limit);
    }
    Ok(rows)
}
