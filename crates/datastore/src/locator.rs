//! Locator / offset map (component D).
//!
//! Two mappings exist: a shared committed mapping, and a per-session
//! snapshot taken as a copy-on-write view at `begin_txn`. All reads
//! within a transaction go through the snapshot; writes allocate a new
//! offset and repoint the snapshot entry, leaving the committed mapping
//! untouched until commit.

use crate::error::{EngineError, Result};
use graphdb_primitives::{Locator, Offset};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// The process-wide committed locator → offset mapping.
///
/// Shared via `Arc` so every session's snapshot can cheaply reference the
/// same backing allocator while holding its own copy-on-write vector of
/// offsets.
pub struct LocatorTable {
    next_locator: AtomicU32,
    max_locators: u32,
    committed: RwLock<Vec<Offset>>,
}

impl LocatorTable {
    pub fn new(max_locators: u32) -> Arc<Self> {
        Arc::new(Self {
            // Locator 0 is reserved as `Locator::INVALID`.
            next_locator: AtomicU32::new(1),
            max_locators,
            committed: RwLock::new(vec![Offset::NONE]),
        })
    }

    /// Allocates a new locator, monotonically, process-wide. Bounded by
    /// `max_locators`.
    pub fn allocate(&self) -> Result<Locator> {
        let idx = self.next_locator.fetch_add(1, Ordering::SeqCst);
        if idx >= self.max_locators {
            return Err(EngineError::LocatorsExhausted);
        }
        // Grow the committed table so every live snapshot sees a NONE
        // offset for the new locator until something is actually written.
        let mut committed = self.committed.write();
        while committed.len() <= idx as usize {
            committed.push(Offset::NONE);
        }
        Ok(Locator(idx))
    }

    pub fn committed_offset(&self, locator: Locator) -> Offset {
        self.committed
            .read()
            .get(locator.0 as usize)
            .copied()
            .unwrap_or(Offset::NONE)
    }

    fn committed_snapshot(&self) -> Vec<Offset> {
        self.committed.read().clone()
    }

    /// Applies a single locator repoint to the committed mapping. Only
    /// called by the session/txn manager under the process-wide commit
    /// lock (component G).
    pub(crate) fn apply_committed(&self, locator: Locator, new_offset: Offset) {
        let mut committed = self.committed.write();
        let idx = locator.0 as usize;
        while committed.len() <= idx {
            committed.push(Offset::NONE);
        }
        committed[idx] = new_offset;
    }
}

/// A session's copy-on-write view of the locator table, established at
/// `begin_txn`. Reads within the transaction resolve through here; writes
/// mutate the local vector without touching the shared committed table
/// until commit applies the transaction log.
#[derive(Clone)]
pub struct Snapshot {
    offsets: Vec<Offset>,
}

impl Snapshot {
    pub fn take(table: &LocatorTable) -> Self {
        Snapshot {
            offsets: table.committed_snapshot(),
        }
    }

    pub fn get(&self, locator: Locator) -> Offset {
        self.offsets.get(locator.0 as usize).copied().unwrap_or(Offset::NONE)
    }

    pub fn set(&mut self, locator: Locator, offset: Offset) {
        let idx = locator.0 as usize;
        if self.offsets.len() <= idx {
            self.offsets.resize(idx + 1, Offset::NONE);
        }
        self.offsets[idx] = offset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_is_monotonic_and_never_reused() {
        let table = LocatorTable::new(1024);
        let a = table.allocate().unwrap();
        let b = table.allocate().unwrap();
        assert!(b.0 > a.0);
    }

    #[test]
    fn snapshot_is_isolated_from_later_commits() {
        let table = LocatorTable::new(1024);
        let loc = table.allocate().unwrap();
        let snap = Snapshot::take(&table);
        table.apply_committed(loc, Offset(5));
        // The snapshot taken before the commit still sees no offset.
        assert_eq!(snap.get(loc), Offset::NONE);
        assert_eq!(table.committed_offset(loc), Offset(5));
    }

    #[test]
    fn exhausting_locators_is_reported() {
        let table = LocatorTable::new(2);
        table.allocate().unwrap();
        assert!(matches!(table.allocate(), Err(EngineError::LocatorsExhausted)));
    }
}
