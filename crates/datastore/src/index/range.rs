//! Ordered multimap index, keyed by typed [`Key`], supporting `find`,
//! `lower_bound`, `upper_bound`, `equal_range`, and full iteration in key
//! order.

use super::{IndexEntry, IndexMeta, IndexOp, IndexStore};
use crate::error::{EngineError, Result};
use crate::key::Key;
use graphdb_primitives::TxId;
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::ops::Bound;

#[derive(Default)]
pub struct RangeIndex {
    meta: Option<IndexMeta>,
    entries: RwLock<BTreeMap<Key, SmallVec<[IndexEntry; 2]>>>,
}

impl RangeIndex {
    pub fn new(meta: IndexMeta) -> Self {
        RangeIndex {
            meta: Some(meta),
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn meta(&self) -> IndexMeta {
        self.meta.expect("RangeIndex used before being bound to a catalog index")
    }

    pub fn insert(&self, key: Key, entry: IndexEntry) -> Result<()> {
        let mut guard = self.entries.write();
        let bucket = guard.entry(key).or_default();
        if self.meta().unique && entry.op == IndexOp::Insert && bucket.iter().any(|e| e.op == IndexOp::Insert) {
            return Err(EngineError::UniqueConstraintViolation(self.meta().index_id));
        }
        bucket.push(entry);
        Ok(())
    }

    pub fn find(&self, key: &Key) -> Vec<IndexEntry> {
        self.entries.read().get(key).cloned().unwrap_or_default().into_vec()
    }

    pub fn equal_range(&self, key: &Key) -> Vec<(Key, IndexEntry)> {
        self.range(Bound::Included(key.clone()), Bound::Included(key.clone()))
    }

    /// Entries for keys within `(lower, upper)`, in key order.
    pub fn range(&self, lower: Bound<Key>, upper: Bound<Key>) -> Vec<(Key, IndexEntry)> {
        self.entries
            .read()
            .range((lower, upper))
            .flat_map(|(k, v)| v.iter().map(move |e| (k.clone(), e.clone())))
            .collect()
    }

    pub fn lower_bound(&self, key: &Key) -> Vec<(Key, IndexEntry)> {
        self.range(Bound::Included(key.clone()), Bound::Unbounded)
    }

    pub fn upper_bound(&self, key: &Key) -> Vec<(Key, IndexEntry)> {
        self.range(Bound::Excluded(key.clone()), Bound::Unbounded)
    }

    pub fn iter_all(&self) -> Vec<(Key, IndexEntry)> {
        self.range(Bound::Unbounded, Bound::Unbounded)
    }

    pub fn remove_entry(&self, key: &Key, locator: graphdb_primitives::Locator, offset: graphdb_primitives::Offset) {
        let mut guard = self.entries.write();
        if let Some(bucket) = guard.get_mut(key) {
            bucket.retain(|e| !(e.locator == locator && e.offset == offset));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// See [`hash::HashIndex::collect_garbage`]; identical semantics over
    /// an ordered backing map.
    pub fn collect_garbage(&self, watermark: TxId, batch_limit: usize) -> usize {
        let mut guard = self.entries.write();
        let mut reclaimed = 0usize;
        let mut empty_keys = Vec::new();
        for (key, bucket) in guard.iter_mut().take(batch_limit) {
            let dead_locators: Vec<_> = bucket
                .iter()
                .filter(|e| e.op == IndexOp::Remove && e.txn_id < watermark)
                .map(|e| e.locator)
                .collect();
            if dead_locators.is_empty() {
                continue;
            }
            let before = bucket.len();
            bucket.retain(|e| !dead_locators.contains(&e.locator));
            reclaimed += before - bucket.len();
            if bucket.is_empty() {
                empty_keys.push(key.clone());
            }
        }
        for key in empty_keys {
            guard.remove(&key);
        }
        reclaimed
    }
}

impl IndexStore for RangeIndex {
    fn meta(&self) -> IndexMeta {
        RangeIndex::meta(self)
    }

    fn insert(&self, key: Key, entry: IndexEntry) -> Result<()> {
        RangeIndex::insert(self, key, entry)
    }

    fn iter_all(&self) -> Vec<(Key, IndexEntry)> {
        RangeIndex::iter_all(self)
    }

    fn is_empty(&self) -> bool {
        RangeIndex::is_empty(self)
    }

    fn clear(&self) {
        RangeIndex::clear(self)
    }

    fn collect_garbage(&self, watermark: TxId, batch_limit: usize) -> usize {
        RangeIndex::collect_garbage(self, watermark, batch_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Holder;
    use graphdb_primitives::{IndexId, Locator, Offset, TableId, TxId};

    fn meta() -> IndexMeta {
        IndexMeta {
            index_id: IndexId(2),
            table_id: TableId(1),
            unique: false,
        }
    }

    fn entry(n: u32) -> IndexEntry {
        IndexEntry {
            locator: Locator(n),
            txn_id: TxId(1),
            offset: Offset(n),
            op: IndexOp::Insert,
        }
    }

    #[test]
    fn range_respects_inclusive_and_exclusive_bounds() {
        let idx = RangeIndex::new(meta());
        for i in 1..=20i32 {
            idx.insert(Key::single(Holder::I32(Some(i))), entry(i as u32)).unwrap();
        }
        let inclusive = idx.range(
            Bound::Included(Key::single(Holder::I32(Some(1)))),
            Bound::Included(Key::single(Holder::I32(Some(5)))),
        );
        assert_eq!(inclusive.len(), 5);

        let exclusive = idx.range(
            Bound::Excluded(Key::single(Holder::I32(Some(1)))),
            Bound::Excluded(Key::single(Holder::I32(Some(5)))),
        );
        assert_eq!(exclusive.len(), 3);
    }

    #[test]
    fn iteration_is_key_ordered() {
        let idx = RangeIndex::new(meta());
        for i in [3, 1, 2] {
            idx.insert(Key::single(Holder::I32(Some(i))), entry(i as u32)).unwrap();
        }
        let keys: Vec<_> = idx.iter_all().into_iter().map(|(k, _)| k).collect();
        assert!(keys.windows(2).all(|w| w[0] <= w[1]));
    }
}
