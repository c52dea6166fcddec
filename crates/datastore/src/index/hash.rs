//! Unordered multimap index, keyed by typed [`Key`], supporting `find` and
//! `equal_range`. Range scans are not supported; the scan operator maps
//! that attempt to [`EngineError::IndexOperationNotSupported`].

use super::{IndexEntry, IndexMeta, IndexOp, IndexStore};
use crate::error::{EngineError, Result};
use crate::key::Key;
use graphdb_primitives::TxId;
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::collections::HashMap;

#[derive(Default)]
pub struct HashIndex {
    meta: Option<IndexMeta>,
    entries: RwLock<HashMap<Key, SmallVec<[IndexEntry; 2]>>>,
}

impl HashIndex {
    pub fn new(meta: IndexMeta) -> Self {
        HashIndex {
            meta: Some(meta),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn meta(&self) -> IndexMeta {
        self.meta.expect("HashIndex used before being bound to a catalog index")
    }

    /// Inserts `entry` under `key`, rejecting the insert for a unique
    /// index if a live (non-removed) insert already occupies the key,
    /// per spec §4.J.
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

    pub fn equal_range(&self, key: &Key) -> Vec<IndexEntry> {
        self.find(key)
    }

    /// Drops every entry for `locator` at `offset`, used by garbage
    /// collection once an entry's originating transaction has been
    /// superseded or aborted.
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

    pub fn iter_all(&self) -> Vec<(Key, IndexEntry)> {
        self.entries
            .read()
            .iter()
            .flat_map(|(k, v)| v.iter().map(move |e| (k.clone(), e.clone())))
            .collect()
    }

    /// Drops remove-entries below `watermark` together with the
    /// insert-entry for the same locator in the same bucket (its logical
    /// pair), up to `batch_limit` buckets visited. A bucket left with no
    /// entries is removed outright.
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

impl IndexStore for HashIndex {
    fn meta(&self) -> IndexMeta {
        HashIndex::meta(self)
    }

    fn insert(&self, key: Key, entry: IndexEntry) -> Result<()> {
        HashIndex::insert(self, key, entry)
    }

    fn iter_all(&self) -> Vec<(Key, IndexEntry)> {
        HashIndex::iter_all(self)
    }

    fn is_empty(&self) -> bool {
        HashIndex::is_empty(self)
    }

    fn clear(&self) {
        HashIndex::clear(self)
    }

    fn collect_garbage(&self, watermark: TxId, batch_limit: usize) -> usize {
        HashIndex::collect_garbage(self, watermark, batch_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Holder;
    use graphdb_primitives::{IndexId, Locator, Offset, TableId, TxId};

    fn meta(unique: bool) -> IndexMeta {
        IndexMeta {
            index_id: IndexId(1),
            table_id: TableId(1),
            unique,
        }
    }

    #[test]
    fn unique_index_rejects_second_insert_for_same_key() {
        let idx = HashIndex::new(meta(true));
        let key = Key::single(Holder::I32(Some(1)));
        idx.insert(
            key.clone(),
            IndexEntry {
                locator: Locator(1),
                txn_id: TxId(1),
                offset: Offset(1),
                op: IndexOp::Insert,
            },
        )
        .unwrap();
        let err = idx
            .insert(
                key,
                IndexEntry {
                    locator: Locator(2),
                    txn_id: TxId(1),
                    offset: Offset(2),
                    op: IndexOp::Insert,
                },
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::UniqueConstraintViolation(_)));
    }

    #[test]
    fn unique_index_allows_insert_after_remove() {
        let idx = HashIndex::new(meta(true));
        let key = Key::single(Holder::I32(Some(1)));
        idx.insert(
            key.clone(),
            IndexEntry {
                locator: Locator(1),
                txn_id: TxId(1),
                offset: Offset(1),
                op: IndexOp::Remove,
            },
        )
        .unwrap();
        idx.insert(
            key,
            IndexEntry {
                locator: Locator(2),
                txn_id: TxId(2),
                offset: Offset(2),
                op: IndexOp::Insert,
            },
        )
        .unwrap();
    }

    #[test]
    fn garbage_collection_drops_dead_locators_below_watermark() {
        let idx = HashIndex::new(meta(false));
        let key = Key::single(Holder::I32(Some(1)));
        idx.insert(
            key.clone(),
            IndexEntry {
                locator: Locator(1),
                txn_id: TxId(1),
                offset: Offset(1),
                op: IndexOp::Insert,
            },
        )
        .unwrap();
        idx.insert(
            key.clone(),
            IndexEntry {
                locator: Locator(1),
                txn_id: TxId(2),
                offset: Offset(1),
                op: IndexOp::Remove,
            },
        )
        .unwrap();
        idx.insert(
            key.clone(),
            IndexEntry {
                locator: Locator(2),
                txn_id: TxId(5),
                offset: Offset(2),
                op: IndexOp::Insert,
            },
        )
        .unwrap();
        let reclaimed = idx.collect_garbage(TxId(3), 16);
        assert_eq!(reclaimed, 2);
        let remaining = idx.find(&key);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].locator, Locator(2));
    }
}
