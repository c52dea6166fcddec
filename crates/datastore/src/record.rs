//! Object record (component E).
//!
//! A record is immutable once written at an offset: mutating an object's
//! payload or a single reference slot always produces a new record at a
//! new offset and repoints the locator, per spec §3/§4.E. Records live in
//! an append-only arena; `Offset::NONE` names "no current record".

use crate::error::{EngineError, Result};
use graphdb_primitives::{Locator, ObjectId, Offset, TableId};
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Fixed header plus `num_references` object ids plus `payload_size`
/// bytes, stored contiguously — the layout is bit-exact in the sense that
/// `references.len()` and `payload.len()` fully determine the record's
/// size; nothing is interpreted beyond what E exposes.
#[derive(Clone, Debug)]
pub struct ObjectRecord {
    pub id: ObjectId,
    pub ty: TableId,
    pub references: SmallVec<[ObjectId; 4]>,
    pub payload: Vec<u8>,
}

impl ObjectRecord {
    pub fn new(id: ObjectId, ty: TableId, num_references: usize, payload: Vec<u8>) -> Self {
        ObjectRecord {
            id,
            ty,
            references: SmallVec::from_elem(ObjectId::INVALID, num_references),
            payload,
        }
    }

    /// Produces a new record with `slot` repointed to `value`, leaving the
    /// payload and every other slot untouched. Per spec §4.E this is an
    /// O(record-size) copy, not an in-place mutation.
    pub fn with_reference(&self, slot: usize, value: ObjectId) -> ObjectRecord {
        let mut copy = self.clone();
        copy.references[slot] = value;
        copy
    }

    pub fn with_payload(&self, payload: Vec<u8>) -> ObjectRecord {
        let mut copy = self.clone();
        copy.payload = payload;
        copy
    }
}

/// Append-only store of record versions, addressed by [`Offset`].
/// `Offset(0)` is never a valid index; arena slot `i` backs `Offset(i+1)`.
/// Every create or update pushes a new version, so `max_objects` bounds
/// total record *versions* ever written, not distinct live objects — the
/// same bound `LocatorTable` and `TxLog` enforce over their own growth.
pub struct Arena {
    records: Vec<ObjectRecord>,
    max_objects: u64,
}

impl Arena {
    pub fn new(max_objects: u64) -> Self {
        Arena {
            records: Vec::new(),
            max_objects,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Appends a new record version and returns the offset it now lives
    /// at. Fails with [`EngineError::OutOfMemory`] once `max_objects`
    /// versions have been written.
    pub fn push(&mut self, record: ObjectRecord) -> Result<Offset> {
        if self.records.len() as u64 >= self.max_objects {
            return Err(EngineError::OutOfMemory);
        }
        self.records.push(record);
        Ok(Offset(self.records.len() as u32))
    }

    pub fn get(&self, offset: Offset) -> Option<&ObjectRecord> {
        if offset.is_none() {
            return None;
        }
        self.records.get(offset.0 as usize - 1)
    }
}

/// Process-wide `object id -> locator` identity. Ids are monotonically
/// allocated and never reused, per spec §3's identity invariants; the
/// mapping itself is append-only and never needs a session snapshot
/// since an id's locator never changes once assigned (only the
/// locator's offset changes).
#[derive(Default)]
pub struct IdentityMap {
    next_id: AtomicU64,
    locators: RwLock<HashMap<ObjectId, Locator>>,
}

impl IdentityMap {
    pub fn new() -> Self {
        IdentityMap {
            next_id: AtomicU64::new(1),
            locators: RwLock::new(HashMap::new()),
        }
    }

    pub fn allocate_id(&self) -> ObjectId {
        ObjectId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Records a caller-supplied id as in use, so a later `allocate_id`
    /// never collides with it (spec §6's `create(id, type, data, size)`
    /// overload).
    pub fn observe_id(&self, id: ObjectId) {
        let mut next = self.next_id.load(Ordering::SeqCst);
        while id.0 >= next {
            match self.next_id.compare_exchange_weak(next, id.0 + 1, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => break,
                Err(cur) => next = cur,
            }
        }
    }

    pub fn bind(&self, id: ObjectId, locator: Locator) {
        self.locators.write().insert(id, locator);
    }

    pub fn locator_of(&self, id: ObjectId) -> Option<Locator> {
        self.locators.read().get(&id).copied()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.locators.read().contains_key(&id)
    }

    /// A point-in-time copy of every bound `(id, locator)` pair, for
    /// callers that need to enumerate every known object (the object
    /// API's `find_all`). Not itself transactionally consistent; callers
    /// still filter each locator through their own snapshot.
    pub fn snapshot_bindings(&self) -> Vec<(ObjectId, Locator)> {
        self.locators.read().iter().map(|(id, loc)| (*id, *loc)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observing_an_id_advances_future_allocations_past_it() {
        let ids = IdentityMap::new();
        ids.observe_id(ObjectId(50));
        let next = ids.allocate_id();
        assert!(next.0 > 50);
    }

    #[test]
    fn arena_offsets_start_at_one() {
        let mut arena = Arena::new(16);
        let rec = ObjectRecord::new(ObjectId(1), TableId(1), 0, vec![]);
        let off = arena.push(rec).unwrap();
        assert_eq!(off, Offset(1));
        assert!(arena.get(off).is_some());
        assert!(arena.get(Offset::NONE).is_none());
    }

    #[test]
    fn pushing_past_max_objects_is_rejected() {
        let mut arena = Arena::new(1);
        arena.push(ObjectRecord::new(ObjectId(1), TableId(1), 0, vec![])).unwrap();
        let err = arena.push(ObjectRecord::new(ObjectId(2), TableId(1), 0, vec![])).unwrap_err();
        assert!(matches!(err, EngineError::OutOfMemory));
    }

    #[test]
    fn updating_a_reference_does_not_mutate_the_original() {
        let rec = ObjectRecord::new(ObjectId(1), TableId(1), 2, vec![1, 2, 3]);
        let updated = rec.with_reference(0, ObjectId(99));
        assert_eq!(rec.references[0], ObjectId::INVALID);
        assert_eq!(updated.references[0], ObjectId(99));
        assert_eq!(updated.references[1], ObjectId::INVALID);
        assert_eq!(updated.payload, rec.payload);
    }
}
