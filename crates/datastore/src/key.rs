//! Typed key and data holder (component A).
//!
//! A [`Holder`] is a tagged scalar or string value, or a typed null. A
//! [`Key`] is a tuple of holders, one per field in an index's key schema.
//! Comparisons and hashing follow spec §3/§4.A: lexicographic ordering
//! over holders with null sorting greater than any value of the same tag
//! (to agree with the public optional type's ordering), and a hash that
//! is consistent with equality and sensitive to arity/null-pattern.

use smallvec::SmallVec;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// Fixed, nonzero seed mixed into every key hash. An implementation detail,
/// not a security property — this is not a keyed/HMAC hash.
const KEY_HASH_SEED: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HolderKind {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Bool,
    Str,
}

/// A single typed scalar/string value, or a typed null.
#[derive(Clone, Debug)]
pub enum Holder {
    I8(Option<i8>),
    I16(Option<i16>),
    I32(Option<i32>),
    I64(Option<i64>),
    U8(Option<u8>),
    U16(Option<u16>),
    U32(Option<u32>),
    U64(Option<u64>),
    F32(Option<f32>),
    F64(Option<f64>),
    Bool(Option<bool>),
    Str(Option<String>),
}

impl Holder {
    pub fn kind(&self) -> HolderKind {
        match self {
            Holder::I8(_) => HolderKind::I8,
            Holder::I16(_) => HolderKind::I16,
            Holder::I32(_) => HolderKind::I32,
            Holder::I64(_) => HolderKind::I64,
            Holder::U8(_) => HolderKind::U8,
            Holder::U16(_) => HolderKind::U16,
            Holder::U32(_) => HolderKind::U32,
            Holder::U64(_) => HolderKind::U64,
            Holder::F32(_) => HolderKind::F32,
            Holder::F64(_) => HolderKind::F64,
            Holder::Bool(_) => HolderKind::Bool,
            Holder::Str(_) => HolderKind::Str,
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            Holder::I8(v) => v.is_none(),
            Holder::I16(v) => v.is_none(),
            Holder::I32(v) => v.is_none(),
            Holder::I64(v) => v.is_none(),
            Holder::U8(v) => v.is_none(),
            Holder::U16(v) => v.is_none(),
            Holder::U32(v) => v.is_none(),
            Holder::U64(v) => v.is_none(),
            Holder::F32(v) => v.is_none(),
            Holder::F64(v) => v.is_none(),
            Holder::Bool(v) => v.is_none(),
            Holder::Str(v) => v.is_none(),
        }
    }

    /// A null holder of the given kind.
    pub fn null(kind: HolderKind) -> Self {
        match kind {
            HolderKind::I8 => Holder::I8(None),
            HolderKind::I16 => Holder::I16(None),
            HolderKind::I32 => Holder::I32(None),
            HolderKind::I64 => Holder::I64(None),
            HolderKind::U8 => Holder::U8(None),
            HolderKind::U16 => Holder::U16(None),
            HolderKind::U32 => Holder::U32(None),
            HolderKind::U64 => Holder::U64(None),
            HolderKind::F32 => Holder::F32(None),
            HolderKind::F64 => Holder::F64(None),
            HolderKind::Bool => Holder::Bool(None),
            HolderKind::Str => Holder::Str(None),
        }
    }

    /// Per-holder byte view used both by ordering (for floats, which have
    /// no total order) and by hashing. Returns `None` for null.
    fn bytes(&self) -> Option<SmallVec<[u8; 16]>> {
        let mut buf = SmallVec::new();
        match self {
            Holder::I8(Some(v)) => buf.extend_from_slice(&v.to_be_bytes()),
            Holder::I16(Some(v)) => buf.extend_from_slice(&v.to_be_bytes()),
            Holder::I32(Some(v)) => buf.extend_from_slice(&v.to_be_bytes()),
            Holder::I64(Some(v)) => buf.extend_from_slice(&v.to_be_bytes()),
            Holder::U8(Some(v)) => buf.extend_from_slice(&v.to_be_bytes()),
            Holder::U16(Some(v)) => buf.extend_from_slice(&v.to_be_bytes()),
            Holder::U32(Some(v)) => buf.extend_from_slice(&v.to_be_bytes()),
            Holder::U64(Some(v)) => buf.extend_from_slice(&v.to_be_bytes()),
            Holder::F32(Some(v)) => buf.extend_from_slice(&v.total_cmp_key32().to_be_bytes()),
            Holder::F64(Some(v)) => buf.extend_from_slice(&v.total_cmp_key64().to_be_bytes()),
            Holder::Bool(Some(v)) => buf.push(*v as u8),
            Holder::Str(Some(v)) => buf.extend_from_slice(v.as_bytes()),
            _ => return None,
        }
        Some(buf)
    }
}

trait TotalCmpKey32 {
    fn total_cmp_key32(&self) -> u32;
}
impl TotalCmpKey32 for f32 {
    fn total_cmp_key32(&self) -> u32 {
        let bits = self.to_bits();
        if bits & (1 << 31) != 0 {
            !bits
        } else {
            bits | (1 << 31)
        }
    }
}

trait TotalCmpKey64 {
    fn total_cmp_key64(&self) -> u64;
}
impl TotalCmpKey64 for f64 {
    fn total_cmp_key64(&self) -> u64 {
        let bits = self.to_bits();
        if bits & (1 << 63) != 0 {
            !bits
        } else {
            bits | (1 << 63)
        }
    }
}

impl PartialEq for Holder {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for Holder {}

impl PartialOrd for Holder {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Holder {
    /// Compares two holders of the *same* tag. A tag mismatch is a
    /// precondition violation per spec §4.A; we panic with a clear message
    /// rather than silently returning a meaningless ordering. Null sorts
    /// greater than any value, matching the public optional type's order.
    fn cmp(&self, other: &Self) -> Ordering {
        assert_eq!(
            self.kind(),
            other.kind(),
            "cannot compare holders of different kinds ({:?} vs {:?})",
            self.kind(),
            other.kind()
        );
        match (self.bytes(), other.bytes()) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => a.cmp(&b),
        }
    }
}

impl Hash for Holder {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind().hash(state);
        match self.bytes() {
            Some(b) => {
                state.write_u8(1);
                state.write(&b);
            }
            None => state.write_u8(0),
        }
    }
}

/// A tuple of typed holders forming an index key.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Key(pub SmallVec<[Holder; 4]>);

/// Hashes through [`Key::fold_hash`] rather than a derived per-element
/// hash, so `HashIndex`'s `HashMap<Key, _>` actually uses the seeded-fold
/// algorithm spec §4.A specifies, not `SmallVec`'s default element-wise
/// hash.
impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.fold_hash());
    }
}

impl Key {
    pub fn new(holders: impl IntoIterator<Item = Holder>) -> Self {
        Key(holders.into_iter().collect())
    }

    pub fn single(holder: Holder) -> Self {
        Key(SmallVec::from_elem(holder, 1))
    }

    pub fn arity(&self) -> usize {
        self.0.len()
    }

    /// `true` iff every holder in the key is null (spec §3's "empty key").
    pub fn is_empty_key(&self) -> bool {
        self.0.iter().all(Holder::is_null)
    }

    /// Folds per-holder hashes: repeatedly hashing `(prev_hash, current_hash)`
    /// as an opaque byte view, seeded with [`KEY_HASH_SEED`], per spec §4.A.
    pub fn fold_hash(&self) -> u64 {
        let mut acc = KEY_HASH_SEED;
        for holder in &self.0 {
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            holder.hash(&mut hasher);
            let cur = hasher.finish();
            let mut combine = std::collections::hash_map::DefaultHasher::new();
            (acc, cur).hash(&mut combine);
            acc = combine.finish();
        }
        // Two keys differing in arity must hash differently: fold the arity
        // in last so a trailing-null-vs-absent-column difference doesn't
        // collapse to the same accumulator.
        let mut arity_hasher = std::collections::hash_map::DefaultHasher::new();
        (acc, self.0.len()).hash(&mut arity_hasher);
        arity_hasher.finish()
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn equal_i32_keys_always_hash_equal(a in any::<i32>(), b in any::<i32>()) {
            let ka = Key::single(Holder::I32(Some(a)));
            let kb = Key::single(Holder::I32(Some(b)));
            prop_assert_eq!(ka == kb, ka.fold_hash() == kb.fold_hash());
        }

        #[test]
        fn ord_agrees_with_underlying_integer_ord(a in any::<i32>(), b in any::<i32>()) {
            let ka = Key::single(Holder::I32(Some(a)));
            let kb = Key::single(Holder::I32(Some(b)));
            prop_assert_eq!(ka.cmp(&kb), a.cmp(&b));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_keys_hash_equal() {
        let a = Key::new([Holder::I32(Some(7)), Holder::Str(Some("x".into()))]);
        let b = Key::new([Holder::I32(Some(7)), Holder::Str(Some("x".into()))]);
        assert_eq!(a, b);
        assert_eq!(a.fold_hash(), b.fold_hash());
    }

    #[test]
    fn differing_nullity_is_unequal() {
        let a = Key::single(Holder::I32(Some(7)));
        let b = Key::single(Holder::I32(None));
        assert_ne!(a, b);
    }

    #[test]
    fn differing_arity_hashes_differently() {
        let a = Key::new([Holder::I32(Some(1))]);
        let b = Key::new([Holder::I32(Some(1)), Holder::I32(None)]);
        assert_ne!(a.fold_hash(), b.fold_hash());
    }

    #[test]
    fn null_sorts_greater_than_value() {
        let v = Holder::I32(Some(1));
        let n = Holder::I32(None);
        assert!(v < n);
    }

    #[test]
    #[should_panic(expected = "cannot compare holders of different kinds")]
    fn mismatched_kinds_panic_on_compare() {
        let _ = Holder::I32(Some(1)).cmp(&Holder::I64(Some(1)));
    }

    #[test]
    fn empty_key_is_all_null() {
        let k = Key::new([Holder::I32(None), Holder::Str(None)]);
        assert!(k.is_empty_key());
        let k2 = Key::new([Holder::I32(Some(0)), Holder::Str(None)]);
        assert!(!k2.is_empty_key());
    }

    #[test]
    fn string_ordering_is_byte_lexicographic() {
        let a = Holder::Str(Some("abc".into()));
        let b = Holder::Str(Some("abd".into()));
        assert!(a < b);
    }
}
