//! Payload access (component B).
//!
//! Given a table's binary schema, reads or writes a single typed field at
//! a column position within a serialized payload blob, without requiring
//! callers to understand the blob layout. The schema is intentionally
//! compact (flatbuffer-style, per spec §4.B) — it need not be interpreted
//! outside this module.

use crate::error::{EngineError, Result};
use crate::key::{Holder, HolderKind};
use graphdb_primitives::ColPos;
use smallvec::SmallVec;

/// Describes one field's slot within a table's payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldSlot {
    pub name: String,
    pub kind: HolderKind,
    pub optional: bool,
    pub repeated_count: u16,
    pub position: ColPos,
    pub active: bool,
}

/// A table's payload layout: one [`FieldSlot`] per logical column, in
/// declaration order. Position is looked up linearly; tables have few
/// enough columns that this is not a hot-path concern, matching the
/// teacher's preference for simple scans over premature indirection
/// tables for schema metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BinarySchema {
    pub fields: Vec<FieldSlot>,
}

impl BinarySchema {
    pub fn field(&self, pos: ColPos) -> Option<&FieldSlot> {
        self.fields.iter().find(|f| f.position == pos && f.active)
    }

    /// Byte offset and encoded length of the field at `pos`, scanning the
    /// active fields in position order (each value is length-prefixed, see
    /// [`encode_value`]).
    fn locate(&self, bytes: &[u8], pos: ColPos) -> Result<(usize, usize)> {
        let mut offset = 0usize;
        for f in self.fields.iter().filter(|f| f.active) {
            let len = peek_len(bytes, offset)?;
            if f.position == pos {
                return Ok((offset, len));
            }
            offset += len;
        }
        Err(EngineError::InvalidFieldPosition(
            graphdb_primitives::TableId(0),
            pos,
        ))
    }
}

/// Each encoded value is `[tag:u8][null:u8][len:u32][bytes...]`. This is a
/// deliberately simple self-describing format: the point of this module is
/// that nothing outside it needs to understand it.
fn peek_len(bytes: &[u8], offset: usize) -> Result<usize> {
    let header = bytes
        .get(offset..offset + 6)
        .ok_or_else(|| EngineError::Other(anyhow::anyhow!("payload truncated at offset {offset}")))?;
    let len = u32::from_be_bytes([header[2], header[3], header[4], header[5]]) as usize;
    Ok(6 + len)
}

fn encode_value(kind: HolderKind, holder: &Holder) -> Vec<u8> {
    assert_eq!(kind, holder.kind(), "value kind does not match schema field kind");
    let (null, payload): (u8, Vec<u8>) = match holder {
        Holder::I8(Some(v)) => (0, v.to_be_bytes().to_vec()),
        Holder::I16(Some(v)) => (0, v.to_be_bytes().to_vec()),
        Holder::I32(Some(v)) => (0, v.to_be_bytes().to_vec()),
        Holder::I64(Some(v)) => (0, v.to_be_bytes().to_vec()),
        Holder::U8(Some(v)) => (0, v.to_be_bytes().to_vec()),
        Holder::U16(Some(v)) => (0, v.to_be_bytes().to_vec()),
        Holder::U32(Some(v)) => (0, v.to_be_bytes().to_vec()),
        Holder::U64(Some(v)) => (0, v.to_be_bytes().to_vec()),
        Holder::F32(Some(v)) => (0, v.to_be_bytes().to_vec()),
        Holder::F64(Some(v)) => (0, v.to_be_bytes().to_vec()),
        Holder::Bool(Some(v)) => (0, vec![*v as u8]),
        Holder::Str(Some(v)) => (0, v.as_bytes().to_vec()),
        _ => (1, Vec::new()),
    };
    let tag = kind as u8;
    let mut out = Vec::with_capacity(6 + payload.len());
    out.push(tag);
    out.push(null);
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(&payload);
    out
}

fn decode_value(kind: HolderKind, bytes: &[u8]) -> Holder {
    let null = bytes[1] == 1;
    let payload = &bytes[6..];
    if null {
        return Holder::null(kind);
    }
    macro_rules! num {
        ($variant:ident, $ty:ty) => {{
            let mut buf = [0u8; std::mem::size_of::<$ty>()];
            buf.copy_from_slice(&payload[..std::mem::size_of::<$ty>()]);
            Holder::$variant(Some(<$ty>::from_be_bytes(buf)))
        }};
    }
    match kind {
        HolderKind::I8 => num!(I8, i8),
        HolderKind::I16 => num!(I16, i16),
        HolderKind::I32 => num!(I32, i32),
        HolderKind::I64 => num!(I64, i64),
        HolderKind::U8 => num!(U8, u8),
        HolderKind::U16 => num!(U16, u16),
        HolderKind::U32 => num!(U32, u32),
        HolderKind::U64 => num!(U64, u64),
        HolderKind::F32 => num!(F32, f32),
        HolderKind::F64 => num!(F64, f64),
        HolderKind::Bool => Holder::Bool(Some(payload[0] != 0)),
        HolderKind::Str => Holder::Str(Some(String::from_utf8_lossy(payload).into_owned())),
    }
}

/// Given a table's binary schema, serialized payload bytes, and a column
/// position, returns the holder stored there.
pub fn read_field(schema: &BinarySchema, bytes: &[u8], pos: ColPos) -> Result<Holder> {
    let field = schema
        .field(pos)
        .ok_or_else(|| EngineError::InvalidFieldPosition(graphdb_primitives::TableId(0), pos))?;
    let (offset, len) = schema.locate(bytes, pos)?;
    Ok(decode_value(field.kind, &bytes[offset..offset + len]))
}

/// Returns a new payload with the field at `pos` set to `value`, leaving
/// every other field's bytes untouched. Payloads are immutable once
/// written (component E), so this never mutates `bytes` in place.
pub fn write_field(schema: &BinarySchema, bytes: &[u8], pos: ColPos, value: Holder) -> Result<Vec<u8>> {
    let field = schema
        .field(pos)
        .ok_or_else(|| EngineError::InvalidFieldPosition(graphdb_primitives::TableId(0), pos))?;
    let (offset, len) = schema.locate(bytes, pos)?;
    let encoded = encode_value(field.kind, &value);
    let mut out = Vec::with_capacity(bytes.len() - len + encoded.len());
    out.extend_from_slice(&bytes[..offset]);
    out.extend_from_slice(&encoded);
    out.extend_from_slice(&bytes[offset + len..]);
    Ok(out)
}

/// Serializes a full row from `(position, holder)` pairs in schema order.
pub fn encode_row(schema: &BinarySchema, values: &[(ColPos, Holder)]) -> Vec<u8> {
    let mut out = Vec::new();
    for f in schema.fields.iter().filter(|f| f.active) {
        let holder = values
            .iter()
            .find(|(p, _)| *p == f.position)
            .map(|(_, h)| h.clone())
            .unwrap_or_else(|| Holder::null(f.kind));
        out.extend_from_slice(&encode_value(f.kind, &holder));
    }
    out
}

/// Returns the set of field positions whose values differ between `old`
/// and `new`, used by the value-linked connector to decide which fields
/// to re-check after an update.
pub fn diff(schema: &BinarySchema, old: &[u8], new: &[u8]) -> SmallVec<[ColPos; 4]> {
    let mut changed = SmallVec::new();
    for f in schema.fields.iter().filter(|f| f.active) {
        let a = read_field(schema, old, f.position);
        let b = read_field(schema, new, f.position);
        match (a, b) {
            (Ok(a), Ok(b)) if a == b => {}
            _ => changed.push(f.position),
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphdb_primitives::ColPos;

    fn schema() -> BinarySchema {
        BinarySchema {
            fields: vec![
                FieldSlot {
                    name: "id".into(),
                    kind: HolderKind::I64,
                    optional: false,
                    repeated_count: 1,
                    position: ColPos(0),
                    active: true,
                },
                FieldSlot {
                    name: "name".into(),
                    kind: HolderKind::Str,
                    optional: true,
                    repeated_count: 1,
                    position: ColPos(1),
                    active: true,
                },
            ],
        }
    }

    #[test]
    fn round_trip_read_write() {
        let schema = schema();
        let row = encode_row(
            &schema,
            &[
                (ColPos(0), Holder::I64(Some(42))),
                (ColPos(1), Holder::Str(Some("Alice".into()))),
            ],
        );
        assert_eq!(read_field(&schema, &row, ColPos(0)).unwrap(), Holder::I64(Some(42)));
        assert_eq!(
            read_field(&schema, &row, ColPos(1)).unwrap(),
            Holder::Str(Some("Alice".into()))
        );
    }

    #[test]
    fn write_field_preserves_other_fields() {
        let schema = schema();
        let row = encode_row(
            &schema,
            &[
                (ColPos(0), Holder::I64(Some(1))),
                (ColPos(1), Holder::Str(Some("Bob".into()))),
            ],
        );
        let updated = write_field(&schema, &row, ColPos(1), Holder::Str(Some("Carol".into()))).unwrap();
        assert_eq!(read_field(&schema, &updated, ColPos(0)).unwrap(), Holder::I64(Some(1)));
        assert_eq!(
            read_field(&schema, &updated, ColPos(1)).unwrap(),
            Holder::Str(Some("Carol".into()))
        );
    }

    #[test]
    fn diff_reports_only_changed_positions() {
        let schema = schema();
        let a = encode_row(
            &schema,
            &[(ColPos(0), Holder::I64(Some(1))), (ColPos(1), Holder::Str(Some("x".into())))],
        );
        let b = encode_row(
            &schema,
            &[(ColPos(0), Holder::I64(Some(1))), (ColPos(1), Holder::Str(Some("y".into())))],
        );
        let changed = diff(&schema, &a, &b);
        assert_eq!(&changed[..], &[ColPos(1)]);
    }
}
