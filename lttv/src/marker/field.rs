//! Marker field descriptors: the typed, sized, aligned pieces a marker
//! format string decomposes into, grounded on the original `marker.c`'s
//! `marker_parse_format`.

use crate::domain::errors::SchemaError;

/// A field's scalar type. Fixed-size types report their size directly;
/// `String` fields are NUL-terminated and variable length, so their extent
/// can only be discovered by scanning the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float,
    Double,
    String,
}

impl FieldType {
    /// `(name, printf-style conversion)` used both for parsing a format
    /// string and for re-emitting one in diagnostics.
    const TABLE: &'static [(&'static str, FieldType)] = &[
        ("int8", FieldType::Int8),
        ("uint8", FieldType::UInt8),
        ("int16", FieldType::Int16),
        ("uint16", FieldType::UInt16),
        ("int32", FieldType::Int32),
        ("uint32", FieldType::UInt32),
        ("int64", FieldType::Int64),
        ("uint64", FieldType::UInt64),
        ("float", FieldType::Float),
        ("double", FieldType::Double),
        ("string", FieldType::String),
    ];

    #[must_use]
    pub fn from_name(name: &str) -> Option<FieldType> {
        Self::TABLE.iter().find(|(n, _)| *n == name).map(|(_, t)| *t)
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        Self::TABLE.iter().find(|(_, t)| *t == self).map(|(n, _)| *n).unwrap_or("?")
    }

    /// Fixed byte size and alignment, or `None` for `String` (variable
    /// length, byte-aligned).
    #[must_use]
    pub fn fixed_size_align(self) -> Option<(usize, usize)> {
        match self {
            FieldType::Int8 | FieldType::UInt8 => Some((1, 1)),
            FieldType::Int16 | FieldType::UInt16 => Some((2, 2)),
            FieldType::Int32 | FieldType::UInt32 | FieldType::Float => Some((4, 4)),
            FieldType::Int64 | FieldType::UInt64 | FieldType::Double => Some((8, 8)),
            FieldType::String => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub ty: FieldType,
}

/// A field plus its resolved byte offset and length within one concrete
/// event's payload. For fixed-size fields this is the same for every
/// occurrence of the marker; for `String` fields it depends on the actual
/// bytes and so is recomputed per event.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedField {
    pub offset: usize,
    pub len: usize,
}

/// Walk `fields` against `payload`, resolving each field's offset and
/// length. Fixed-size fields are aligned up from the running offset;
/// `String` fields run until the next `\0` (inclusive) or end of payload.
pub fn resolve_offsets(
    fields: &[FieldSpec],
    payload: &[u8],
) -> Result<Vec<ResolvedField>, SchemaError> {
    let mut offset = 0usize;
    let mut out = Vec::with_capacity(fields.len());
    for field in fields {
        match field.ty.fixed_size_align() {
            Some((size, align)) => {
                let aligned = offset.div_ceil(align) * align;
                if aligned + size > payload.len() {
                    return Err(SchemaError::MalformedFormat {
                        name: field.name.clone(),
                        reason: "field extends past end of payload".to_owned(),
                    });
                }
                out.push(ResolvedField { offset: aligned, len: size });
                offset = aligned + size;
            }
            None => {
                let start = offset;
                let end = payload[start..]
                    .iter()
                    .position(|&b| b == 0)
                    .map_or(payload.len(), |rel| start + rel + 1);
                out.push(ResolvedField { offset: start, len: end - start });
                offset = end;
            }
        }
    }
    Ok(out)
}


impl PartialEq for ResolvedField {
    fn eq(&self, other: &Self) -> bool {
        self.offset == other.offset && self.len == other.len
    }
}
