use bson::{Bson, Document};
use vellum_query::type_rank;

// ── Sortable encoding helpers ──────────────────────────────────
//
// Index entry keys must compare byte-lexicographically in the same order as
// the value total order. Numbers are therefore widened to f64 and encoded
// with the usual sign-bit transformation: positive values flip the sign
// bit, negative values flip all bits.

#[inline]
fn encode_f64_sortable(f: f64) -> [u8; 8] {
    let bits = f.to_bits();
    let encoded = if (bits & 0x8000_0000_0000_0000) != 0 {
        !bits
    } else {
        bits ^ 0x8000_0000_0000_0000
    };
    encoded.to_be_bytes()
}

/// A document value reduced to its type bracket plus sortable payload bytes.
///
/// Byte-wise comparison of two encodings (bracket byte, then payload) agrees
/// with `vellum_query::compare_values` for all indexable leaf types.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SortableValue {
    pub bracket: u8,
    pub payload: Vec<u8>,
}

impl SortableValue {
    /// Encode a value. Arrays and documents are not indexable leaves and
    /// return `None`; a missing value is represented by [`SortableValue::null`].
    pub fn from_bson(value: &Bson) -> Option<SortableValue> {
        let payload = match value {
            Bson::Null => Vec::new(),
            Bson::Boolean(b) => vec![*b as u8],
            Bson::Int32(n) => encode_f64_sortable(*n as f64).to_vec(),
            Bson::Int64(n) => encode_f64_sortable(*n as f64).to_vec(),
            Bson::Double(f) => encode_f64_sortable(*f).to_vec(),
            Bson::String(s) => s.as_bytes().to_vec(),
            Bson::DateTime(dt) => encode_f64_sortable(dt.timestamp_millis() as f64).to_vec(),
            Bson::ObjectId(oid) => oid.bytes().to_vec(),
            _ => return None,
        };
        Some(SortableValue {
            bracket: type_rank(value),
            payload,
        })
    }

    pub fn null() -> SortableValue {
        SortableValue {
            bracket: type_rank(&Bson::Null),
            payload: Vec::new(),
        }
    }
}

/// Walk a dotted path through nested documents.
pub(crate) fn value_at_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = doc.get(first)?;
    for segment in segments {
        match current {
            Bson::Document(inner) => current = inner.get(segment)?,
            _ => return None,
        }
    }
    Some(current)
}
