use std::cmp::Ordering;

use bson::Bson;

/// Type bracket for the document value total order.
///
/// Values compare by bracket first, then within the bracket. All numeric
/// types share one bracket so `Int32(3)`, `Int64(3)` and `Double(3.0)`
/// compare equal.
pub fn type_rank(value: &Bson) -> u8 {
    match value {
        Bson::Null => 0,
        Bson::Boolean(_) => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => 2,
        Bson::String(_) => 3,
        Bson::Array(_) => 4,
        Bson::Document(_) => 5,
        Bson::DateTime(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Binary(_) => 8,
        _ => 9,
    }
}

fn numeric(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(*n as f64),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(f) => Some(*f),
        _ => None,
    }
}

/// Deterministic total order over document values.
///
/// Null < Boolean < number < String < Array < Document, with remaining
/// types in fixed trailing brackets. Arrays compare element-wise, then by
/// length; documents compare entry-wise in insertion order.
pub fn compare_values(a: &Bson, b: &Bson) -> Ordering {
    let (ra, rb) = (type_rank(a), type_rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }

    match (a, b) {
        (Bson::Null, Bson::Null) => Ordering::Equal,
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => {
            x.timestamp_millis().cmp(&y.timestamp_millis())
        }
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (Bson::Binary(x), Bson::Binary(y)) => x.bytes.cmp(&y.bytes),
        (Bson::Array(x), Bson::Array(y)) => {
            for (va, vb) in x.iter().zip(y.iter()) {
                let ord = compare_values(va, vb);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Bson::Document(x), Bson::Document(y)) => {
            for ((ka, va), (kb, vb)) in x.iter().zip(y.iter()) {
                let ord = ka.cmp(kb);
                if ord != Ordering::Equal {
                    return ord;
                }
                let ord = compare_values(va, vb);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => match (numeric(a), numeric(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            // Same trailing bracket, unknown payload: compare debug forms.
            _ => format!("{a:?}").cmp(&format!("{b:?}")),
        },
    }
}
