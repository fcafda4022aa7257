use crate::value::SortableValue;

// ── Keyspaces ──────────────────────────────────────────────────
//
// `sys`   — catalog: collection meta by name, id→name map, index configs
// `docs`  — records: [cid_be8][key_utf8]
// `index` — entries: [cid_be8][iid_be8][field…][doc_key], every variable-
//           length part escaped and double-zero terminated so byte order
//           matches value order

pub const SYS_KEYSPACE: &str = "sys";
pub const DOCS_KEYSPACE: &str = "docs";
pub const INDEX_KEYSPACE: &str = "index";

pub(crate) const SYS_COLLECTION_TAG: u8 = b'c';
pub(crate) const SYS_ID_TAG: u8 = b'n';
pub(crate) const SYS_INDEX_TAG: u8 = b'x';

/// Escape a payload so that `0x00 0x00` never appears inside it, then
/// terminate with `0x00 0x00`. Preserves byte order across encodings.
pub(crate) fn write_escaped(buf: &mut Vec<u8>, payload: &[u8]) {
    for &b in payload {
        buf.push(b);
        if b == 0x00 {
            buf.push(0xFF);
        }
    }
    buf.push(0x00);
    buf.push(0x00);
}

/// Parse one escaped segment starting at `bytes`, returning the payload and
/// the remainder after the terminator.
pub(crate) fn parse_escaped(bytes: &[u8]) -> Option<(Vec<u8>, &[u8])> {
    let mut payload = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == 0x00 {
            let next = *bytes.get(i + 1)?;
            if next == 0x00 {
                return Some((payload, &bytes[i + 2..]));
            }
            // 0x00 0xFF is an escaped zero byte.
            payload.push(0x00);
            i += 2;
        } else {
            payload.push(b);
            i += 1;
        }
    }
    None
}

pub fn doc_key(cid: u64, key: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + key.len());
    buf.extend_from_slice(&cid.to_be_bytes());
    buf.extend_from_slice(key.as_bytes());
    buf
}

pub fn doc_prefix(cid: u64) -> Vec<u8> {
    cid.to_be_bytes().to_vec()
}

pub(crate) fn parse_doc_key(raw: &[u8]) -> Option<(u64, &str)> {
    if raw.len() < 8 {
        return None;
    }
    let cid = u64::from_be_bytes(raw[..8].try_into().ok()?);
    let key = std::str::from_utf8(&raw[8..]).ok()?;
    Some((cid, key))
}

/// Prefix common to all entries of one index.
pub fn index_prefix(cid: u64, iid: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16);
    buf.extend_from_slice(&cid.to_be_bytes());
    buf.extend_from_slice(&iid.to_be_bytes());
    buf
}

/// Prefix of index entries whose leading fields equal `values`.
pub fn index_value_prefix(cid: u64, iid: u64, values: &[SortableValue]) -> Vec<u8> {
    let mut buf = index_prefix(cid, iid);
    for value in values {
        buf.push(value.bracket);
        write_escaped(&mut buf, &value.payload);
    }
    buf
}

/// Full index entry key: prefix, every field value, then the document key.
pub fn index_entry_key(cid: u64, iid: u64, values: &[SortableValue], doc_key: &str) -> Vec<u8> {
    let mut buf = index_value_prefix(cid, iid, values);
    write_escaped(&mut buf, doc_key.as_bytes());
    buf
}

/// Decode an index entry key back into field values and the document key.
pub(crate) fn parse_index_entry(
    raw: &[u8],
    field_count: usize,
) -> Option<(Vec<SortableValue>, String)> {
    let mut rest = raw.get(16..)?;
    let mut values = Vec::with_capacity(field_count);
    for _ in 0..field_count {
        let bracket = *rest.first()?;
        let (payload, tail) = parse_escaped(&rest[1..])?;
        values.push(SortableValue { bracket, payload });
        rest = tail;
    }
    let (key_bytes, tail) = parse_escaped(rest)?;
    if !tail.is_empty() {
        return None;
    }
    String::from_utf8(key_bytes).ok().map(|key| (values, key))
}

// ── Catalog keys (sys keyspace) ────────────────────────────────

pub(crate) fn collection_meta_key(name: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(2 + name.len());
    buf.push(SYS_COLLECTION_TAG);
    buf.push(0x00);
    buf.extend_from_slice(name.as_bytes());
    buf
}

pub(crate) fn collection_id_key(cid: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(10);
    buf.push(SYS_ID_TAG);
    buf.push(0x00);
    buf.extend_from_slice(&cid.to_be_bytes());
    buf
}

pub(crate) fn index_config_key(cid: u64, iid: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(18);
    buf.push(SYS_INDEX_TAG);
    buf.push(0x00);
    buf.extend_from_slice(&cid.to_be_bytes());
    buf.extend_from_slice(&iid.to_be_bytes());
    buf
}

pub(crate) fn index_config_prefix(cid: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(10);
    buf.push(SYS_INDEX_TAG);
    buf.push(0x00);
    buf.extend_from_slice(&cid.to_be_bytes());
    buf
}
