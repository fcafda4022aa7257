use bson::raw::{RawBsonRef, RawDocument};
use bson::{Binary, Document, spec::BinarySubtype};

use vellum_engine::NameResolver;
use vellum_query::ErrorKind;

use crate::error::DbError;

/// Tag byte of the compact `_id` encoding: a 9-byte binary blob whose
/// remaining 8 bytes are the collection id in little-endian.
pub const CUSTOM_ID_TAG: u8 = 0xF3;

/// Extract the document key from a value.
///
/// - object → its string `_key` attribute (anything else is the empty
///   string)
/// - string → the whole string, or the part after the first `/` when it
///   is a full `<collection>/<key>` handle
/// - other types → empty string
pub fn extract_key(value: RawBsonRef<'_>) -> String {
    match value {
        RawBsonRef::Document(doc) => match doc.get("_key") {
            Ok(Some(RawBsonRef::String(key))) => key.to_string(),
            _ => String::new(),
        },
        RawBsonRef::String(handle) => match handle.find('/') {
            Some(pos) => handle[pos + 1..].to_string(),
            None => handle.to_string(),
        },
        _ => String::new(),
    }
}

fn string_field(doc: &RawDocument, name: &str) -> Option<String> {
    match doc.get(name) {
        Ok(Some(RawBsonRef::String(value))) => Some(value.to_string()),
        _ => None,
    }
}

/// Build the full `<collection>/<key>` form of a document's `_id`.
///
/// A literal string `_id` passes through. The compact form is decoded
/// through the resolver's cluster-aware lookup, with the `_key` taken from
/// the value itself first and from `base` second; a missing or non-string
/// `_key` is a hard invalid-document-type error.
pub fn extract_id_string(
    resolver: &dyn NameResolver,
    value: RawBsonRef<'_>,
    base: &RawDocument,
) -> Result<String, DbError> {
    let (id_value, key_source) = match value {
        RawBsonRef::Document(doc) => {
            let id = doc
                .get("_id")
                .ok()
                .flatten()
                .ok_or_else(|| DbError::new(ErrorKind::DocumentHandleBad, "missing _id"))?;
            (id, Some(doc))
        }
        other => (other, None),
    };

    match id_value {
        RawBsonRef::String(id) => Ok(id.to_string()),
        RawBsonRef::Binary(blob) if blob.bytes.len() == 9 && blob.bytes[0] == CUSTOM_ID_TAG => {
            let cid = u64::from_le_bytes(blob.bytes[1..9].try_into().unwrap());
            let name = resolver.collection_name_or_id(cid);
            let key = key_source
                .and_then(|doc| string_field(doc, "_key"))
                .or_else(|| string_field(base, "_key"))
                .ok_or_else(|| {
                    DbError::new(ErrorKind::DocumentTypeInvalid, "no _key for compact _id")
                })?;
            Ok(format!("{name}/{key}"))
        }
        _ => Err(DbError::new(
            ErrorKind::DocumentTypeInvalid,
            "_id is neither a string nor a compact id",
        )),
    }
}

/// Encode the compact `_id` form for a collection id.
pub fn encode_custom_id(cid: u64) -> Binary {
    let mut bytes = Vec::with_capacity(9);
    bytes.push(CUSTOM_ID_TAG);
    bytes.extend_from_slice(&cid.to_le_bytes());
    Binary {
        subtype: BinarySubtype::Generic,
        bytes,
    }
}

/// Write the identity object returned from document operations: `_id`,
/// `_key`, `_rev`, and optionally `_oldRev`, `old` and `new`.
pub fn build_document_identity(
    collection_name: &str,
    key: &str,
    rev: &str,
    old_rev: Option<&str>,
    old: Option<&Document>,
    new: Option<&Document>,
) -> Document {
    let mut identity = Document::new();
    identity.insert("_id", format!("{collection_name}/{key}"));
    identity.insert("_key", key);
    identity.insert("_rev", rev);
    if let Some(old_rev) = old_rev {
        identity.insert("_oldRev", old_rev);
    }
    if let Some(old) = old {
        identity.insert("old", old.clone());
    }
    if let Some(new) = new {
        identity.insert("new", new.clone());
    }
    identity
}
