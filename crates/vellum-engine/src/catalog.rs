use bson::Document;
use bson::raw::{RawDocument, RawDocumentBuf};

use crate::error::EngineError;

/// Cluster-aware collection name lookup.
///
/// On a single server this is backed by the engine's catalog; on a
/// coordinator by the cluster metadata directory. An id without a known
/// name renders as its decimal form.
pub trait NameResolver {
    fn collection_name(&self, cid: u64) -> Option<String>;
    fn collection_id(&self, name: &str) -> Option<u64>;

    fn collection_name_or_id(&self, cid: u64) -> String {
        self.collection_name(cid).unwrap_or_else(|| cid.to_string())
    }
}

/// Catalog entry for one collection.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CollectionMeta {
    pub id: u64,
    pub name: String,
}

impl CollectionMeta {
    pub(crate) fn encode(&self) -> Result<Vec<u8>, EngineError> {
        let mut doc = Document::new();
        doc.insert("id", self.id as i64);
        doc.insert("name", self.name.clone());
        Ok(RawDocumentBuf::try_from(&doc)?.into_bytes())
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<CollectionMeta, EngineError> {
        let raw = RawDocument::from_bytes(bytes)?;
        let doc = Document::try_from(raw)?;
        Ok(CollectionMeta {
            id: doc
                .get_i64("id")
                .map_err(|_| EngineError::Encoding("collection meta missing id".into()))?
                as u64,
            name: doc
                .get_str("name")
                .map_err(|_| EngineError::Encoding("collection meta missing name".into()))?
                .to_string(),
        })
    }
}

pub(crate) fn encode_descriptor(doc: &Document) -> Result<Vec<u8>, EngineError> {
    Ok(RawDocumentBuf::try_from(doc)?.into_bytes())
}

pub(crate) fn decode_descriptor(bytes: &[u8]) -> Result<Document, EngineError> {
    let raw = RawDocument::from_bytes(bytes)?;
    Ok(Document::try_from(raw)?)
}
