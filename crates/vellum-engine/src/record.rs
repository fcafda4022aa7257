use bson::Document;
use bson::raw::{RawDocument, RawDocumentBuf};

use crate::error::EngineError;

/// A stored record: revision token + raw BSON document bytes.
///
/// Layout: `[rev_len: 2 BE][rev_utf8][BSON…]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub rev: String,
    pub doc: Document,
}

impl Record {
    pub fn new(rev: String, doc: Document) -> Record {
        Record { rev, doc }
    }

    pub fn encode(&self) -> Result<Vec<u8>, EngineError> {
        let raw = RawDocumentBuf::try_from(&self.doc)?;
        let doc_bytes = raw.as_bytes();
        let rev_bytes = self.rev.as_bytes();
        let mut buf = Vec::with_capacity(2 + rev_bytes.len() + doc_bytes.len());
        buf.extend_from_slice(&(rev_bytes.len() as u16).to_be_bytes());
        buf.extend_from_slice(rev_bytes);
        buf.extend_from_slice(doc_bytes);
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Record, EngineError> {
        if bytes.len() < 2 {
            return Err(EngineError::Encoding("record too short".into()));
        }
        let rev_len = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
        let doc_start = 2 + rev_len;
        if bytes.len() < doc_start {
            return Err(EngineError::Encoding("record revision truncated".into()));
        }
        let rev = std::str::from_utf8(&bytes[2..doc_start])
            .map_err(|e| EngineError::Encoding(format!("invalid revision: {e}")))?
            .to_string();
        let raw = RawDocument::from_bytes(&bytes[doc_start..])?;
        let doc = Document::try_from(raw)?;
        Ok(Record { rev, doc })
    }
}
