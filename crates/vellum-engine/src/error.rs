use std::fmt;

use vellum_store::StoreError;

#[derive(Debug)]
pub enum EngineError {
    Store(StoreError),
    Encoding(String),
    CollectionNotFound(String),
    CollectionExists(String),
    IndexNotFound(String),
    UniqueConstraintViolated(String),
    DocumentKeyBad(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(e) => write!(f, "store error: {e}"),
            Self::Encoding(msg) => write!(f, "encoding error: {msg}"),
            Self::CollectionNotFound(name) => write!(f, "collection not found: {name}"),
            Self::CollectionExists(name) => write!(f, "collection already exists: {name}"),
            Self::IndexNotFound(id) => write!(f, "index not found: {id}"),
            Self::UniqueConstraintViolated(key) => {
                write!(f, "unique constraint violated: {key}")
            }
            Self::DocumentKeyBad(key) => write!(f, "illegal document key: {key}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<bson::error::Error> for EngineError {
    fn from(e: bson::error::Error) -> Self {
        Self::Encoding(e.to_string())
    }
}
