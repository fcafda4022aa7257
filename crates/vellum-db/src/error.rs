use std::fmt;

use vellum_engine::EngineError;
use vellum_query::ErrorKind;
use vellum_store::StoreError;

/// A hard failure from the façade: an error kind plus context.
///
/// Per-document conditions (not found, conflict, …) travel in
/// [`OperationResult`](crate::OperationResult) instead; `DbError` is for
/// failures that abort the call.
#[derive(Debug)]
pub struct DbError {
    kind: ErrorKind,
    message: String,
}

impl DbError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> DbError {
        DbError {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl From<ErrorKind> for DbError {
    fn from(kind: ErrorKind) -> Self {
        DbError {
            kind,
            message: kind.message().to_string(),
        }
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (error {})", self.message, self.kind.code())
    }
}

impl std::error::Error for DbError {}

impl From<EngineError> for DbError {
    fn from(e: EngineError) -> Self {
        let kind = match &e {
            EngineError::CollectionNotFound(_) => ErrorKind::CollectionNotFound,
            EngineError::UniqueConstraintViolated(_) => ErrorKind::UniqueConstraintViolated,
            EngineError::DocumentKeyBad(_) => ErrorKind::DocumentKeyBad,
            EngineError::IndexNotFound(_) => ErrorKind::IndexNotFound,
            EngineError::CollectionExists(_) => ErrorKind::BadParameter,
            EngineError::Encoding(_) | EngineError::Store(_) => ErrorKind::Internal,
        };
        DbError::new(kind, e.to_string())
    }
}

impl From<StoreError> for DbError {
    fn from(e: StoreError) -> Self {
        DbError::new(ErrorKind::Internal, e.to_string())
    }
}

impl From<bson::error::Error> for DbError {
    fn from(e: bson::error::Error) -> Self {
        DbError::new(ErrorKind::Internal, e.to_string())
    }
}
