use std::collections::HashMap;

use bson::Bson;

use vellum_query::ErrorKind;

/// Outcome of one façade operation: a top-level status, an optional
/// payload, and per-error-kind counters for multi-document operations.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationResult {
    pub kind: ErrorKind,
    pub message: String,
    pub payload: Option<Bson>,
    /// Per-document failures keyed by numeric error code.
    pub error_counts: HashMap<i32, u64>,
    pub wait_for_sync: bool,
}

impl OperationResult {
    pub fn success(payload: Option<Bson>, wait_for_sync: bool) -> OperationResult {
        OperationResult {
            kind: ErrorKind::NoError,
            message: String::new(),
            payload,
            error_counts: HashMap::new(),
            wait_for_sync,
        }
    }

    pub fn error(kind: ErrorKind) -> OperationResult {
        OperationResult::error_with(kind, kind.message())
    }

    pub fn error_with(kind: ErrorKind, message: impl Into<String>) -> OperationResult {
        OperationResult {
            kind,
            message: message.into(),
            payload: None,
            error_counts: HashMap::new(),
            wait_for_sync: false,
        }
    }

    pub fn with_payload(mut self, payload: Bson) -> OperationResult {
        self.payload = Some(payload);
        self
    }

    pub fn is_ok(&self) -> bool {
        !self.kind.is_error()
    }

    pub(crate) fn count_error(&mut self, kind: ErrorKind) {
        *self.error_counts.entry(kind.code()).or_insert(0) += 1;
    }
}
