use std::collections::BTreeSet;

use bson::Bson;
use serde::Deserialize;

use vellum_query::{ErrorKind, OperationOptions};

use crate::error::DbError;
use crate::protocol::{NOLOCK_HEADER, RequestMethod, document_path, options_query};
use crate::result::OperationResult;

/// A request routed to the shard responsible for a document.
#[derive(Debug, Clone, PartialEq)]
pub struct ShardRequest {
    /// Collection the dispatcher routes by.
    pub collection: String,
    pub method: RequestMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

/// The raw response of a shard server.
#[derive(Debug, Clone, PartialEq)]
pub struct ShardResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Routing seam: resolves the responsible shard server and performs the
/// HTTP exchange.
pub trait ShardDispatcher {
    fn dispatch(&self, request: ShardRequest) -> Result<ShardResponse, DbError>;
}

/// Per-call dispatch state. Collections listed in `nolock` are already
/// locked by this server; dispatched requests tell the remote side to
/// skip re-locking them.
#[derive(Debug, Clone, Default)]
pub struct DispatchContext {
    nolock: Option<BTreeSet<String>>,
}

impl DispatchContext {
    pub fn with_nolock(collections: BTreeSet<String>) -> DispatchContext {
        DispatchContext {
            nolock: Some(collections),
        }
    }

    fn nolock_header(&self, collection: &str) -> Option<(String, String)> {
        let set = self.nolock.as_ref()?;
        set.contains(collection)
            .then(|| (NOLOCK_HEADER.to_string(), collection.to_string()))
    }
}

/// Which operation a response is mapped for; inserts map 404 differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CoordinatorOp {
    Read,
    Insert,
    Update,
    Replace,
    Remove,
}

/// The coordinator-side CRUD pipeline: routes single-document operations
/// through the shard dispatcher and maps HTTP statuses back to error
/// kinds. Multi-document (array) values are not implemented here.
pub struct CoordinatorMethods<'a, D: ShardDispatcher> {
    db: String,
    dispatcher: &'a D,
    context: DispatchContext,
}

impl<'a, D: ShardDispatcher> CoordinatorMethods<'a, D> {
    pub fn new(db: impl Into<String>, dispatcher: &'a D) -> CoordinatorMethods<'a, D> {
        CoordinatorMethods {
            db: db.into(),
            dispatcher,
            context: DispatchContext::default(),
        }
    }

    /// Bind the dispatch context for subsequent calls.
    pub fn with_context(mut self, context: DispatchContext) -> CoordinatorMethods<'a, D> {
        self.context = context;
        self
    }

    pub fn document(
        &self,
        collection: &str,
        value: &Bson,
        options: &OperationOptions,
    ) -> Result<OperationResult, DbError> {
        self.keyed_operation(CoordinatorOp::Read, RequestMethod::Get, collection, value, options)
    }

    pub fn insert_document(
        &self,
        collection: &str,
        value: &Bson,
        options: &OperationOptions,
    ) -> Result<OperationResult, DbError> {
        if matches!(value, Bson::Array(_)) {
            return Ok(OperationResult::error(ErrorKind::NotImplemented));
        }
        let request = self.build_request(
            RequestMethod::Post,
            collection,
            None,
            Some(value),
            options,
        )?;
        let response = self.dispatcher.dispatch(request)?;
        Ok(map_response(CoordinatorOp::Insert, response, options))
    }

    pub fn update_document(
        &self,
        collection: &str,
        value: &Bson,
        options: &OperationOptions,
    ) -> Result<OperationResult, DbError> {
        self.keyed_operation(
            CoordinatorOp::Update,
            RequestMethod::Patch,
            collection,
            value,
            options,
        )
    }

    pub fn replace_document(
        &self,
        collection: &str,
        value: &Bson,
        options: &OperationOptions,
    ) -> Result<OperationResult, DbError> {
        self.keyed_operation(
            CoordinatorOp::Replace,
            RequestMethod::Put,
            collection,
            value,
            options,
        )
    }

    pub fn remove_document(
        &self,
        collection: &str,
        value: &Bson,
        options: &OperationOptions,
    ) -> Result<OperationResult, DbError> {
        self.keyed_operation(
            CoordinatorOp::Remove,
            RequestMethod::Delete,
            collection,
            value,
            options,
        )
    }

    fn keyed_operation(
        &self,
        op: CoordinatorOp,
        method: RequestMethod,
        collection: &str,
        value: &Bson,
        options: &OperationOptions,
    ) -> Result<OperationResult, DbError> {
        if matches!(value, Bson::Array(_)) {
            return Ok(OperationResult::error(ErrorKind::NotImplemented));
        }
        let key = extract_request_key(value);
        if key.is_empty() {
            return Ok(OperationResult::error(ErrorKind::DocumentHandleBad));
        }
        let body = match method {
            RequestMethod::Get | RequestMethod::Delete => None,
            _ => Some(value),
        };
        let request = self.build_request(method, collection, Some(&key), body, options)?;
        let response = self.dispatcher.dispatch(request)?;
        Ok(map_response(op, response, options))
    }

    fn build_request(
        &self,
        method: RequestMethod,
        collection: &str,
        key: Option<&str>,
        body: Option<&Bson>,
        options: &OperationOptions,
    ) -> Result<ShardRequest, DbError> {
        let body = body
            .map(|value| {
                serde_json::to_vec(value)
                    .map_err(|e| DbError::new(ErrorKind::Internal, e.to_string()))
            })
            .transpose()?;
        let mut headers = Vec::new();
        if let Some(header) = self.context.nolock_header(collection) {
            headers.push(header);
        }
        Ok(ShardRequest {
            collection: collection.to_string(),
            method,
            path: document_path(&self.db, collection, key),
            query: options_query(options),
            headers,
            body,
        })
    }
}

fn extract_request_key(value: &Bson) -> String {
    match value {
        Bson::String(handle) => match handle.find('/') {
            Some(pos) => handle[pos + 1..].to_string(),
            None => handle.clone(),
        },
        Bson::Document(doc) => match doc.get_str("_key") {
            Ok(key) => key.to_string(),
            Err(_) => match doc.get_str("_id") {
                Ok(id) => match id.find('/') {
                    Some(pos) => id[pos + 1..].to_string(),
                    None => String::new(),
                },
                Err(_) => String::new(),
            },
        },
        _ => String::new(),
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "errorNum", default)]
    error_num: i32,
    #[serde(rename = "errorMessage", default)]
    error_message: String,
}

fn parse_payload(body: &[u8]) -> Result<Option<Bson>, OperationResult> {
    if body.is_empty() {
        return Ok(None);
    }
    match serde_json::from_slice::<Bson>(body) {
        Ok(value) => Ok(Some(value)),
        Err(e) => Err(OperationResult::error_with(
            ErrorKind::Internal,
            format!(
                "cannot parse response body: {e}; body: {}",
                String::from_utf8_lossy(body)
            ),
        )),
    }
}

/// Map a shard response onto an operation result.
///
/// `201 Created` reports the write as synced to disk. Error statuses carry
/// a JSON body with `errorNum`/`errorMessage`; `409` and `412` fix the
/// error kind from the status and still parse the body for the message and
/// the current document identity.
fn map_response(
    op: CoordinatorOp,
    response: ShardResponse,
    options: &OperationOptions,
) -> OperationResult {
    match response.status {
        200 | 201 | 202 => {
            let payload = match parse_payload(&response.body) {
                Ok(payload) => payload,
                Err(result) => return result,
            };
            let mut result =
                OperationResult::success(None, response.status == 201 || options.wait_for_sync);
            if !options.silent {
                result.payload = payload;
            }
            result
        }
        400 => error_from_body(ErrorKind::BadParameter, &response.body),
        404 => {
            let kind = if op == CoordinatorOp::Insert {
                ErrorKind::CollectionNotFound
            } else {
                ErrorKind::DocumentNotFound
            };
            OperationResult::error(kind)
        }
        409 => fixed_error_with_body(ErrorKind::UniqueConstraintViolated, &response.body),
        412 => fixed_error_with_body(ErrorKind::Conflict, &response.body),
        status => OperationResult::error_with(
            ErrorKind::Internal,
            format!("unexpected response status {status}"),
        ),
    }
}

/// 400: the error kind itself comes out of the body's `errorNum`.
fn error_from_body(fallback: ErrorKind, body: &[u8]) -> OperationResult {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(parsed) => {
            let kind = ErrorKind::from_code(parsed.error_num).unwrap_or(fallback);
            let message = if parsed.error_message.is_empty() {
                kind.message().to_string()
            } else {
                parsed.error_message
            };
            OperationResult::error_with(kind, message)
        }
        Err(e) => OperationResult::error_with(
            ErrorKind::Internal,
            format!(
                "cannot parse error body: {e}; body: {}",
                String::from_utf8_lossy(body)
            ),
        ),
    }
}

/// 409/412: the kind is fixed by the status; the body still contributes
/// the message and the current document identity.
fn fixed_error_with_body(kind: ErrorKind, body: &[u8]) -> OperationResult {
    let mut result = OperationResult::error(kind);
    if body.is_empty() {
        return result;
    }
    match serde_json::from_slice::<Bson>(body) {
        Ok(value) => {
            if let Bson::Document(doc) = &value {
                if let Ok(message) = doc.get_str("errorMessage") {
                    result.message = message.to_string();
                }
            }
            result.payload = Some(value);
        }
        Err(e) => {
            return OperationResult::error_with(
                ErrorKind::Internal,
                format!(
                    "cannot parse error body: {e}; body: {}",
                    String::from_utf8_lossy(body)
                ),
            );
        }
    }
    result
}
