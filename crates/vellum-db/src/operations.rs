use std::sync::Arc;

use bson::{Bson, Document};

use vellum_engine::{AccessMode, Collection, EngineError};
use vellum_query::{ErrorKind, OperationOptions};
use vellum_store::Store;

use crate::cursor::CursorKind;
use crate::error::DbError;
use crate::identity::build_document_identity;
use crate::protocol::RequestMethod;
use crate::result::OperationResult;
use crate::transaction::Transaction;

/// Form of the strings emitted by [`Transaction::all_keys`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEmission {
    /// Bare keys.
    Key,
    /// `<collection>/<key>` handles.
    Id,
    /// Full document URLs, `/_db/<db>/_api/document/<collection>/<key>`.
    Path,
}

/// A per-document failure inside an operation.
struct OpFailure {
    kind: ErrorKind,
    message: String,
    /// Current document identity, recorded on revision conflicts.
    identity: Option<Document>,
}

impl OpFailure {
    fn new(kind: ErrorKind, message: impl Into<String>) -> OpFailure {
        OpFailure {
            kind,
            message: message.into(),
            identity: None,
        }
    }

    fn conflict(identity: Document) -> OpFailure {
        OpFailure {
            kind: ErrorKind::Conflict,
            message: ErrorKind::Conflict.message().to_string(),
            identity: Some(identity),
        }
    }

    fn placeholder(&self) -> Document {
        bson::doc! { "error": true, "errorNum": self.kind.code() }
    }
}

impl From<DbError> for OpFailure {
    fn from(e: DbError) -> Self {
        OpFailure::new(e.kind(), e.to_string())
    }
}

impl From<EngineError> for OpFailure {
    fn from(e: EngineError) -> Self {
        DbError::from(e).into()
    }
}

/// Extract the addressed key and the expected revision from a request
/// value: a bare key string, a `<collection>/<key>` handle, or an object
/// carrying `_key` (or a string `_id`) and optionally `_rev`.
fn key_and_rev(value: &Bson) -> (String, Option<String>) {
    match value {
        Bson::String(handle) => {
            let key = match handle.find('/') {
                Some(pos) => handle[pos + 1..].to_string(),
                None => handle.clone(),
            };
            (key, None)
        }
        Bson::Document(doc) => {
            let key = match doc.get_str("_key") {
                Ok(key) => key.to_string(),
                Err(_) => match doc.get_str("_id") {
                    Ok(id) => match id.find('/') {
                        Some(pos) => id[pos + 1..].to_string(),
                        None => String::new(),
                    },
                    Err(_) => String::new(),
                },
            };
            let rev = doc.get_str("_rev").ok().map(|rev| rev.to_string());
            (key, rev)
        }
        _ => (String::new(), None),
    }
}

fn strip_system_attributes(doc: &Document) -> Document {
    let mut out = Document::new();
    for (name, value) in doc {
        if name == "_id" || name == "_key" || name == "_rev" {
            continue;
        }
        out.insert(name.clone(), value.clone());
    }
    out
}

impl<S: Store> Transaction<S> {
    fn result_wait_for_sync(&self, options: &OperationOptions) -> bool {
        options.wait_for_sync || self.wait_for_sync()
    }

    fn replicate_write(
        &self,
        method: RequestMethod,
        collection: &str,
        key: Option<&str>,
        value: &Bson,
        options: &OperationOptions,
    ) {
        let db = self.context().db_name().to_string();
        self.context().with_replication(|state| {
            state.replicate_write(&db, collection, method, key, value, options);
        });
    }

    // ── document ────────────────────────────────────────────────

    /// Read one document or a batch of documents.
    pub fn document(
        &mut self,
        collection: &str,
        value: &Bson,
        options: &OperationOptions,
    ) -> Result<OperationResult, DbError> {
        self.require_running()?;
        let coll = self.collection_for(collection, AccessMode::Read)?;
        let _pin = coll.pin();
        let level = self.nesting_level();
        let was_locked = self.is_locked(collection, AccessMode::Read);
        if !was_locked {
            self.lock(collection, AccessMode::Read, level)?;
        }
        let outcome = self.document_internal(&coll, value, options);
        if !was_locked {
            self.unlock(collection, AccessMode::Read, level)?;
        }
        let result = outcome?;
        self.any_failure |= !result.is_ok();
        Ok(result)
    }

    fn document_internal(
        &self,
        coll: &Arc<Collection>,
        value: &Bson,
        options: &OperationOptions,
    ) -> Result<OperationResult, DbError> {
        match value {
            Bson::Array(items) => {
                let mut result =
                    OperationResult::success(None, self.result_wait_for_sync(options));
                let mut payload = Vec::with_capacity(items.len());
                for item in items {
                    match self.document_one(coll, item, options) {
                        Ok(doc) => payload.push(Bson::Document(doc)),
                        Err(failure) => {
                            result.count_error(failure.kind);
                            payload.push(Bson::Document(failure.placeholder()));
                        }
                    }
                }
                if !options.silent {
                    result.payload = Some(Bson::Array(payload));
                }
                Ok(result)
            }
            _ => match self.document_one(coll, value, options) {
                Ok(doc) => Ok(OperationResult::success(
                    (!options.silent).then_some(Bson::Document(doc)),
                    self.result_wait_for_sync(options),
                )),
                Err(failure) => Ok(self.failure_result(failure, options)),
            },
        }
    }

    fn document_one(
        &self,
        coll: &Arc<Collection>,
        value: &Bson,
        options: &OperationOptions,
    ) -> Result<Document, OpFailure> {
        let (key, expected_rev) = key_and_rev(value);
        if key.is_empty() {
            return Err(OpFailure::new(
                ErrorKind::DocumentHandleBad,
                "cannot extract a document key",
            ));
        }

        let handle = self.handle().map_err(OpFailure::from)?;
        let stored = handle
            .borrow()
            .read_document(coll, &key)
            .map_err(OpFailure::from)?
            .ok_or_else(|| OpFailure::new(ErrorKind::DocumentNotFound, key.clone()))?;

        if !options.ignore_revs {
            if let Some(expected) = expected_rev {
                if expected != stored.rev {
                    return Err(OpFailure::conflict(build_document_identity(
                        &coll.name, &key, &stored.rev, None, None, None,
                    )));
                }
            }
        }

        let mut doc = stored.doc;
        doc.insert("_id", format!("{}/{}", coll.name, stored.key));
        Ok(doc)
    }

    fn failure_result(&self, failure: OpFailure, options: &OperationOptions) -> OperationResult {
        let mut result = OperationResult::error_with(failure.kind, failure.message);
        if !options.silent {
            if let Some(identity) = failure.identity {
                result.payload = Some(Bson::Document(identity));
            }
        }
        result
    }

    // ── insert ──────────────────────────────────────────────────

    /// Insert one document or a batch. Batch elements fail independently;
    /// their failures are counted per error kind.
    pub fn insert(
        &mut self,
        collection: &str,
        value: &Bson,
        options: &OperationOptions,
    ) -> Result<OperationResult, DbError> {
        self.require_running()?;
        let coll = self.collection_for(collection, AccessMode::Write)?;
        let _pin = coll.pin();
        let level = self.nesting_level();
        let was_locked = self.is_locked(collection, AccessMode::Write);
        if !was_locked {
            self.lock(collection, AccessMode::Write, level)?;
        }
        let outcome = self.insert_internal(&coll, value, options);
        if !was_locked {
            self.unlock(collection, AccessMode::Write, level)?;
        }
        let result = outcome?;
        self.any_failure |= !result.is_ok();
        if result.is_ok() {
            self.replicate_write(RequestMethod::Post, collection, None, value, options);
        }
        Ok(result)
    }

    fn insert_internal(
        &self,
        coll: &Arc<Collection>,
        value: &Bson,
        options: &OperationOptions,
    ) -> Result<OperationResult, DbError> {
        match value {
            Bson::Array(items) => {
                let mut result =
                    OperationResult::success(None, self.result_wait_for_sync(options));
                let mut payload = Vec::with_capacity(items.len());
                for item in items {
                    match self.insert_one(coll, item, options) {
                        Ok(identity) => payload.push(Bson::Document(identity)),
                        Err(failure) => {
                            result.count_error(failure.kind);
                            payload.push(Bson::Document(failure.placeholder()));
                        }
                    }
                }
                if !options.silent {
                    result.payload = Some(Bson::Array(payload));
                }
                Ok(result)
            }
            _ => match self.insert_one(coll, value, options) {
                Ok(identity) => Ok(OperationResult::success(
                    (!options.silent).then_some(Bson::Document(identity)),
                    self.result_wait_for_sync(options),
                )),
                Err(failure) => Ok(self.failure_result(failure, options)),
            },
        }
    }

    fn insert_one(
        &self,
        coll: &Arc<Collection>,
        value: &Bson,
        options: &OperationOptions,
    ) -> Result<Document, OpFailure> {
        let Bson::Document(doc) = value else {
            return Err(OpFailure::new(
                ErrorKind::DocumentTypeInvalid,
                "document must be an object",
            ));
        };

        let mut working = strip_system_attributes(doc);
        let key = match doc.get("_key") {
            Some(Bson::String(key)) => key.clone(),
            Some(_) => {
                return Err(OpFailure::new(
                    ErrorKind::DocumentKeyBad,
                    "_key must be a string",
                ));
            }
            None => self.context().engine().clock().next_token(),
        };
        working.insert("_key", key.clone());

        let handle = self.handle().map_err(OpFailure::from)?;
        let (key, rev) = handle
            .borrow_mut()
            .insert_document(coll, working)
            .map_err(OpFailure::from)?;

        let new_doc = if options.return_new {
            handle
                .borrow()
                .read_document(coll, &key)
                .map_err(OpFailure::from)?
                .map(|stored| {
                    let mut doc = stored.doc;
                    doc.insert("_id", format!("{}/{}", coll.name, key));
                    doc
                })
        } else {
            None
        };

        Ok(build_document_identity(
            &coll.name,
            &key,
            &rev,
            None,
            None,
            new_doc.as_ref(),
        ))
    }

    // ── update / replace ────────────────────────────────────────

    /// Partially update one document or a batch; the first failing element
    /// stops a batch.
    pub fn update(
        &mut self,
        collection: &str,
        value: &Bson,
        options: &OperationOptions,
    ) -> Result<OperationResult, DbError> {
        self.modify(collection, value, options, false)
    }

    /// Replace one document or a batch wholesale; the first failing
    /// element stops a batch.
    pub fn replace(
        &mut self,
        collection: &str,
        value: &Bson,
        options: &OperationOptions,
    ) -> Result<OperationResult, DbError> {
        self.modify(collection, value, options, true)
    }

    fn modify(
        &mut self,
        collection: &str,
        value: &Bson,
        options: &OperationOptions,
        replace: bool,
    ) -> Result<OperationResult, DbError> {
        self.require_running()?;
        let coll = self.collection_for(collection, AccessMode::Write)?;
        let _pin = coll.pin();
        let level = self.nesting_level();
        let was_locked = self.is_locked(collection, AccessMode::Write);
        if !was_locked {
            self.lock(collection, AccessMode::Write, level)?;
        }
        let outcome = self.modify_internal(&coll, value, options, replace);
        if !was_locked {
            self.unlock(collection, AccessMode::Write, level)?;
        }
        let result = outcome?;
        self.any_failure |= !result.is_ok();
        if result.is_ok() {
            let method = if replace {
                RequestMethod::Put
            } else {
                RequestMethod::Patch
            };
            let key = match value {
                Bson::Array(_) => None,
                single => Some(key_and_rev(single).0),
            };
            self.replicate_write(method, collection, key.as_deref(), value, options);
        }
        Ok(result)
    }

    fn modify_internal(
        &self,
        coll: &Arc<Collection>,
        value: &Bson,
        options: &OperationOptions,
        replace: bool,
    ) -> Result<OperationResult, DbError> {
        match value {
            Bson::Array(items) => {
                let mut result =
                    OperationResult::success(None, self.result_wait_for_sync(options));
                let mut payload = Vec::with_capacity(items.len());
                for item in items {
                    match self.modify_one(coll, item, options, replace) {
                        Ok(identity) => payload.push(Bson::Document(identity)),
                        Err(failure) => {
                            // The first failure stops the batch.
                            result.count_error(failure.kind);
                            result.kind = failure.kind;
                            payload.push(Bson::Document(failure.placeholder()));
                            result.message = failure.message;
                            break;
                        }
                    }
                }
                if !options.silent {
                    result.payload = Some(Bson::Array(payload));
                }
                Ok(result)
            }
            _ => match self.modify_one(coll, value, options, replace) {
                Ok(identity) => Ok(OperationResult::success(
                    (!options.silent).then_some(Bson::Document(identity)),
                    self.result_wait_for_sync(options),
                )),
                Err(failure) => Ok(self.failure_result(failure, options)),
            },
        }
    }

    fn modify_one(
        &self,
        coll: &Arc<Collection>,
        value: &Bson,
        options: &OperationOptions,
        replace: bool,
    ) -> Result<Document, OpFailure> {
        let Bson::Document(patch) = value else {
            return Err(OpFailure::new(
                ErrorKind::DocumentTypeInvalid,
                "document must be an object",
            ));
        };

        let (key, expected_rev) = key_and_rev(value);
        if key.is_empty() {
            return Err(OpFailure::new(
                ErrorKind::DocumentHandleBad,
                "cannot extract a document key",
            ));
        }

        let handle = self.handle().map_err(OpFailure::from)?;
        let stored = handle
            .borrow()
            .read_document(coll, &key)
            .map_err(OpFailure::from)?
            .ok_or_else(|| OpFailure::new(ErrorKind::DocumentNotFound, key.clone()))?;

        if !options.ignore_revs {
            if let Some(expected) = expected_rev {
                if expected != stored.rev {
                    return Err(OpFailure::conflict(build_document_identity(
                        &coll.name, &key, &stored.rev, None, None, None,
                    )));
                }
            }
        }

        let next = if replace {
            strip_system_attributes(patch)
        } else {
            let mut merged = stored.doc.clone();
            merged.remove("_rev");
            for (name, new_value) in strip_system_attributes(patch) {
                merged.insert(name, new_value);
            }
            merged
        };

        let (new_rev, old) = handle
            .borrow_mut()
            .replace_document(coll, &key, next)
            .map_err(OpFailure::from)?
            .ok_or_else(|| OpFailure::new(ErrorKind::DocumentNotFound, key.clone()))?;

        let old_doc = options.return_old.then(|| {
            let mut doc = old.doc.clone();
            doc.insert("_id", format!("{}/{}", coll.name, key));
            doc
        });
        let new_doc = if options.return_new {
            handle
                .borrow()
                .read_document(coll, &key)
                .map_err(OpFailure::from)?
                .map(|stored| {
                    let mut doc = stored.doc;
                    doc.insert("_id", format!("{}/{}", coll.name, key));
                    doc
                })
        } else {
            None
        };

        Ok(build_document_identity(
            &coll.name,
            &key,
            &new_rev,
            Some(&old.rev),
            old_doc.as_ref(),
            new_doc.as_ref(),
        ))
    }

    // ── remove ──────────────────────────────────────────────────

    /// Remove one document or a batch; the first failing element stops a
    /// batch.
    pub fn remove(
        &mut self,
        collection: &str,
        value: &Bson,
        options: &OperationOptions,
    ) -> Result<OperationResult, DbError> {
        self.require_running()?;
        let coll = self.collection_for(collection, AccessMode::Write)?;
        let _pin = coll.pin();
        let level = self.nesting_level();
        let was_locked = self.is_locked(collection, AccessMode::Write);
        if !was_locked {
            self.lock(collection, AccessMode::Write, level)?;
        }
        let outcome = self.remove_internal(&coll, value, options);
        if !was_locked {
            self.unlock(collection, AccessMode::Write, level)?;
        }
        let result = outcome?;
        self.any_failure |= !result.is_ok();
        if result.is_ok() {
            let key = match value {
                Bson::Array(_) => None,
                single => Some(key_and_rev(single).0),
            };
            self.replicate_write(
                RequestMethod::Delete,
                collection,
                key.as_deref(),
                value,
                options,
            );
        }
        Ok(result)
    }

    fn remove_internal(
        &self,
        coll: &Arc<Collection>,
        value: &Bson,
        options: &OperationOptions,
    ) -> Result<OperationResult, DbError> {
        match value {
            Bson::Array(items) => {
                let mut result =
                    OperationResult::success(None, self.result_wait_for_sync(options));
                let mut payload = Vec::with_capacity(items.len());
                for item in items {
                    match self.remove_one(coll, item, options) {
                        Ok(identity) => payload.push(Bson::Document(identity)),
                        Err(failure) => {
                            result.count_error(failure.kind);
                            result.kind = failure.kind;
                            payload.push(Bson::Document(failure.placeholder()));
                            result.message = failure.message;
                            break;
                        }
                    }
                }
                if !options.silent {
                    result.payload = Some(Bson::Array(payload));
                }
                Ok(result)
            }
            _ => match self.remove_one(coll, value, options) {
                Ok(identity) => Ok(OperationResult::success(
                    (!options.silent).then_some(Bson::Document(identity)),
                    self.result_wait_for_sync(options),
                )),
                Err(failure) => Ok(self.failure_result(failure, options)),
            },
        }
    }

    fn remove_one(
        &self,
        coll: &Arc<Collection>,
        value: &Bson,
        options: &OperationOptions,
    ) -> Result<Document, OpFailure> {
        let (key, expected_rev) = key_and_rev(value);
        if key.is_empty() {
            return Err(OpFailure::new(
                ErrorKind::DocumentHandleBad,
                "cannot extract a document key",
            ));
        }

        let handle = self.handle().map_err(OpFailure::from)?;
        let stored = handle
            .borrow()
            .read_document(coll, &key)
            .map_err(OpFailure::from)?
            .ok_or_else(|| OpFailure::new(ErrorKind::DocumentNotFound, key.clone()))?;

        if !options.ignore_revs {
            if let Some(expected) = expected_rev {
                if expected != stored.rev {
                    return Err(OpFailure::conflict(build_document_identity(
                        &coll.name, &key, &stored.rev, None, None, None,
                    )));
                }
            }
        }

        let old = handle
            .borrow_mut()
            .remove_document(coll, &key)
            .map_err(OpFailure::from)?
            .ok_or_else(|| OpFailure::new(ErrorKind::DocumentNotFound, key.clone()))?;

        let old_doc = options.return_old.then(|| {
            let mut doc = old.doc.clone();
            doc.insert("_id", format!("{}/{}", coll.name, key));
            doc
        });

        Ok(build_document_identity(
            &coll.name,
            &key,
            &old.rev,
            None,
            old_doc.as_ref(),
            None,
        ))
    }

    // ── truncate ────────────────────────────────────────────────

    /// Remove every document of the collection, walking the primary index
    /// with revision checks disabled.
    pub fn truncate(
        &mut self,
        collection: &str,
        options: &OperationOptions,
    ) -> Result<OperationResult, DbError> {
        self.require_running()?;
        let coll = self.collection_for(collection, AccessMode::Write)?;
        let _pin = coll.pin();
        let level = self.nesting_level();
        let was_locked = self.is_locked(collection, AccessMode::Write);
        if !was_locked {
            self.lock(collection, AccessMode::Write, level)?;
        }
        let outcome = (|| -> Result<(), DbError> {
            let handle = self.handle()?;
            let mut txn = handle.borrow_mut();
            txn.invoke_on_all_elements_for_removal(&coll, |txn, key| {
                txn.remove_document(&coll, key)?;
                Ok(true)
            })?;
            Ok(())
        })();
        if !was_locked {
            self.unlock(collection, AccessMode::Write, level)?;
        }
        outcome?;
        Ok(OperationResult::success(
            None,
            self.result_wait_for_sync(options),
        ))
    }

    // ── full-collection reads ───────────────────────────────────

    /// All documents, paged through an ALL cursor.
    pub fn all(
        &mut self,
        collection: &str,
        skip: u64,
        limit: u64,
        options: &OperationOptions,
    ) -> Result<OperationResult, DbError> {
        self.require_running()?;
        let coll = self.collection_for(collection, AccessMode::Read)?;
        let _pin = coll.pin();
        let level = self.nesting_level();
        let was_locked = self.is_locked(collection, AccessMode::Read);
        if !was_locked {
            self.lock(collection, AccessMode::Read, level)?;
        }
        let outcome = (|| -> Result<Vec<Bson>, DbError> {
            let mut cursor = self.index_scan(
                collection,
                CursorKind::All,
                None,
                None,
                skip,
                limit,
                1000,
                false,
            )?;
            let mut docs = Vec::new();
            while cursor.has_more() {
                for stored in cursor.next_batch()? {
                    let mut doc = stored.doc;
                    doc.insert("_id", format!("{}/{}", coll.name, stored.key));
                    docs.push(Bson::Document(doc));
                }
            }
            Ok(docs)
        })();
        if !was_locked {
            self.unlock(collection, AccessMode::Read, level)?;
        }
        let docs = outcome?;
        Ok(OperationResult::success(
            Some(Bson::Array(docs)),
            self.result_wait_for_sync(options),
        ))
    }

    /// All document keys, in the requested emission form.
    pub fn all_keys(
        &mut self,
        collection: &str,
        emission: KeyEmission,
        options: &OperationOptions,
    ) -> Result<OperationResult, DbError> {
        self.require_running()?;
        let coll = self.collection_for(collection, AccessMode::Read)?;
        let _pin = coll.pin();
        let prefix = match emission {
            KeyEmission::Key => String::new(),
            KeyEmission::Id => format!("{}/", coll.name),
            KeyEmission::Path => format!(
                "/_db/{}/_api/document/{}/",
                self.context().db_name(),
                coll.name
            ),
        };
        let level = self.nesting_level();
        let was_locked = self.is_locked(collection, AccessMode::Read);
        if !was_locked {
            self.lock(collection, AccessMode::Read, level)?;
        }
        let outcome = (|| -> Result<Vec<Bson>, DbError> {
            let mut cursor = self.index_scan(
                collection,
                CursorKind::All,
                None,
                None,
                0,
                u64::MAX,
                1000,
                false,
            )?;
            let mut keys = Vec::new();
            while cursor.has_more() {
                for stored in cursor.next_batch()? {
                    keys.push(Bson::String(format!("{prefix}{}", stored.key)));
                }
            }
            Ok(keys)
        })();
        if !was_locked {
            self.unlock(collection, AccessMode::Read, level)?;
        }
        let keys = outcome?;
        Ok(OperationResult::success(
            Some(Bson::Array(keys)),
            self.result_wait_for_sync(options),
        ))
    }

    /// One pseudo-random document, or null for an empty collection.
    pub fn any(&mut self, collection: &str) -> Result<OperationResult, DbError> {
        self.require_running()?;
        let coll = self.collection_for(collection, AccessMode::Read)?;
        let _pin = coll.pin();
        let level = self.nesting_level();
        let was_locked = self.is_locked(collection, AccessMode::Read);
        if !was_locked {
            self.lock(collection, AccessMode::Read, level)?;
        }
        let outcome = (|| -> Result<Bson, DbError> {
            let mut cursor =
                self.index_scan(collection, CursorKind::Any, None, None, 0, 1, 1, false)?;
            let batch = cursor.next_batch()?;
            Ok(match batch.into_iter().next() {
                Some(stored) => {
                    let mut doc = stored.doc;
                    doc.insert("_id", format!("{}/{}", coll.name, stored.key));
                    Bson::Document(doc)
                }
                None => Bson::Null,
            })
        })();
        if !was_locked {
            self.unlock(collection, AccessMode::Read, level)?;
        }
        Ok(OperationResult::success(Some(outcome?), false))
    }

    /// Number of documents in the collection.
    pub fn count(&mut self, collection: &str) -> Result<OperationResult, DbError> {
        self.require_running()?;
        let coll = self.collection_for(collection, AccessMode::Read)?;
        let count = self.handle()?.borrow().count(&coll)?;
        Ok(OperationResult::success(
            Some(Bson::Int64(count as i64)),
            false,
        ))
    }
}
