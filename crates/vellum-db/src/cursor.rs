use std::rc::Rc;
use std::sync::Arc;

use bson::Document;

use vellum_engine::{AccessMode, Collection, Index, IndexSearch, StoredDocument};
use vellum_query::{AndClause, ErrorKind};
use vellum_store::Store;

use crate::context::TxnHandle;
use crate::error::DbError;
use crate::handle::IndexHandle;
use crate::role::ServerRole;
use crate::transaction::Transaction;

/// What a cursor iterates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorKind {
    /// Pseudo-random documents off the primary index.
    Any,
    /// All documents in primary-key order.
    All,
    /// An index scan; requires a handle.
    Index,
}

enum CursorSource {
    All {
        after: Option<String>,
    },
    Index {
        index: Arc<Index>,
        search: IndexSearch,
        after: Option<Vec<u8>>,
    },
}

/// A batched cursor over an index iterator. Each [`next_batch`] returns up
/// to `batch_size` documents.
///
/// [`next_batch`]: OperationCursor::next_batch
pub struct OperationCursor<S: Store> {
    handle: Rc<TxnHandle<S>>,
    collection: Arc<Collection>,
    source: CursorSource,
    batch_size: usize,
    remaining: u64,
    reverse: bool,
    exhausted: bool,
}

impl<S: Store> std::fmt::Debug for OperationCursor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationCursor")
            .field("batch_size", &self.batch_size)
            .field("remaining", &self.remaining)
            .field("reverse", &self.reverse)
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

impl<S: Store> OperationCursor<S> {
    pub fn has_more(&self) -> bool {
        !self.exhausted && self.remaining > 0
    }

    /// Fetch the next batch of documents.
    pub fn next_batch(&mut self) -> Result<Vec<StoredDocument>, DbError> {
        if !self.has_more() {
            return Ok(Vec::new());
        }
        let max = (self.batch_size as u64).min(self.remaining) as usize;
        let page = self.fetch(max)?;
        self.remaining -= page.len() as u64;
        if page.len() < max {
            self.exhausted = true;
        }
        Ok(page)
    }

    fn fetch(&mut self, max: usize) -> Result<Vec<StoredDocument>, DbError> {
        let txn = self.handle.borrow();
        match &mut self.source {
            CursorSource::All { after } => {
                let page =
                    txn.scan_documents(&self.collection, after.as_deref(), max, self.reverse)?;
                if let Some(last) = page.last() {
                    *after = Some(last.key.clone());
                } else {
                    self.exhausted = true;
                }
                Ok(page)
            }
            CursorSource::Index {
                index,
                search,
                after,
            } => {
                let entries = txn.scan_index(
                    &self.collection,
                    index,
                    search,
                    after.as_deref(),
                    max,
                    self.reverse,
                )?;
                if let Some(last) = entries.last() {
                    *after = Some(last.raw_key.clone());
                } else {
                    self.exhausted = true;
                }
                let mut docs = Vec::with_capacity(entries.len());
                for entry in entries {
                    if let Some(doc) = txn.read_document(&self.collection, &entry.doc_key)? {
                        docs.push(doc);
                    }
                }
                Ok(docs)
            }
        }
    }

    /// Discard `skip` documents from the front of the iteration.
    fn consume_skip(&mut self, mut skip: u64) -> Result<(), DbError> {
        while skip > 0 && !self.exhausted {
            let max = (self.batch_size as u64).min(skip) as usize;
            let page = self.fetch(max)?;
            if page.is_empty() {
                break;
            }
            skip -= page.len() as u64;
        }
        Ok(())
    }
}

impl<S: Store> Transaction<S> {
    /// Build a batched cursor over a collection.
    ///
    /// `Any` and `All` use the primary index and take neither a handle nor
    /// a search value; `Index` requires a handle and optionally an example
    /// document searched for equality on the index's leading fields. Index
    /// scans are local to database servers; coordinators are refused. A
    /// `limit` of 0 yields an empty, successful cursor. `skip` documents
    /// are discarded before the cursor is returned.
    #[allow(clippy::too_many_arguments)]
    pub fn index_scan(
        &mut self,
        collection: &str,
        kind: CursorKind,
        handle: Option<&IndexHandle>,
        search: Option<&Document>,
        skip: u64,
        limit: u64,
        batch_size: usize,
        reverse: bool,
    ) -> Result<OperationCursor<S>, DbError> {
        if ServerRole::current().is_coordinator() {
            return Err(DbError::new(
                ErrorKind::OnlyOnDbServer,
                "index scans run on database servers only",
            ));
        }
        self.require_running()?;

        let source = match kind {
            CursorKind::Any | CursorKind::All => {
                if handle.is_some() || search.is_some() {
                    return Err(DbError::new(
                        ErrorKind::BadParameter,
                        "ANY and ALL scans take no index handle or search value",
                    ));
                }
                CursorSource::All { after: None }
            }
            CursorKind::Index => {
                let handle = handle.ok_or_else(|| {
                    DbError::new(ErrorKind::BadParameter, "INDEX scan without an index handle")
                })?;
                let index = Arc::clone(handle.index());
                let search = match search {
                    Some(example) => index.search_for_example(example),
                    None => IndexSearch::Full,
                };
                CursorSource::Index {
                    index,
                    search,
                    after: None,
                }
            }
        };

        let collection = self.collection_for(collection, AccessMode::Read)?;
        let mut cursor = OperationCursor {
            handle: Rc::clone(self.handle()?),
            collection,
            source,
            batch_size: batch_size.max(1),
            remaining: limit,
            reverse,
            exhausted: limit == 0,
        };

        // ANY starts at a pseudo-random offset within the collection.
        let mut skip = skip;
        if kind == CursorKind::Any && limit > 0 {
            let txn = cursor.handle.borrow();
            let count = txn.count(&cursor.collection)?;
            if count > 0 {
                skip += txn.clock().next() % count;
            }
            drop(txn);
        }

        if skip > 0 && !cursor.exhausted {
            cursor.consume_skip(skip)?;
        }
        Ok(cursor)
    }

    /// Build a batched cursor for a filter clause already specialised to
    /// the given index handle.
    #[allow(clippy::too_many_arguments)]
    pub fn index_scan_for_condition(
        &mut self,
        collection: &str,
        handle: &IndexHandle,
        clause: &AndClause,
        variable: &str,
        skip: u64,
        limit: u64,
        batch_size: usize,
        reverse: bool,
    ) -> Result<OperationCursor<S>, DbError> {
        if ServerRole::current().is_coordinator() {
            return Err(DbError::new(
                ErrorKind::OnlyOnDbServer,
                "index scans run on database servers only",
            ));
        }
        self.require_running()?;

        let index = Arc::clone(handle.index());
        let search = index.search_for_clause(clause, variable);
        let collection = self.collection_for(collection, AccessMode::Read)?;
        let mut cursor = OperationCursor {
            handle: Rc::clone(self.handle()?),
            collection,
            source: CursorSource::Index {
                index,
                search,
                after: None,
            },
            batch_size: batch_size.max(1),
            remaining: limit,
            reverse,
            exhausted: limit == 0,
        };
        if skip > 0 && !cursor.exhausted {
            cursor.consume_skip(skip)?;
        }
        Ok(cursor)
    }
}
