use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use bson::Document;

use vellum_store::{ScanRange, Store, StoreTransaction, prefix_successor};

use crate::catalog::{CollectionMeta, NameResolver, decode_descriptor, encode_descriptor};
use crate::collection::Collection;
use crate::error::EngineError;
use crate::index::{Index, IndexKind, IndexSearch};
use crate::key::{
    DOCS_KEYSPACE, INDEX_KEYSPACE, SYS_COLLECTION_TAG, SYS_KEYSPACE, collection_id_key,
    collection_meta_key, doc_key, doc_prefix, index_config_key, index_config_prefix,
    index_entry_key, index_prefix, index_value_prefix, parse_doc_key, parse_index_entry,
};
use crate::record::Record;
use crate::revision::RevisionClock;
use crate::value::SortableValue;

const SCAN_PAGE: usize = 1000;

/// A document read back from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub key: String,
    pub rev: String,
    pub doc: Document,
}

impl StoredDocument {
    fn from_record(key: String, record: Record) -> StoredDocument {
        StoredDocument {
            key,
            rev: record.rev,
            doc: record.doc,
        }
    }
}

/// The storage engine: catalog, collections and the revision clock.
pub struct Engine<S: Store> {
    store: S,
    clock: Arc<RevisionClock>,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
    by_id: RwLock<HashMap<u64, Arc<Collection>>>,
    next_collection_id: AtomicU64,
    next_index_id: AtomicU64,
}

impl<S: Store> Engine<S> {
    /// Open the engine over a store, creating the keyspaces and loading
    /// the catalog.
    pub fn open(store: S) -> Result<Engine<S>, EngineError> {
        store.create_keyspace(SYS_KEYSPACE)?;
        store.create_keyspace(DOCS_KEYSPACE)?;
        store.create_keyspace(INDEX_KEYSPACE)?;

        let engine = Engine {
            store,
            clock: Arc::new(RevisionClock::new()),
            collections: RwLock::new(HashMap::new()),
            by_id: RwLock::new(HashMap::new()),
            next_collection_id: AtomicU64::new(1),
            next_index_id: AtomicU64::new(1),
        };
        engine.load_catalog()?;
        Ok(engine)
    }

    fn load_catalog(&self) -> Result<(), EngineError> {
        let txn = self.store.begin(true)?;
        let prefix = [SYS_COLLECTION_TAG, 0x00];
        let upper = prefix_successor(&prefix).unwrap();
        let entries = txn.scan_page(
            SYS_KEYSPACE,
            ScanRange {
                lower: Some(&prefix),
                lower_inclusive: true,
                upper: Some(&upper),
                upper_inclusive: false,
                reverse: false,
            },
            usize::MAX,
        )?;

        let mut max_cid = 0u64;
        let mut max_iid = 0u64;
        for (_, value) in entries {
            let meta = CollectionMeta::decode(&value)?;
            let mut indexes = Vec::new();
            let config_prefix = index_config_prefix(meta.id);
            let config_upper = prefix_successor(&config_prefix).unwrap();
            for (_, descriptor) in txn.scan_page(
                SYS_KEYSPACE,
                ScanRange {
                    lower: Some(&config_prefix),
                    lower_inclusive: true,
                    upper: Some(&config_upper),
                    upper_inclusive: false,
                    reverse: false,
                },
                usize::MAX,
            )? {
                let index = Index::from_descriptor(&decode_descriptor(&descriptor)?)?;
                max_iid = max_iid.max(index.id);
                indexes.push(Arc::new(index));
            }
            max_cid = max_cid.max(meta.id);
            let collection = Arc::new(Collection::new(meta.id, meta.name.clone(), indexes));
            self.collections
                .write()
                .unwrap()
                .insert(meta.name, Arc::clone(&collection));
            self.by_id.write().unwrap().insert(meta.id, collection);
        }
        self.next_collection_id.store(max_cid + 1, Ordering::Relaxed);
        self.next_index_id.store(max_iid + 1, Ordering::Relaxed);
        Ok(())
    }

    pub fn clock(&self) -> &RevisionClock {
        &self.clock
    }

    // ── Collections ─────────────────────────────────────────────

    pub fn collection(&self, name: &str) -> Option<Arc<Collection>> {
        self.collections.read().unwrap().get(name).cloned()
    }

    pub fn collection_by_id(&self, cid: u64) -> Option<Arc<Collection>> {
        self.by_id.read().unwrap().get(&cid).cloned()
    }

    pub fn collection_names(&self) -> Vec<String> {
        self.collections.read().unwrap().keys().cloned().collect()
    }

    pub fn create_collection(&self, name: &str) -> Result<Arc<Collection>, EngineError> {
        if self.collection(name).is_some() {
            return Err(EngineError::CollectionExists(name.to_string()));
        }
        let cid = self.next_collection_id.fetch_add(1, Ordering::Relaxed);
        let primary = Arc::new(Index::primary(
            self.next_index_id.fetch_add(1, Ordering::Relaxed),
        ));

        let mut txn = self.store.begin(false)?;
        let meta = CollectionMeta {
            id: cid,
            name: name.to_string(),
        };
        txn.put(SYS_KEYSPACE, &collection_meta_key(name), &meta.encode()?)?;
        txn.put(SYS_KEYSPACE, &collection_id_key(cid), name.as_bytes())?;
        txn.put(
            SYS_KEYSPACE,
            &index_config_key(cid, primary.id),
            &encode_descriptor(&primary.descriptor())?,
        )?;
        txn.commit()?;

        let collection = Arc::new(Collection::new(cid, name.to_string(), vec![primary]));
        self.collections
            .write()
            .unwrap()
            .insert(name.to_string(), Arc::clone(&collection));
        self.by_id
            .write()
            .unwrap()
            .insert(cid, Arc::clone(&collection));
        tracing::debug!(collection = name, id = cid, "created collection");
        Ok(collection)
    }

    pub fn drop_collection(&self, name: &str) -> Result<(), EngineError> {
        let Some(collection) = self.collections.write().unwrap().remove(name) else {
            return Err(EngineError::CollectionNotFound(name.to_string()));
        };
        self.by_id.write().unwrap().remove(&collection.id);

        let mut txn = self.store.begin(false)?;
        delete_prefix(&mut txn, DOCS_KEYSPACE, &doc_prefix(collection.id))?;
        delete_prefix(&mut txn, INDEX_KEYSPACE, &doc_prefix(collection.id))?;
        delete_prefix(&mut txn, SYS_KEYSPACE, &index_config_prefix(collection.id))?;
        txn.delete(SYS_KEYSPACE, &collection_meta_key(name))?;
        txn.delete(SYS_KEYSPACE, &collection_id_key(collection.id))?;
        txn.commit()?;
        Ok(())
    }

    /// Create a secondary index (or return the matching existing one) and
    /// backfill it from the collection's documents.
    pub fn ensure_index(
        &self,
        collection: &Arc<Collection>,
        kind: IndexKind,
        fields: Vec<String>,
        unique: bool,
        sparse: bool,
    ) -> Result<Arc<Index>, EngineError> {
        if let Some(existing) = collection
            .indexes()
            .into_iter()
            .find(|idx| idx.kind == kind && idx.fields == fields)
        {
            return Ok(existing);
        }

        let index = Arc::new(Index {
            id: self.next_index_id.fetch_add(1, Ordering::Relaxed),
            kind,
            fields,
            unique,
            sparse,
        });

        let mut txn = self.store.begin(false)?;
        txn.put(
            SYS_KEYSPACE,
            &index_config_key(collection.id, index.id),
            &encode_descriptor(&index.descriptor())?,
        )?;

        // Backfill from existing documents.
        let prefix = doc_prefix(collection.id);
        let upper = prefix_successor(&prefix).unwrap();
        let mut after: Option<Vec<u8>> = None;
        loop {
            let page = txn.scan_page(
                DOCS_KEYSPACE,
                ScanRange {
                    lower: Some(after.as_deref().unwrap_or(prefix.as_slice())),
                    lower_inclusive: after.is_none(),
                    upper: Some(&upper),
                    upper_inclusive: false,
                    reverse: false,
                },
                SCAN_PAGE,
            )?;
            if page.is_empty() {
                break;
            }
            for (raw_key, value) in &page {
                let Some((_, key)) = parse_doc_key(raw_key) else {
                    continue;
                };
                let record = Record::decode(value)?;
                if let Some(values) = index.values_for_document(&record.doc) {
                    txn.put(
                        INDEX_KEYSPACE,
                        &index_entry_key(collection.id, index.id, &values, key),
                        &[],
                    )?;
                }
            }
            after = page.last().map(|(k, _)| k.clone());
            if page.len() < SCAN_PAGE {
                break;
            }
        }
        txn.commit()?;

        collection.register_index(Arc::clone(&index));
        Ok(index)
    }

    pub fn drop_index(
        &self,
        collection: &Arc<Collection>,
        iid: u64,
    ) -> Result<(), EngineError> {
        if collection.index_by_id(iid).is_none() {
            return Err(EngineError::IndexNotFound(iid.to_string()));
        }
        let mut txn = self.store.begin(false)?;
        delete_prefix(&mut txn, INDEX_KEYSPACE, &index_prefix(collection.id, iid))?;
        txn.delete(SYS_KEYSPACE, &index_config_key(collection.id, iid))?;
        txn.commit()?;
        collection.unregister_index(iid);
        Ok(())
    }

    pub fn begin(&self, read_only: bool) -> Result<EngineTxn<S>, EngineError> {
        Ok(EngineTxn {
            clock: Arc::clone(&self.clock),
            txn: self.store.begin(read_only)?,
            read_only,
        })
    }
}

impl<S: Store> NameResolver for Engine<S> {
    fn collection_name(&self, cid: u64) -> Option<String> {
        self.collection_by_id(cid).map(|c| c.name.clone())
    }

    fn collection_id(&self, name: &str) -> Option<u64> {
        self.collection(name).map(|c| c.id)
    }
}

fn delete_prefix<T: StoreTransaction>(
    txn: &mut T,
    keyspace: &str,
    prefix: &[u8],
) -> Result<(), EngineError> {
    let upper = prefix_successor(prefix);
    loop {
        let page = txn.scan_page(
            keyspace,
            ScanRange {
                lower: Some(prefix),
                lower_inclusive: true,
                upper: upper.as_deref(),
                upper_inclusive: false,
                reverse: false,
            },
            SCAN_PAGE,
        )?;
        if page.is_empty() {
            return Ok(());
        }
        for (key, _) in page {
            txn.delete(keyspace, &key)?;
        }
    }
}

/// An index entry surfaced by a scan: the raw entry key (used to resume a
/// paged scan) and the document key it points at.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedEntry {
    pub raw_key: Vec<u8>,
    pub doc_key: String,
}

/// A transaction over the engine: the low-level handle the façade owns or
/// shares with embedded transactions.
pub struct EngineTxn<S: Store> {
    clock: Arc<RevisionClock>,
    txn: S::Txn,
    read_only: bool,
}

impl<S: Store> EngineTxn<S> {
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn clock(&self) -> &RevisionClock {
        &self.clock
    }

    // ── Document reads ──────────────────────────────────────────

    pub fn read_document(
        &self,
        collection: &Collection,
        key: &str,
    ) -> Result<Option<StoredDocument>, EngineError> {
        match self.txn.get(DOCS_KEYSPACE, &doc_key(collection.id, key))? {
            Some(bytes) => {
                let record = Record::decode(&bytes)?;
                Ok(Some(StoredDocument::from_record(key.to_string(), record)))
            }
            None => Ok(None),
        }
    }

    pub fn count(&self, collection: &Collection) -> Result<u64, EngineError> {
        let prefix = doc_prefix(collection.id);
        let upper = prefix_successor(&prefix).unwrap();
        Ok(self.txn.count_range(
            DOCS_KEYSPACE,
            ScanRange {
                lower: Some(&prefix),
                lower_inclusive: true,
                upper: Some(&upper),
                upper_inclusive: false,
                reverse: false,
            },
        )?)
    }

    /// One page of documents in primary-key order.
    pub fn scan_documents(
        &self,
        collection: &Collection,
        after: Option<&str>,
        limit: usize,
        reverse: bool,
    ) -> Result<Vec<StoredDocument>, EngineError> {
        let prefix = doc_prefix(collection.id);
        let upper = prefix_successor(&prefix).unwrap();
        let after_key = after.map(|key| doc_key(collection.id, key));

        let range = if reverse {
            ScanRange {
                lower: Some(&prefix),
                lower_inclusive: true,
                upper: after_key.as_deref().or(Some(&upper)),
                upper_inclusive: false,
                reverse: true,
            }
        } else {
            ScanRange {
                lower: after_key.as_deref().or(Some(&prefix)),
                lower_inclusive: after_key.is_none(),
                upper: Some(&upper),
                upper_inclusive: false,
                reverse: false,
            }
        };

        let mut out = Vec::new();
        for (raw_key, value) in self.txn.scan_page(DOCS_KEYSPACE, range, limit)? {
            let (_, key) = parse_doc_key(&raw_key)
                .ok_or_else(|| EngineError::Encoding("invalid document key".into()))?;
            out.push(StoredDocument::from_record(
                key.to_string(),
                Record::decode(&value)?,
            ));
        }
        Ok(out)
    }

    /// A pseudo-random document, stepping an internal cursor so repeated
    /// calls spread over the collection.
    pub fn random_document(
        &self,
        collection: &Collection,
    ) -> Result<Option<StoredDocument>, EngineError> {
        let count = self.count(collection)?;
        if count == 0 {
            return Ok(None);
        }
        let offset = (self.clock.next() % count.min(SCAN_PAGE as u64)) as usize;
        let page = self.scan_documents(collection, None, offset + 1, false)?;
        Ok(page.into_iter().last())
    }

    // ── Document writes ─────────────────────────────────────────

    /// Insert a document carrying `_key`; assigns and embeds `_rev`.
    pub fn insert_document(
        &mut self,
        collection: &Collection,
        mut doc: Document,
    ) -> Result<(String, String), EngineError> {
        let key = match doc.get_str("_key") {
            Ok(key) => key.to_string(),
            Err(_) => {
                return Err(EngineError::DocumentKeyBad(
                    "missing or non-string _key".into(),
                ));
            }
        };

        let raw_key = doc_key(collection.id, &key);
        if self.txn.get(DOCS_KEYSPACE, &raw_key)?.is_some() {
            return Err(EngineError::UniqueConstraintViolated(key));
        }

        let rev = self.clock.next_token();
        doc.insert("_rev", rev.clone());

        self.write_index_entries(collection, &key, &doc)?;
        let record = Record::new(rev.clone(), doc);
        self.txn.put(DOCS_KEYSPACE, &raw_key, &record.encode()?)?;
        Ok((key, rev))
    }

    /// Replace the document at `key` wholesale; assigns a fresh `_rev`.
    /// Returns the new revision and the previous record.
    pub fn replace_document(
        &mut self,
        collection: &Collection,
        key: &str,
        mut doc: Document,
    ) -> Result<Option<(String, StoredDocument)>, EngineError> {
        let Some(old) = self.read_document(collection, key)? else {
            return Ok(None);
        };

        self.remove_index_entries(collection, key, &old.doc)?;

        let rev = self.clock.next_token();
        doc.insert("_key", key);
        doc.insert("_rev", rev.clone());
        self.write_index_entries(collection, key, &doc)?;

        let record = Record::new(rev.clone(), doc);
        self.txn
            .put(DOCS_KEYSPACE, &doc_key(collection.id, key), &record.encode()?)?;
        Ok(Some((rev, old)))
    }

    /// Remove the document at `key`, returning the previous record.
    pub fn remove_document(
        &mut self,
        collection: &Collection,
        key: &str,
    ) -> Result<Option<StoredDocument>, EngineError> {
        let Some(old) = self.read_document(collection, key)? else {
            return Ok(None);
        };
        self.remove_index_entries(collection, key, &old.doc)?;
        self.txn.delete(DOCS_KEYSPACE, &doc_key(collection.id, key))?;
        Ok(Some(old))
    }

    fn write_index_entries(
        &mut self,
        collection: &Collection,
        key: &str,
        doc: &Document,
    ) -> Result<(), EngineError> {
        for index in collection.indexes() {
            if index.kind == IndexKind::Primary {
                continue;
            }
            let Some(values) = index.values_for_document(doc) else {
                continue;
            };
            if index.unique {
                let occupied = self
                    .scan_index(
                        collection,
                        &index,
                        &IndexSearch::Eq(values.clone()),
                        None,
                        2,
                        false,
                    )?
                    .into_iter()
                    .any(|entry| entry.doc_key != key);
                if occupied {
                    return Err(EngineError::UniqueConstraintViolated(key.to_string()));
                }
            }
            self.txn.put(
                INDEX_KEYSPACE,
                &index_entry_key(collection.id, index.id, &values, key),
                &[],
            )?;
        }
        Ok(())
    }

    fn remove_index_entries(
        &mut self,
        collection: &Collection,
        key: &str,
        doc: &Document,
    ) -> Result<(), EngineError> {
        for index in collection.indexes() {
            if index.kind == IndexKind::Primary {
                continue;
            }
            if let Some(values) = index.values_for_document(doc) {
                self.txn.delete(
                    INDEX_KEYSPACE,
                    &index_entry_key(collection.id, index.id, &values, key),
                )?;
            }
        }
        Ok(())
    }

    // ── Index scans ─────────────────────────────────────────────

    /// One page of index entries matching `search`, resuming after the raw
    /// entry key `after` when given.
    pub fn scan_index(
        &self,
        collection: &Collection,
        index: &Index,
        search: &IndexSearch,
        after: Option<&[u8]>,
        limit: usize,
        reverse: bool,
    ) -> Result<Vec<ScannedEntry>, EngineError> {
        let base = index_prefix(collection.id, index.id);
        let (mut lower, mut lower_inclusive, mut upper, mut upper_inclusive) = match search {
            IndexSearch::Full => {
                let upper = prefix_successor(&base).unwrap();
                (base.clone(), true, upper, false)
            }
            IndexSearch::Eq(values) => {
                let prefix = index_value_prefix(collection.id, index.id, values);
                let upper = prefix_successor(&prefix).unwrap();
                (prefix, true, upper, false)
            }
            IndexSearch::Range {
                prefix,
                lower,
                upper,
            } => {
                let value_base = index_value_prefix(collection.id, index.id, prefix);
                let lower_key = match lower {
                    Some((value, inclusive)) => {
                        let bound = bound_key(&value_base, value);
                        if *inclusive {
                            bound
                        } else {
                            prefix_successor(&bound).unwrap_or_else(|| bound.clone())
                        }
                    }
                    None => value_base.clone(),
                };
                let upper_key = match upper {
                    Some((value, inclusive)) => {
                        let bound = bound_key(&value_base, value);
                        if *inclusive {
                            prefix_successor(&bound).unwrap_or_else(|| bound.clone())
                        } else {
                            bound
                        }
                    }
                    None => prefix_successor(&value_base).unwrap(),
                };
                (lower_key, true, upper_key, false)
            }
        };

        if let Some(after) = after {
            if reverse {
                upper = after.to_vec();
                upper_inclusive = false;
            } else {
                lower = after.to_vec();
                lower_inclusive = false;
            }
        }

        let page = self.txn.scan_page(
            INDEX_KEYSPACE,
            ScanRange {
                lower: Some(&lower),
                lower_inclusive,
                upper: Some(&upper),
                upper_inclusive,
                reverse,
            },
            limit,
        )?;

        page.into_iter()
            .map(|(raw_key, _)| {
                let (_, doc_key) = parse_index_entry(&raw_key, index.fields.len())
                    .ok_or_else(|| EngineError::Encoding("invalid index entry key".into()))?;
                Ok(ScannedEntry { raw_key, doc_key })
            })
            .collect()
    }

    // ── Whole-collection callbacks (primary index) ──────────────

    /// Invoke `f` on every document; stop early when it returns false.
    pub fn invoke_on_all_elements<F>(
        &self,
        collection: &Collection,
        mut f: F,
    ) -> Result<(), EngineError>
    where
        F: FnMut(&StoredDocument) -> bool,
    {
        let mut after: Option<String> = None;
        loop {
            let page = self.scan_documents(collection, after.as_deref(), SCAN_PAGE, false)?;
            if page.is_empty() {
                return Ok(());
            }
            after = page.last().map(|d| d.key.clone());
            for doc in &page {
                if !f(doc) {
                    return Ok(());
                }
            }
            if after.is_none() {
                return Ok(());
            }
        }
    }

    /// Invoke `f` with each document key while the callback is free to
    /// remove documents; keys are snapshotted up front so removal does not
    /// disturb the iteration.
    pub fn invoke_on_all_elements_for_removal<F>(
        &mut self,
        collection: &Collection,
        mut f: F,
    ) -> Result<(), EngineError>
    where
        F: FnMut(&mut EngineTxn<S>, &str) -> Result<bool, EngineError>,
    {
        let mut keys = Vec::new();
        self.invoke_on_all_elements(collection, |doc| {
            keys.push(doc.key.clone());
            true
        })?;
        for key in keys {
            if !f(self, &key)? {
                break;
            }
        }
        Ok(())
    }

    // ── Lifecycle ───────────────────────────────────────────────

    pub fn commit(&mut self) -> Result<(), EngineError> {
        Ok(self.txn.commit()?)
    }

    pub fn rollback(&mut self) -> Result<(), EngineError> {
        Ok(self.txn.rollback()?)
    }
}

/// Byte bound for a range scan: the value base plus one fully-encoded field.
fn bound_key(value_base: &[u8], value: &SortableValue) -> Vec<u8> {
    let mut buf = value_base.to_vec();
    buf.push(value.bracket);
    crate::key::write_escaped(&mut buf, &value.payload);
    buf
}
