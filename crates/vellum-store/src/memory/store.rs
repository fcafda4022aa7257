use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, RwLock};

use arc_swap::ArcSwap;
use imbl::OrdMap;

use crate::error::StoreError;
use crate::store::Store;

use super::transaction::MemoryTransaction;

pub(crate) type Keyspace = OrdMap<Vec<u8>, Vec<u8>>;

/// Store state shared with its transactions.
pub(crate) struct Shared {
    keyspaces: RwLock<HashMap<String, Arc<ArcSwap<Keyspace>>>>,
    write_locked: Mutex<bool>,
    write_cv: Condvar,
}

impl Shared {
    /// Block until the single write slot is free, then take it.
    pub(crate) fn acquire_write_token(&self) {
        let mut locked = self.write_locked.lock().unwrap();
        while *locked {
            locked = self.write_cv.wait(locked).unwrap();
        }
        *locked = true;
    }

    pub(crate) fn release_write_token(&self) {
        *self.write_locked.lock().unwrap() = false;
        self.write_cv.notify_one();
    }

    /// Snapshot a single keyspace (called lazily on first access).
    pub(crate) fn snapshot(&self, name: &str) -> Option<Keyspace> {
        let keyspaces = self.keyspaces.read().unwrap();
        keyspaces.get(name).map(|swap| (**swap.load()).clone())
    }

    /// Publish dirty keyspaces. The committer still holds the write token,
    /// so no conflict detection is needed.
    pub(crate) fn publish(&self, dirty: Vec<(String, Keyspace)>) {
        let keyspaces = self.keyspaces.read().unwrap();
        for (name, data) in dirty {
            if let Some(swap) = keyspaces.get(&name) {
                swap.store(Arc::new(data));
            }
        }
    }
}

/// Clones share the same underlying data.
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            shared: Arc::new(Shared {
                keyspaces: RwLock::new(HashMap::new()),
                write_locked: Mutex::new(false),
                write_cv: Condvar::new(),
            }),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    type Txn = MemoryTransaction;

    fn begin(&self, read_only: bool) -> Result<Self::Txn, StoreError> {
        if !read_only {
            self.shared.acquire_write_token();
        }
        Ok(MemoryTransaction::new(Arc::clone(&self.shared), read_only))
    }

    fn create_keyspace(&self, name: &str) -> Result<(), StoreError> {
        let mut keyspaces = self.shared.keyspaces.write().unwrap();
        keyspaces
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(ArcSwap::new(Arc::new(OrdMap::new()))));
        Ok(())
    }

    fn drop_keyspace(&self, name: &str) -> Result<(), StoreError> {
        let mut keyspaces = self.shared.keyspaces.write().unwrap();
        keyspaces.remove(name);
        Ok(())
    }
}
