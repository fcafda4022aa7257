use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::ops::Bound;
use std::sync::Arc;

use crate::error::StoreError;
use crate::store::{ScanRange, StoreTransaction};

use super::store::{Keyspace, Shared};

pub struct MemoryTransaction {
    shared: Arc<Shared>,
    /// Lazily-loaded persistent snapshots, copied on first touch. Writes go
    /// into the local copy and are published on commit.
    snapshot: RefCell<HashMap<String, Keyspace>>,
    dirty: HashSet<String>,
    read_only: bool,
    consumed: bool,
}

impl MemoryTransaction {
    pub(crate) fn new(shared: Arc<Shared>, read_only: bool) -> Self {
        Self {
            shared,
            snapshot: RefCell::new(HashMap::new()),
            dirty: HashSet::new(),
            read_only,
            consumed: false,
        }
    }

    fn check_active(&self) -> Result<(), StoreError> {
        if self.consumed {
            return Err(StoreError::TransactionConsumed);
        }
        Ok(())
    }

    fn ensure(&self, keyspace: &str) -> Result<(), StoreError> {
        let mut snapshot = self.snapshot.borrow_mut();
        if !snapshot.contains_key(keyspace) {
            match self.shared.snapshot(keyspace) {
                Some(data) => {
                    snapshot.insert(keyspace.to_string(), data);
                }
                None => return Err(StoreError::KeyspaceNotFound(keyspace.to_string())),
            }
        }
        Ok(())
    }

    fn with_keyspace<T>(
        &self,
        keyspace: &str,
        f: impl FnOnce(&Keyspace) -> T,
    ) -> Result<T, StoreError> {
        self.check_active()?;
        self.ensure(keyspace)?;
        let snapshot = self.snapshot.borrow();
        Ok(f(snapshot.get(keyspace).unwrap()))
    }

    fn finish(&mut self) {
        self.consumed = true;
        self.snapshot.borrow_mut().clear();
        if !self.read_only {
            self.shared.release_write_token();
        }
    }
}

fn ord_bounds(range: &ScanRange<'_>) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
    let lower = match range.lower {
        None => Bound::Unbounded,
        Some(key) if range.lower_inclusive => Bound::Included(key.to_vec()),
        Some(key) => Bound::Excluded(key.to_vec()),
    };
    let upper = match range.upper {
        None => Bound::Unbounded,
        Some(key) if range.upper_inclusive => Bound::Included(key.to_vec()),
        Some(key) => Bound::Excluded(key.to_vec()),
    };
    (lower, upper)
}

impl StoreTransaction for MemoryTransaction {
    fn get(&self, keyspace: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.with_keyspace(keyspace, |data| data.get(key).cloned())
    }

    fn multi_get(
        &self,
        keyspace: &str,
        keys: &[&[u8]],
    ) -> Result<Vec<Option<Vec<u8>>>, StoreError> {
        self.with_keyspace(keyspace, |data| {
            keys.iter().map(|key| data.get(*key).cloned()).collect()
        })
    }

    fn put(&mut self, keyspace: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.check_active()?;
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        self.ensure(keyspace)?;
        self.dirty.insert(keyspace.to_string());
        let mut snapshot = self.snapshot.borrow_mut();
        snapshot
            .get_mut(keyspace)
            .unwrap()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, keyspace: &str, key: &[u8]) -> Result<(), StoreError> {
        self.check_active()?;
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        self.ensure(keyspace)?;
        self.dirty.insert(keyspace.to_string());
        let mut snapshot = self.snapshot.borrow_mut();
        snapshot.get_mut(keyspace).unwrap().remove(key);
        Ok(())
    }

    fn scan_page(
        &self,
        keyspace: &str,
        range: ScanRange<'_>,
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        self.with_keyspace(keyspace, |data| {
            let bounds = ord_bounds(&range);
            if range.reverse {
                data.range(bounds)
                    .rev()
                    .take(limit)
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            } else {
                data.range(bounds)
                    .take(limit)
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            }
        })
    }

    fn count_range(&self, keyspace: &str, range: ScanRange<'_>) -> Result<u64, StoreError> {
        self.with_keyspace(keyspace, |data| data.range(ord_bounds(&range)).count() as u64)
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.check_active()?;
        if !self.read_only {
            let mut snapshot = self.snapshot.borrow_mut();
            let dirty: Vec<(String, Keyspace)> = self
                .dirty
                .drain()
                .filter_map(|name| snapshot.remove(&name).map(|data| (name, data)))
                .collect();
            drop(snapshot);
            self.shared.publish(dirty);
        }
        self.finish();
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        self.check_active()?;
        self.finish();
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.consumed {
            self.finish();
        }
    }
}
