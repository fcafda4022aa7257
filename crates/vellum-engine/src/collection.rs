use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};

use crate::index::Index;

/// Access type a collection is registered or locked with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
}

#[derive(Default)]
struct LockState {
    readers: u32,
    writer: bool,
}

/// Explicit per-collection lock with counted acquire/release.
///
/// The storage engine serialises competing writers here; the façade drives
/// it through explicit `lock`/`unlock` calls rather than guards, since a
/// lock may be held across an arbitrary operation scope.
struct CollectionLock {
    state: Mutex<LockState>,
    cv: Condvar,
}

impl CollectionLock {
    fn new() -> Self {
        Self {
            state: Mutex::new(LockState::default()),
            cv: Condvar::new(),
        }
    }

    fn lock(&self, mode: AccessMode) {
        let mut state = self.state.lock().unwrap();
        match mode {
            AccessMode::Read => {
                while state.writer {
                    state = self.cv.wait(state).unwrap();
                }
                state.readers += 1;
            }
            AccessMode::Write => {
                while state.writer || state.readers > 0 {
                    state = self.cv.wait(state).unwrap();
                }
                state.writer = true;
            }
        }
    }

    fn unlock(&self, mode: AccessMode) {
        let mut state = self.state.lock().unwrap();
        match mode {
            AccessMode::Read => {
                debug_assert!(state.readers > 0, "read unlock without lock");
                state.readers = state.readers.saturating_sub(1);
            }
            AccessMode::Write => {
                debug_assert!(state.writer, "write unlock without lock");
                state.writer = false;
            }
        }
        drop(state);
        self.cv.notify_all();
    }

    fn is_locked(&self, mode: AccessMode) -> bool {
        let state = self.state.lock().unwrap();
        match mode {
            AccessMode::Read => state.readers > 0,
            AccessMode::Write => state.writer,
        }
    }
}

/// A registered collection: identity, lock, compaction pins and the index
/// registry.
pub struct Collection {
    pub id: u64,
    pub name: String,
    lock: CollectionLock,
    pins: AtomicU64,
    indexes: RwLock<Vec<Arc<Index>>>,
}

impl Collection {
    pub(crate) fn new(id: u64, name: String, indexes: Vec<Arc<Index>>) -> Collection {
        Collection {
            id,
            name,
            lock: CollectionLock::new(),
            pins: AtomicU64::new(0),
            indexes: RwLock::new(indexes),
        }
    }

    // ── Locking ─────────────────────────────────────────────────

    pub fn lock(&self, mode: AccessMode) {
        self.lock.lock(mode);
    }

    pub fn unlock(&self, mode: AccessMode) {
        self.lock.unlock(mode);
    }

    pub fn is_locked(&self, mode: AccessMode) -> bool {
        self.lock.is_locked(mode)
    }

    // ── Compaction pins ─────────────────────────────────────────

    /// Reserve the collection against background compaction for the scope
    /// of the returned guard.
    pub fn pin(&self) -> CompactionGuard<'_> {
        self.pins.fetch_add(1, Ordering::AcqRel);
        CompactionGuard { collection: self }
    }

    pub fn pin_count(&self) -> u64 {
        self.pins.load(Ordering::Acquire)
    }

    // ── Index registry ──────────────────────────────────────────

    pub fn indexes(&self) -> Vec<Arc<Index>> {
        self.indexes.read().unwrap().clone()
    }

    /// The primary index. Always present.
    pub fn primary_index(&self) -> Arc<Index> {
        self.indexes
            .read()
            .unwrap()
            .first()
            .cloned()
            .expect("collection has no primary index")
    }

    pub fn index_by_id(&self, iid: u64) -> Option<Arc<Index>> {
        self.indexes
            .read()
            .unwrap()
            .iter()
            .find(|idx| idx.id == iid)
            .cloned()
    }

    pub(crate) fn register_index(&self, index: Arc<Index>) {
        self.indexes.write().unwrap().push(index);
    }

    pub(crate) fn unregister_index(&self, iid: u64) {
        self.indexes.write().unwrap().retain(|idx| idx.id != iid);
    }
}

/// RAII compaction reservation, released on drop.
pub struct CompactionGuard<'a> {
    collection: &'a Collection,
}

impl Drop for CompactionGuard<'_> {
    fn drop(&mut self) {
        self.collection.pins.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection() -> Arc<Collection> {
        Arc::new(Collection::new(1, "accounts".into(), vec![]))
    }

    #[test]
    fn pins_are_scoped() {
        let coll = collection();
        assert_eq!(coll.pin_count(), 0);
        {
            let _guard = coll.pin();
            let _second = coll.pin();
            assert_eq!(coll.pin_count(), 2);
        }
        assert_eq!(coll.pin_count(), 0);
    }

    #[test]
    fn lock_state_is_tracked() {
        let coll = collection();
        assert!(!coll.is_locked(AccessMode::Read));

        coll.lock(AccessMode::Read);
        assert!(coll.is_locked(AccessMode::Read));
        assert!(!coll.is_locked(AccessMode::Write));
        coll.unlock(AccessMode::Read);

        coll.lock(AccessMode::Write);
        assert!(coll.is_locked(AccessMode::Write));
        coll.unlock(AccessMode::Write);
        assert!(!coll.is_locked(AccessMode::Write));
    }
}
