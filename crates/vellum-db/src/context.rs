use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::Arc;

use vellum_engine::{Engine, EngineTxn, NameResolver};
use vellum_store::Store;

use crate::config::DatabaseConfig;
use crate::replication::ReplicationState;

/// The low-level transaction handle: one engine transaction, shared
/// between a top-level transaction and any transactions embedded in it.
pub struct TxnHandle<S: Store> {
    inner: RefCell<EngineTxn<S>>,
    nesting: Cell<u32>,
}

impl<S: Store> TxnHandle<S> {
    pub(crate) fn new(txn: EngineTxn<S>) -> Rc<TxnHandle<S>> {
        Rc::new(TxnHandle {
            inner: RefCell::new(txn),
            nesting: Cell::new(0),
        })
    }

    pub(crate) fn borrow(&self) -> std::cell::Ref<'_, EngineTxn<S>> {
        self.inner.borrow()
    }

    pub(crate) fn borrow_mut(&self) -> std::cell::RefMut<'_, EngineTxn<S>> {
        self.inner.borrow_mut()
    }

    pub(crate) fn nesting(&self) -> u32 {
        self.nesting.get()
    }

    pub(crate) fn enter_nested(&self) -> u32 {
        let level = self.nesting.get() + 1;
        self.nesting.set(level);
        level
    }

    pub(crate) fn leave_nested(&self) {
        self.nesting.set(self.nesting.get().saturating_sub(1));
    }
}

/// Shared transaction context: the name resolver, the parent-transaction
/// lookup used for embedding, and the replication seam for shard leaders.
///
/// One context spans one request; façades on the same context embed into
/// each other. The context is single-threaded, like the façades it serves.
pub struct TransactionContext<S: Store> {
    engine: Arc<Engine<S>>,
    config: DatabaseConfig,
    parent: RefCell<Weak<TxnHandle<S>>>,
    last_failure: Cell<bool>,
    replication: RefCell<Option<ReplicationState>>,
}

impl<S: Store> TransactionContext<S> {
    pub fn new(engine: Arc<Engine<S>>, config: DatabaseConfig) -> Rc<TransactionContext<S>> {
        Rc::new(TransactionContext {
            engine,
            config,
            parent: RefCell::new(Weak::new()),
            last_failure: Cell::new(false),
            replication: RefCell::new(None),
        })
    }

    pub fn engine(&self) -> &Arc<Engine<S>> {
        &self.engine
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn db_name(&self) -> &str {
        &self.config.name
    }

    pub fn resolver(&self) -> &dyn NameResolver {
        self.engine.as_ref()
    }

    /// Whether embedding into a running parent is permitted.
    pub fn nesting_allowed(&self) -> bool {
        self.config.allow_nesting
    }

    pub(crate) fn parent_handle(&self) -> Option<Rc<TxnHandle<S>>> {
        self.parent.borrow().upgrade()
    }

    pub(crate) fn register_parent(&self, handle: &Rc<TxnHandle<S>>) {
        *self.parent.borrow_mut() = Rc::downgrade(handle);
    }

    /// Called when the top-level transaction goes away; records whether any
    /// of its operations failed.
    pub(crate) fn unregister_parent(&self, failed: bool) {
        *self.parent.borrow_mut() = Weak::new();
        self.last_failure.set(failed);
    }

    /// Whether the last finished top-level transaction had a failed
    /// operation.
    pub fn had_failure(&self) -> bool {
        self.last_failure.get()
    }

    // ── Replication seam ────────────────────────────────────────

    /// Install the leader-side replication state (follower sets + client).
    pub fn set_replication(&self, state: ReplicationState) {
        *self.replication.borrow_mut() = Some(state);
    }

    pub(crate) fn with_replication<T>(
        &self,
        f: impl FnOnce(&ReplicationState) -> T,
    ) -> Option<T> {
        self.replication.borrow().as_ref().map(f)
    }
}
