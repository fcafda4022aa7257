use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use vellum_engine::{AccessMode, Collection};
use vellum_query::ErrorKind;
use vellum_store::Store;

use crate::context::{TransactionContext, TxnHandle};
use crate::error::DbError;
use crate::role::ServerRole;

/// Lifecycle states of a transaction façade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Created,
    Running,
    Committed,
    Aborted,
}

/// Behaviour hints, a small bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransactionHints(u32);

impl TransactionHints {
    /// The transaction wraps exactly one operation.
    pub const SINGLE_OPERATION: u32 = 1 << 0;
    /// Collection locks are managed by the caller; `lock` becomes a no-op.
    pub const LOCK_NEVER: u32 = 1 << 1;

    pub fn new(bits: u32) -> TransactionHints {
        TransactionHints(bits)
    }

    pub fn has(self, hint: u32) -> bool {
        self.0 & hint != 0
    }

    pub fn set(&mut self, hint: u32) {
        self.0 |= hint;
    }
}

/// Options fixed at transaction construction.
#[derive(Debug, Clone)]
pub struct TransactionOptions {
    pub read_only: bool,
    pub wait_for_sync: bool,
    /// Register collections on first use instead of requiring explicit
    /// registration up front.
    pub allow_implicit: bool,
    pub timeout: Option<Duration>,
    pub hints: TransactionHints,
    /// Caller-supplied transaction id; 0 when generated.
    pub external_id: u64,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        TransactionOptions {
            read_only: false,
            wait_for_sync: false,
            allow_implicit: true,
            timeout: None,
            hints: TransactionHints::default(),
            external_id: 0,
        }
    }
}

pub(crate) struct CollectionBinding {
    pub cid: u64,
    pub access: AccessMode,
    pub collection: Arc<Collection>,
    pub locked: Option<AccessMode>,
    /// Registered on first use rather than explicitly by the caller.
    pub implicit: bool,
}

/// The transaction façade: one logical transaction spanning any number of
/// collections.
///
/// A façade belongs to at most one thread at a time. On coordinators it is
/// a router only (`is_real` = false) and carries no engine handle.
pub struct Transaction<S: Store> {
    context: Rc<TransactionContext<S>>,
    handle: Option<Rc<TxnHandle<S>>>,
    status: TransactionStatus,
    nesting_level: u32,
    pub(crate) collections: Vec<CollectionBinding>,
    hints: TransactionHints,
    timeout: Option<Duration>,
    wait_for_sync: bool,
    allow_implicit: bool,
    is_real: bool,
    external_id: u64,
    pub(crate) any_failure: bool,
}

impl<S: Store> std::fmt::Debug for Transaction<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("status", &self.status)
            .field("nesting_level", &self.nesting_level)
            .field("hints", &self.hints)
            .field("timeout", &self.timeout)
            .field("wait_for_sync", &self.wait_for_sync)
            .field("allow_implicit", &self.allow_implicit)
            .field("is_real", &self.is_real)
            .field("external_id", &self.external_id)
            .field("any_failure", &self.any_failure)
            .finish()
    }
}

impl<S: Store> Transaction<S> {
    /// Construct a façade: adopt the context's running parent transaction,
    /// or create a fresh engine handle.
    pub fn new(
        context: Rc<TransactionContext<S>>,
        options: TransactionOptions,
    ) -> Result<Transaction<S>, DbError> {
        let is_real = !ServerRole::current().is_coordinator();
        let timeout = options.timeout.or(context.config().transaction_timeout);

        if let Some(parent) = context.parent_handle() {
            if !context.nesting_allowed() {
                return Err(DbError::new(
                    ErrorKind::TransactionNested,
                    "transaction nesting is not allowed in this context",
                ));
            }
            let nesting_level = parent.enter_nested();
            tracing::debug!(nesting_level, "embedding transaction");
            return Ok(Transaction {
                context,
                handle: Some(parent),
                status: TransactionStatus::Created,
                nesting_level,
                collections: Vec::new(),
                hints: options.hints,
                timeout,
                wait_for_sync: options.wait_for_sync,
                allow_implicit: options.allow_implicit,
                is_real,
                external_id: options.external_id,
                any_failure: false,
            });
        }

        let handle = if is_real {
            let engine_txn = context.engine().begin(options.read_only)?;
            let handle = TxnHandle::new(engine_txn);
            context.register_parent(&handle);
            Some(handle)
        } else {
            None
        };

        Ok(Transaction {
            context,
            handle,
            status: TransactionStatus::Created,
            nesting_level: 0,
            collections: Vec::new(),
            hints: options.hints,
            timeout,
            wait_for_sync: options.wait_for_sync,
            allow_implicit: options.allow_implicit,
            is_real,
            external_id: options.external_id,
            any_failure: false,
        })
    }

    // ── Accessors ───────────────────────────────────────────────

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn nesting_level(&self) -> u32 {
        self.nesting_level
    }

    pub fn is_embedded(&self) -> bool {
        self.nesting_level > 0
    }

    pub fn is_real(&self) -> bool {
        self.is_real
    }

    pub fn external_id(&self) -> u64 {
        self.external_id
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn hints(&self) -> TransactionHints {
        self.hints
    }

    pub fn wait_for_sync(&self) -> bool {
        self.wait_for_sync
    }

    pub fn context(&self) -> &Rc<TransactionContext<S>> {
        &self.context
    }

    pub(crate) fn handle(&self) -> Result<&Rc<TxnHandle<S>>, DbError> {
        self.handle.as_ref().ok_or_else(|| {
            DbError::new(
                ErrorKind::TransactionInternal,
                "transaction has no storage handle",
            )
        })
    }

    pub(crate) fn require_running(&self) -> Result<(), DbError> {
        if self.status != TransactionStatus::Running {
            return Err(DbError::new(
                ErrorKind::TransactionInternal,
                "transaction is not running",
            ));
        }
        Ok(())
    }

    // ── Lifecycle ───────────────────────────────────────────────

    /// Promote to RUNNING. A no-op past CREATED.
    pub fn begin(&mut self) -> Result<(), DbError> {
        if self.status != TransactionStatus::Created {
            return Ok(());
        }
        // The engine handle exists since construction; promoting a non-real
        // transaction only flips the status.
        self.status = TransactionStatus::Running;
        Ok(())
    }

    /// Commit a running transaction. Terminal. For embedded transactions
    /// the actual engine commit happens at the top level.
    pub fn commit(&mut self) -> Result<(), DbError> {
        self.require_running()?;
        if self.nesting_level == 0 && self.is_real {
            self.handle()?.borrow_mut().commit()?;
        }
        self.status = TransactionStatus::Committed;
        Ok(())
    }

    /// Abort a running transaction, rolling back via the engine. Terminal.
    pub fn abort(&mut self) -> Result<(), DbError> {
        self.require_running()?;
        if self.nesting_level == 0 && self.is_real {
            self.handle()?.borrow_mut().rollback()?;
        }
        self.status = TransactionStatus::Aborted;
        Ok(())
    }

    // ── Collection registration ─────────────────────────────────

    /// Register a collection with an access type.
    ///
    /// Top-level transactions accept registrations only while CREATED;
    /// embedded transactions may also register while RUNNING.
    pub fn add_collection(&mut self, name: &str, access: AccessMode) -> Result<(), DbError> {
        let registrable = match self.status {
            TransactionStatus::Created => true,
            TransactionStatus::Running => self.is_embedded(),
            _ => false,
        };
        if !registrable {
            return Err(DbError::new(
                ErrorKind::TransactionInternal,
                "cannot add a collection in the current transaction state",
            ));
        }

        let collection = self.context.engine().collection(name).ok_or_else(|| {
            DbError::new(ErrorKind::CollectionNotFound, format!("collection not found: {name}"))
        })?;
        self.bind(collection, access, false);
        Ok(())
    }

    fn bind(&mut self, collection: Arc<Collection>, access: AccessMode, implicit: bool) {
        if let Some(binding) = self.collections.iter_mut().find(|b| b.cid == collection.id) {
            if binding.access == AccessMode::Read && access == AccessMode::Write {
                binding.access = AccessMode::Write;
            }
            binding.implicit &= implicit;
            return;
        }
        self.collections.push(CollectionBinding {
            cid: collection.id,
            access,
            collection,
            locked: None,
            implicit,
        });
    }

    /// Resolve a collection for an operation, registering it implicitly
    /// when permitted.
    pub(crate) fn collection_for(
        &mut self,
        name: &str,
        access: AccessMode,
    ) -> Result<Arc<Collection>, DbError> {
        let collection = self.context.engine().collection(name).ok_or_else(|| {
            DbError::new(ErrorKind::CollectionNotFound, format!("collection not found: {name}"))
        })?;

        match self.collections.iter_mut().find(|b| b.cid == collection.id) {
            Some(binding) => {
                if access == AccessMode::Write && binding.access != AccessMode::Write {
                    // An implicit read binding may grow into a write
                    // binding; an explicit one may not.
                    if binding.implicit && self.allow_implicit {
                        binding.access = AccessMode::Write;
                    } else {
                        return Err(DbError::new(
                            ErrorKind::TransactionInternal,
                            format!("collection {name} is not registered for writing"),
                        ));
                    }
                }
            }
            None => {
                if !self.allow_implicit {
                    return Err(DbError::new(
                        ErrorKind::TransactionInternal,
                        format!("collection {name} is not registered in this transaction"),
                    ));
                }
                self.bind(Arc::clone(&collection), access, true);
            }
        }
        Ok(collection)
    }

    // ── Locking ─────────────────────────────────────────────────

    /// Acquire a collection lock. Locks are only taken at nesting level 0;
    /// embedded levels piggyback on the top level's locks.
    pub fn lock(
        &mut self,
        name: &str,
        access: AccessMode,
        nesting_level: u32,
    ) -> Result<(), DbError> {
        if nesting_level > 0 || self.hints.has(TransactionHints::LOCK_NEVER) {
            return Ok(());
        }
        let binding = self.binding_mut(name)?;
        if binding.locked.is_some() {
            return Ok(());
        }
        binding.collection.lock(access);
        binding.locked = Some(access);
        Ok(())
    }

    pub fn unlock(
        &mut self,
        name: &str,
        access: AccessMode,
        nesting_level: u32,
    ) -> Result<(), DbError> {
        if nesting_level > 0 || self.hints.has(TransactionHints::LOCK_NEVER) {
            return Ok(());
        }
        let binding = self.binding_mut(name)?;
        if binding.locked == Some(access) {
            binding.collection.unlock(access);
            binding.locked = None;
        }
        Ok(())
    }

    pub fn is_locked(&self, name: &str, access: AccessMode) -> bool {
        self.collections
            .iter()
            .any(|b| b.collection.name == name && b.locked == Some(access))
    }

    fn binding_mut(&mut self, name: &str) -> Result<&mut CollectionBinding, DbError> {
        self.collections
            .iter_mut()
            .find(|b| b.collection.name == name)
            .ok_or_else(|| {
                DbError::new(
                    ErrorKind::TransactionInternal,
                    format!("collection {name} is not registered in this transaction"),
                )
            })
    }

    pub(crate) fn release_locks(&mut self) {
        for binding in &mut self.collections {
            if let Some(mode) = binding.locked.take() {
                binding.collection.unlock(mode);
            }
        }
    }
}

impl<S: Store> Drop for Transaction<S> {
    fn drop(&mut self) {
        if self.nesting_level > 0 {
            if let Some(handle) = &self.handle {
                handle.leave_nested();
            }
            return;
        }

        // Top-level: a still-running transaction aborts.
        if self.status == TransactionStatus::Running {
            if let Err(e) = self.abort() {
                tracing::warn!(error = %e, "failed to abort transaction on drop");
            }
        }
        self.release_locks();
        self.context.unregister_parent(self.any_failure);
    }
}
