use std::rc::Rc;
use std::sync::Arc;

use vellum_engine::{Engine, IndexKind};
use vellum_store::Store;

use crate::config::DatabaseConfig;
use crate::context::TransactionContext;
use crate::error::DbError;
use crate::handle::IndexHandle;
use crate::transaction::{Transaction, TransactionOptions};

/// One database: the engine plus configuration. Entry point for contexts
/// and transactions.
pub struct Database<S: Store> {
    engine: Arc<Engine<S>>,
    config: DatabaseConfig,
}

impl<S: Store> Database<S> {
    pub fn open(store: S, config: DatabaseConfig) -> Result<Database<S>, DbError> {
        Ok(Database {
            engine: Arc::new(Engine::open(store)?),
            config,
        })
    }

    pub fn engine(&self) -> &Arc<Engine<S>> {
        &self.engine
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn create_collection(&self, name: &str) -> Result<(), DbError> {
        self.engine.create_collection(name)?;
        Ok(())
    }

    pub fn ensure_index(
        &self,
        collection: &str,
        kind: IndexKind,
        fields: Vec<String>,
        unique: bool,
        sparse: bool,
    ) -> Result<IndexHandle, DbError> {
        let coll = self.engine.collection(collection).ok_or_else(|| {
            DbError::new(
                vellum_query::ErrorKind::CollectionNotFound,
                format!("collection not found: {collection}"),
            )
        })?;
        let index = self.engine.ensure_index(&coll, kind, fields, unique, sparse)?;
        Ok(IndexHandle::new(index))
    }

    /// A fresh transaction context. Transactions sharing one context embed
    /// into each other.
    pub fn context(&self) -> Rc<TransactionContext<S>> {
        TransactionContext::new(Arc::clone(&self.engine), self.config.clone())
    }

    /// Convenience: a running top-level transaction on its own context.
    pub fn begin(&self, read_only: bool) -> Result<Transaction<S>, DbError> {
        let mut txn = Transaction::new(
            self.context(),
            TransactionOptions {
                read_only,
                ..TransactionOptions::default()
            },
        )?;
        txn.begin()?;
        Ok(txn)
    }
}
