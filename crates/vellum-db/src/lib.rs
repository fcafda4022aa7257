mod config;
mod context;
mod coordinator;
mod cursor;
mod database;
mod error;
mod handle;
mod identity;
mod operations;
mod planner;
mod protocol;
mod replication;
mod result;
mod role;
mod transaction;

pub use config::DatabaseConfig;
pub use context::TransactionContext;
pub use coordinator::{
    CoordinatorMethods, DispatchContext, ShardDispatcher, ShardRequest, ShardResponse,
};
pub use cursor::{CursorKind, OperationCursor};
pub use database::Database;
pub use error::DbError;
pub use handle::IndexHandle;
pub use identity::{
    CUSTOM_ID_TAG, build_document_identity, encode_custom_id, extract_id_string, extract_key,
};
pub use operations::KeyEmission;
pub use planner::{
    AndClauseChoice, IndexSelection, best_indexes_for_condition, find_index_for_and_clause,
    sort_or_clauses,
};
pub use protocol::{NOLOCK_HEADER, RequestMethod, document_path, options_query};
pub use replication::{
    FollowerInfo, REPLICATION_TIMEOUT, ReplicationClient, ReplicationRequest, ReplicationState,
};
pub use result::OperationResult;
pub use role::ServerRole;
pub use transaction::{Transaction, TransactionHints, TransactionOptions, TransactionStatus};
