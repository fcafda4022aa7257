mod catalog;
mod collection;
mod engine;
mod error;
mod index;
mod key;
mod record;
mod revision;
mod value;

pub use collection::{AccessMode, Collection, CompactionGuard};
pub use engine::{Engine, EngineTxn, ScannedEntry, StoredDocument};
pub use error::EngineError;
pub use index::{
    FilterCosting, Index, IndexKind, IndexSearch, SortCosting, default_sort_cost,
};
pub use key::{doc_key, index_entry_key, index_prefix};
pub use record::Record;
pub use revision::RevisionClock;
pub use value::SortableValue;

pub use catalog::NameResolver;
