mod and_clause;
mod normalize;

pub use and_clause::{AndClauseChoice, find_index_for_and_clause};
pub use normalize::sort_or_clauses;

use std::sync::Arc;

use vellum_engine::{AccessMode, Index};
use vellum_query::{Condition, SortCondition};
use vellum_store::Store;

use crate::error::DbError;
use crate::handle::IndexHandle;
use crate::transaction::Transaction;

/// Aggregate decision for a DNF root: one handle per OR clause plus what
/// the set can be used for.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSelection {
    pub handles: Vec<IndexHandle>,
    pub can_use_for_filter: bool,
    pub can_use_for_sort: bool,
}

impl IndexSelection {
    fn unusable() -> IndexSelection {
        IndexSelection {
            handles: Vec::new(),
            can_use_for_filter: false,
            can_use_for_sort: false,
        }
    }
}

/// Choose indexes for every AND clause of a DNF root.
///
/// Filter usability is the conjunction over clauses, sort usability the
/// disjunction. A clause served by a sort-only index discards every other
/// choice — the whole condition is then answered by that one sorted scan —
/// unless that index is sparse, which cannot produce a complete sorted
/// view and voids the selection. When every clause supports filtering the
/// OR root is canonicalised via [`sort_or_clauses`].
pub fn best_indexes_for_condition(
    indexes: &[Arc<Index>],
    condition: &mut Condition,
    variable: &str,
    sort: &SortCondition,
    items_in: u64,
) -> IndexSelection {
    if condition.is_empty() {
        return IndexSelection::unusable();
    }

    let mut handles: Vec<IndexHandle> = Vec::with_capacity(condition.clauses.len());
    let mut can_use_for_filter = true;
    let mut can_use_for_sort = false;

    for clause in condition.clauses.iter_mut() {
        let mut sparse = false;
        let choice = find_index_for_and_clause(
            indexes,
            clause,
            variable,
            sort,
            items_in,
            &mut handles,
            &mut sparse,
        );

        if !choice.supports_filter && choice.supports_sort {
            let sort_handle = handles.pop().expect("choice appended a handle");
            if sparse {
                return IndexSelection::unusable();
            }
            return IndexSelection {
                handles: vec![sort_handle],
                can_use_for_filter: false,
                can_use_for_sort: true,
            };
        }

        if !choice.supports_filter && !choice.supports_sort {
            can_use_for_filter = false;
            continue;
        }

        can_use_for_filter &= choice.supports_filter;
        can_use_for_sort |= choice.supports_sort;
    }

    if can_use_for_filter && !sort_or_clauses(condition, &mut handles) {
        tracing::debug!("filter condition is not normalisable");
    }

    IndexSelection {
        handles,
        can_use_for_filter,
        can_use_for_sort,
    }
}

impl<S: Store> Transaction<S> {
    /// Plan the best index handles for a filter over one collection.
    pub fn best_indexes_for_filter(
        &mut self,
        collection: &str,
        condition: &mut Condition,
        variable: &str,
        sort: &SortCondition,
    ) -> Result<IndexSelection, DbError> {
        let collection = self.collection_for(collection, AccessMode::Read)?;
        let items_in = self.handle()?.borrow().count(&collection)?;
        Ok(best_indexes_for_condition(
            &collection.indexes(),
            condition,
            variable,
            sort,
            items_in,
        ))
    }

    /// Look up a handle for one index of a collection.
    pub fn index_handle(&mut self, collection: &str, iid: u64) -> Result<IndexHandle, DbError> {
        let collection = self.collection_for(collection, AccessMode::Read)?;
        collection
            .index_by_id(iid)
            .map(IndexHandle::new)
            .ok_or_else(|| {
                DbError::new(
                    vellum_query::ErrorKind::IndexNotFound,
                    format!("index not found: {iid}"),
                )
            })
    }
}
