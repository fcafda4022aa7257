use std::sync::Arc;

use vellum_engine::{Index, default_sort_cost};
use vellum_query::{AndClause, SortCondition};

use crate::handle::IndexHandle;

/// Penalty factor charged when an index cannot evaluate the filter and the
/// documents have to be post-filtered.
const UNSUPPORTED_FILTER_FACTOR: f64 = 1.5;

/// What the chosen index can do for one conjunction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AndClauseChoice {
    pub supports_filter: bool,
    pub supports_sort: bool,
}

impl AndClauseChoice {
    fn none() -> AndClauseChoice {
        AndClauseChoice {
            supports_filter: false,
            supports_sort: false,
        }
    }
}

/// Pick the cheapest index for one conjunction plus sort condition.
///
/// Every candidate is costed for the filter (unsupported filters charge
/// `items_in × 1.5`) and for the sort; an index supporting neither is
/// skipped. The minimum of `filter_cost + sort_cost` wins, first
/// encountered on ties. The winning clause is specialised to what the
/// index evaluates, the winner's handle is appended to `used`, and its
/// sparseness is reported through `sparse_out`.
pub fn find_index_for_and_clause(
    indexes: &[Arc<Index>],
    clause: &mut AndClause,
    variable: &str,
    sort: &SortCondition,
    items_in: u64,
    used: &mut Vec<IndexHandle>,
    sparse_out: &mut bool,
) -> AndClauseChoice {
    struct Candidate {
        position: usize,
        total_cost: f64,
        supports_filter: bool,
        supports_sort: bool,
    }

    let mut best: Option<Candidate> = None;

    for (position, index) in indexes.iter().enumerate() {
        let filter = index.supports_filter_condition(clause, variable, items_in);
        let filter_cost = if filter.supported {
            filter.estimated_cost
        } else {
            items_in as f64 * UNSUPPORTED_FILTER_FACTOR
        };

        let mut supports_sort = false;
        let mut sort_cost = 0.0;
        if !sort.is_empty() {
            if sort.is_unidirectional() {
                let costing = index.supports_sort_condition(sort, variable, filter.estimated_items);
                if costing.supported {
                    supports_sort = true;
                    sort_cost = costing.estimated_cost;
                }
            }
            if !supports_sort {
                if clause.is_all_equality(variable)
                    && sort.covered_attributes(variable, &index.fields) == sort.fields.len()
                {
                    // All-equality lookup over the sort attributes: every
                    // result batch is trivially in sort order.
                    supports_sort = true;
                } else {
                    sort_cost = default_sort_cost(filter.estimated_items);
                }
            }
        }

        if !filter.supported && !supports_sort {
            continue;
        }

        let total_cost = filter_cost + sort_cost;
        tracing::debug!(
            index = index.id,
            kind = index.kind.as_str(),
            filter_cost,
            sort_cost,
            "costed index candidate"
        );
        let better = match &best {
            None => true,
            Some(candidate) => total_cost < candidate.total_cost,
        };
        if better {
            best = Some(Candidate {
                position,
                total_cost,
                supports_filter: filter.supported,
                supports_sort,
            });
        }
    }

    let Some(winner) = best else {
        return AndClauseChoice::none();
    };

    let index = &indexes[winner.position];
    *clause = index.specialize_condition(clause, variable);
    used.push(IndexHandle::new(Arc::clone(index)));
    *sparse_out = index.sparse;

    AndClauseChoice {
        supports_filter: winner.supports_filter,
        supports_sort: winner.supports_sort,
    }
}
