use std::sync::Arc;

use bson::{Bson, bson};
use vellum_db::{IndexHandle, best_indexes_for_condition, sort_or_clauses};
use vellum_engine::{Index, IndexKind};
use vellum_query::{
    AndClause, CompareOp, Comparison, Condition, Operand, SortCondition, SortField,
};

const VAR: &str = "doc";

fn cmp(path: &str, op: CompareOp, value: Bson) -> Comparison {
    Comparison::new(Operand::attribute(VAR, path), op, Operand::constant(value))
}

fn or_of(comparisons: Vec<Comparison>) -> Condition {
    Condition::new(comparisons.into_iter().map(AndClause::single).collect())
}

fn sort_on(paths: &[&str], ascending: bool) -> SortCondition {
    SortCondition::new(
        paths
            .iter()
            .map(|path| SortField {
                variable: VAR.into(),
                path: (*path).into(),
                ascending,
            })
            .collect(),
    )
}

fn primary() -> Arc<Index> {
    Arc::new(Index::primary(1))
}

fn hash_on(id: u64, fields: &[&str]) -> Arc<Index> {
    Arc::new(Index {
        id,
        kind: IndexKind::Hash,
        fields: fields.iter().map(|f| f.to_string()).collect(),
        unique: false,
        sparse: false,
    })
}

fn skiplist_on(id: u64, fields: &[&str], sparse: bool) -> Arc<Index> {
    Arc::new(Index {
        id,
        kind: IndexKind::Skiplist,
        fields: fields.iter().map(|f| f.to_string()).collect(),
        unique: false,
        sparse,
    })
}

fn dummy_handles(count: usize) -> Vec<IndexHandle> {
    (0..count)
        .map(|i| IndexHandle::new(hash_on(100 + i as u64, &["a"])))
        .collect()
}

// ── Condition normalisation ─────────────────────────────────────

#[test]
fn sort_ors_merges_in_arrays_and_orders_clauses() {
    let mut condition = or_of(vec![
        cmp("a", CompareOp::In, bson!([3, 1])),
        cmp("a", CompareOp::Eq, bson!(2)),
        cmp("a", CompareOp::In, bson!([5, 3])),
    ]);
    let originals = dummy_handles(3);
    let mut handles = originals.clone();

    assert!(sort_or_clauses(&mut condition, &mut handles));

    // The first IN absorbed the second; the equality sorts first.
    assert_eq!(condition.clauses.len(), 2);
    let (_, _, op0, v0) = condition.clauses[0]
        .sole_comparison()
        .unwrap()
        .attribute_and_constant()
        .unwrap();
    assert_eq!(op0, CompareOp::Eq);
    assert_eq!(v0, &bson!(2));

    let (_, _, op1, v1) = condition.clauses[1]
        .sole_comparison()
        .unwrap()
        .attribute_and_constant()
        .unwrap();
    assert_eq!(op1, CompareOp::In);
    assert_eq!(v1, &bson!([1, 3, 5]));

    // Handles permuted alongside: the equality's handle first, then the
    // first IN's handle.
    assert_eq!(handles.len(), 2);
    assert_eq!(handles[0], originals[1]);
    assert_eq!(handles[1], originals[0]);
}

#[test]
fn sort_ors_is_idempotent() {
    let mut condition = or_of(vec![
        cmp("a", CompareOp::In, bson!([3, 1])),
        cmp("a", CompareOp::Eq, bson!(2)),
        cmp("a", CompareOp::In, bson!([5, 3])),
    ]);
    let mut handles = dummy_handles(3);
    assert!(sort_or_clauses(&mut condition, &mut handles));

    let once = condition.clone();
    let handles_once = handles.clone();
    assert!(sort_or_clauses(&mut condition, &mut handles));
    assert_eq!(condition, once);
    assert_eq!(handles, handles_once);
}

#[test]
fn sort_ors_rejects_unsupported_shapes() {
    // Not-equal operators.
    let mut condition = or_of(vec![cmp("a", CompareOp::Ne, bson!(1))]);
    let mut handles = dummy_handles(1);
    assert!(!sort_or_clauses(&mut condition, &mut handles));

    // Mixed attributes.
    let mut condition = or_of(vec![
        cmp("a", CompareOp::Eq, bson!(1)),
        cmp("b", CompareOp::Eq, bson!(2)),
    ]);
    let mut handles = dummy_handles(2);
    assert!(!sort_or_clauses(&mut condition, &mut handles));

    // IN without an array operand.
    let mut condition = or_of(vec![cmp("a", CompareOp::In, bson!(3))]);
    let mut handles = dummy_handles(1);
    assert!(!sort_or_clauses(&mut condition, &mut handles));

    // A clause with two comparisons.
    let mut condition = Condition::new(vec![AndClause::new(vec![
        cmp("a", CompareOp::Eq, bson!(1)),
        cmp("a", CompareOp::Gt, bson!(0)),
    ])]);
    let mut handles = dummy_handles(1);
    assert!(!sort_or_clauses(&mut condition, &mut handles));

    // Size mismatch between clauses and handles.
    let mut condition = or_of(vec![cmp("a", CompareOp::Eq, bson!(1))]);
    let mut handles = dummy_handles(2);
    assert!(!sort_or_clauses(&mut condition, &mut handles));
}

#[test]
fn sort_ors_orders_missing_bound_first() {
    // `a < 5` has no lower bound and sorts before any bounded clause.
    let mut condition = or_of(vec![
        cmp("a", CompareOp::Eq, bson!(1)),
        cmp("a", CompareOp::Lt, bson!(5)),
    ]);
    let mut handles = dummy_handles(2);
    assert!(sort_or_clauses(&mut condition, &mut handles));
    let (_, _, op0, _) = condition.clauses[0]
        .sole_comparison()
        .unwrap()
        .attribute_and_constant()
        .unwrap();
    assert_eq!(op0, CompareOp::Lt);
}

// ── Index choice ────────────────────────────────────────────────

#[test]
fn composite_sorted_index_beats_hash_when_sort_matters() {
    let indexes = vec![primary(), hash_on(2, &["x"]), skiplist_on(3, &["x", "y"], false)];
    let mut condition = Condition::new(vec![AndClause::new(vec![
        cmp("x", CompareOp::Eq, bson!(5)),
        cmp("y", CompareOp::Gt, bson!(3)),
    ])]);
    let sort = sort_on(&["x", "y"], true);

    let selection = best_indexes_for_condition(&indexes, &mut condition, VAR, &sort, 1000);

    assert!(selection.can_use_for_filter);
    assert!(selection.can_use_for_sort);
    assert_eq!(selection.handles.len(), 1);
    assert_eq!(selection.handles[0].id(), 3);
}

#[test]
fn equality_pinned_sort_is_free_on_a_hash_index() {
    let indexes = vec![primary(), hash_on(2, &["x"])];
    let mut condition =
        Condition::new(vec![AndClause::single(cmp("x", CompareOp::Eq, bson!(5)))]);
    let sort = sort_on(&["x"], true);

    let selection = best_indexes_for_condition(&indexes, &mut condition, VAR, &sort, 1000);

    assert!(selection.can_use_for_filter);
    assert!(selection.can_use_for_sort);
    assert_eq!(selection.handles[0].id(), 2);
}

#[test]
fn unplannable_clause_disables_filter_use() {
    let indexes = vec![primary(), hash_on(2, &["x"])];
    let mut condition = Condition::new(vec![
        AndClause::single(cmp("x", CompareOp::Eq, bson!(5))),
        AndClause::single(cmp("z", CompareOp::Eq, bson!(1))),
    ]);

    let selection = best_indexes_for_condition(
        &indexes,
        &mut condition,
        VAR,
        &SortCondition::default(),
        1000,
    );
    assert!(!selection.can_use_for_filter);
}

#[test]
fn adding_an_index_never_worsens_the_selection() {
    let mut base_indexes = vec![primary()];
    let sort = sort_on(&["x"], true);

    let capability = |indexes: &[Arc<Index>]| {
        let mut condition =
            Condition::new(vec![AndClause::single(cmp("x", CompareOp::Eq, bson!(5)))]);
        let selection = best_indexes_for_condition(indexes, &mut condition, VAR, &sort, 1000);
        (selection.can_use_for_filter, selection.can_use_for_sort)
    };

    let mut previous = capability(&base_indexes);
    for extra in [hash_on(2, &["x"]), skiplist_on(3, &["x"], false)] {
        base_indexes.push(extra);
        let next = capability(&base_indexes);
        assert!(next.0 >= previous.0, "filter capability regressed");
        assert!(next.1 >= previous.1, "sort capability regressed");
        previous = next;
    }
    assert_eq!(previous, (true, true));
}

#[test]
fn sort_only_escape_keeps_a_single_sorted_index() {
    // The filter is on `y`, which no index covers; skiplist(x) still
    // serves the sort. Every other choice is discarded.
    let indexes = vec![primary(), skiplist_on(2, &["x"], false)];
    let mut condition =
        Condition::new(vec![AndClause::single(cmp("y", CompareOp::Gt, bson!(3)))]);
    let sort = sort_on(&["x"], true);

    let selection = best_indexes_for_condition(&indexes, &mut condition, VAR, &sort, 1000);

    assert!(!selection.can_use_for_filter);
    assert!(selection.can_use_for_sort);
    assert_eq!(selection.handles.len(), 1);
    assert_eq!(selection.handles[0].id(), 2);
}

#[test]
fn sparse_index_is_never_the_sole_sort_fallback() {
    let indexes = vec![primary(), skiplist_on(2, &["x"], true)];
    let mut condition =
        Condition::new(vec![AndClause::single(cmp("y", CompareOp::Gt, bson!(3)))]);
    let sort = sort_on(&["x"], true);

    let selection = best_indexes_for_condition(&indexes, &mut condition, VAR, &sort, 1000);

    assert!(!selection.can_use_for_filter);
    assert!(!selection.can_use_for_sort);
    assert!(selection.handles.is_empty());
}

#[test]
fn winning_clause_is_specialised_to_the_index() {
    let indexes = vec![primary(), hash_on(2, &["x"])];
    let mut condition = Condition::new(vec![AndClause::new(vec![
        cmp("x", CompareOp::Eq, bson!(5)),
        cmp("z", CompareOp::Gt, bson!(0)),
    ])]);

    let selection = best_indexes_for_condition(
        &indexes,
        &mut condition,
        VAR,
        &SortCondition::default(),
        1000,
    );

    assert!(selection.can_use_for_filter);
    // The residual `z > 0` comparison was stripped from the clause.
    assert_eq!(condition.clauses[0].comparisons.len(), 1);
    assert!(condition.clauses[0].comparison_for(VAR, "z").is_none());
}

#[test]
fn ties_go_to_the_first_candidate() {
    let first = hash_on(2, &["x"]);
    let second = hash_on(3, &["x"]);
    let indexes = vec![first, second];
    let mut condition =
        Condition::new(vec![AndClause::single(cmp("x", CompareOp::Eq, bson!(5)))]);

    let selection = best_indexes_for_condition(
        &indexes,
        &mut condition,
        VAR,
        &SortCondition::default(),
        1000,
    );
    assert_eq!(selection.handles[0].id(), 2);
}
