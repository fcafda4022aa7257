use std::cmp::Ordering;

use bson::Bson;

use vellum_query::{AndClause, CompareOp, Comparison, Condition, Operand, compare_values};

use crate::handle::IndexHandle;

/// One OR branch reduced to its single comparison.
struct ClausePart {
    variable: String,
    path: String,
    op: CompareOp,
    value: Bson,
    /// Set when an IN array was merged away into an earlier clause.
    emptied: bool,
}

impl ClausePart {
    /// The value bounding the clause from below; `None` for upper-bound
    /// only operators.
    fn lower_bound(&self) -> Option<&Bson> {
        match self.op {
            CompareOp::Eq | CompareOp::Gt | CompareOp::Ge | CompareOp::In => Some(&self.value),
            _ => None,
        }
    }

    fn lower_inclusive(&self) -> bool {
        self.op.is_inclusive()
    }
}

/// Canonicalise a DNF root of single-comparison OR clauses, permuting the
/// chosen index handles in step.
///
/// Returns false — leaving both inputs untouched — when any clause is not
/// a single binary comparison, an operator is `!=`/`NOT IN`, the clauses
/// reference more than one variable or attribute, a comparison has no
/// constant side, an `IN` right-hand side is not an array, or the handle
/// vector disagrees in size.
///
/// Otherwise: all `IN` arrays are merged into the first `IN` clause (their
/// union, value-ordered and deduplicated), clauses are stably ordered by
/// (variable, attribute path, lower bound) with a missing bound ordering
/// first and inclusive before exclusive on ties, and clauses whose `IN`
/// array was merged away are dropped.
pub fn sort_or_clauses(condition: &mut Condition, handles: &mut Vec<IndexHandle>) -> bool {
    if condition.clauses.len() != handles.len() {
        return false;
    }
    if condition.clauses.is_empty() {
        return true;
    }

    let mut parts = Vec::with_capacity(condition.clauses.len());
    for clause in &condition.clauses {
        let Some(comparison) = clause.sole_comparison() else {
            return false;
        };
        let Some((variable, path, op, value)) = comparison.attribute_and_constant() else {
            return false;
        };
        if matches!(op, CompareOp::Ne | CompareOp::NotIn) {
            return false;
        }
        if op == CompareOp::In && !matches!(value, Bson::Array(_)) {
            return false;
        }
        parts.push(ClausePart {
            variable: variable.to_string(),
            path: path.to_string(),
            op,
            value: value.clone(),
            emptied: false,
        });
    }

    // All clauses must constrain the same attribute of the same variable.
    let same_target = parts
        .windows(2)
        .all(|pair| pair[0].variable == pair[1].variable && pair[0].path == pair[1].path);
    if !same_target {
        return false;
    }

    merge_in_arrays(&mut parts);

    let mut order: Vec<usize> = (0..parts.len()).collect();
    order.sort_by(|&a, &b| compare_parts(&parts[a], &parts[b]));

    let mut clauses = Vec::with_capacity(parts.len());
    let mut reordered = Vec::with_capacity(parts.len());
    for &i in &order {
        let part = &parts[i];
        if part.emptied {
            continue;
        }
        clauses.push(AndClause::single(Comparison::new(
            Operand::attribute(part.variable.clone(), part.path.clone()),
            part.op,
            Operand::constant(part.value.clone()),
        )));
        reordered.push(handles[i].clone());
    }

    condition.clauses = clauses;
    *handles = reordered;
    true
}

/// Union every IN array into the first IN clause; later IN clauses keep an
/// empty placeholder array and are dropped on rebuild.
fn merge_in_arrays(parts: &mut [ClausePart]) {
    let mut first_in: Option<usize> = None;
    let mut merged: Vec<Bson> = Vec::new();

    for (i, part) in parts.iter_mut().enumerate() {
        if part.op != CompareOp::In {
            continue;
        }
        let Bson::Array(values) = &mut part.value else {
            continue;
        };
        match first_in {
            None => {
                first_in = Some(i);
                merged = std::mem::take(values);
            }
            Some(_) => {
                merged.append(values);
                part.emptied = true;
            }
        }
    }

    if let Some(i) = first_in {
        merged.sort_by(compare_values);
        merged.dedup_by(|a, b| compare_values(a, b) == Ordering::Equal);
        parts[i].value = Bson::Array(merged);
    }
}

fn compare_parts(a: &ClausePart, b: &ClausePart) -> Ordering {
    a.variable
        .cmp(&b.variable)
        .then_with(|| a.path.cmp(&b.path))
        .then_with(|| match (a.lower_bound(), b.lower_bound()) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(va), Some(vb)) => compare_values(va, vb),
        })
        .then_with(|| match (a.lower_inclusive(), b.lower_inclusive()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => Ordering::Equal,
        })
}
