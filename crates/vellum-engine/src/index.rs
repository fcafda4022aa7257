use bson::{Bson, Document};

use vellum_query::{AndClause, CompareOp, Comparison, SortCondition};

use crate::error::EngineError;
use crate::value::{SortableValue, value_at_path};

/// Selectivity heuristics used by the costing methods.
const EQUALITY_REDUCTION: u64 = 100;
const RANGE_REDUCTION: u64 = 2;

/// Concrete index kinds. The capability surface below is the only way the
/// planner and the cursor factory look at an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Primary,
    Hash,
    Skiplist,
    Persistent,
}

impl IndexKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IndexKind::Primary => "primary",
            IndexKind::Hash => "hash",
            IndexKind::Skiplist => "skiplist",
            IndexKind::Persistent => "persistent",
        }
    }

    pub fn from_str(s: &str) -> Option<IndexKind> {
        Some(match s {
            "primary" => IndexKind::Primary,
            "hash" => IndexKind::Hash,
            "skiplist" => IndexKind::Skiplist,
            "persistent" => IndexKind::Persistent,
            _ => return None,
        })
    }
}

/// Result of costing a filter clause against an index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterCosting {
    pub supported: bool,
    pub estimated_items: u64,
    pub estimated_cost: f64,
}

impl FilterCosting {
    pub(crate) fn unsupported(items_in: u64) -> FilterCosting {
        FilterCosting {
            supported: false,
            estimated_items: items_in,
            estimated_cost: 0.0,
        }
    }
}

/// Result of costing a sort condition against an index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SortCosting {
    pub supported: bool,
    pub estimated_cost: f64,
    pub covered_fields: usize,
}

/// Descriptor and capability surface of one index.
#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    pub id: u64,
    pub kind: IndexKind,
    /// Ordered attribute paths, dotted for nested attributes.
    pub fields: Vec<String>,
    pub unique: bool,
    pub sparse: bool,
}

impl Index {
    pub fn primary(id: u64) -> Index {
        Index {
            id,
            kind: IndexKind::Primary,
            fields: vec!["_key".to_string()],
            unique: true,
            sparse: false,
        }
    }

    pub fn is_sorted(&self) -> bool {
        matches!(self.kind, IndexKind::Skiplist | IndexKind::Persistent)
    }

    // ── Filter support ──────────────────────────────────────────

    /// Cost the given conjunction against this index.
    ///
    /// The returned `estimated_cost` is only meaningful when `supported`;
    /// the planner charges its own penalty for unsupported filters.
    pub fn supports_filter_condition(
        &self,
        clause: &AndClause,
        variable: &str,
        items_in: u64,
    ) -> FilterCosting {
        match self.kind {
            IndexKind::Primary => {
                let supported = clause
                    .comparisons
                    .iter()
                    .filter_map(|cmp| cmp.attribute_and_constant())
                    .any(|(var, path, op, _)| {
                        var == variable && op == CompareOp::Eq && (path == "_key" || path == "_id")
                    });
                if supported {
                    FilterCosting {
                        supported: true,
                        estimated_items: 1,
                        estimated_cost: 1.0,
                    }
                } else {
                    FilterCosting::unsupported(items_in)
                }
            }
            IndexKind::Hash => {
                // Usable only when every index field is pinned by an
                // equality (or IN) in the clause.
                let mut multiplier = 1u64;
                for field in &self.fields {
                    match clause.comparison_for(variable, field) {
                        Some((CompareOp::Eq, _)) => {}
                        Some((CompareOp::In, Bson::Array(values))) => {
                            multiplier = multiplier.saturating_mul(values.len().max(1) as u64);
                        }
                        _ => return FilterCosting::unsupported(items_in),
                    }
                }
                let base = if self.unique {
                    1
                } else {
                    (items_in / EQUALITY_REDUCTION).max(1)
                };
                let estimated_items = base.saturating_mul(multiplier);
                FilterCosting {
                    supported: true,
                    estimated_items,
                    estimated_cost: estimated_items as f64,
                }
            }
            IndexKind::Skiplist | IndexKind::Persistent => {
                // Equality prefix, then at most one range on the next field.
                let mut estimated = items_in;
                let mut used_any = false;
                for field in &self.fields {
                    match clause.comparison_for(variable, field) {
                        Some((CompareOp::Eq, _)) => {
                            estimated = (estimated / EQUALITY_REDUCTION).max(1);
                            used_any = true;
                        }
                        Some((CompareOp::In, Bson::Array(values))) => {
                            estimated = (estimated / EQUALITY_REDUCTION).max(1);
                            estimated = estimated.saturating_mul(values.len().max(1) as u64);
                            used_any = true;
                        }
                        Some((op, _))
                            if matches!(
                                op,
                                CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge
                            ) =>
                        {
                            estimated = (estimated / RANGE_REDUCTION).max(1);
                            used_any = true;
                            break;
                        }
                        _ => break,
                    }
                }
                if !used_any {
                    return FilterCosting::unsupported(items_in);
                }
                FilterCosting {
                    supported: true,
                    estimated_items: estimated,
                    estimated_cost: estimated as f64 + (items_in.max(2) as f64).log2(),
                }
            }
        }
    }

    // ── Sort support ────────────────────────────────────────────

    pub fn supports_sort_condition(
        &self,
        sort: &SortCondition,
        variable: &str,
        items_in: u64,
    ) -> SortCosting {
        if !self.is_sorted() || sort.is_empty() || !sort.is_unidirectional() {
            return SortCosting {
                supported: false,
                estimated_cost: default_sort_cost(items_in),
                covered_fields: 0,
            };
        }

        let covered = sort.covered_attributes(variable, &self.fields);
        if covered == sort.fields.len() {
            SortCosting {
                supported: true,
                estimated_cost: 0.0,
                covered_fields: covered,
            }
        } else {
            SortCosting {
                supported: false,
                estimated_cost: default_sort_cost(items_in),
                covered_fields: covered,
            }
        }
    }

    // ── Specialisation ──────────────────────────────────────────

    /// Strip a clause down to the comparisons this index evaluates itself;
    /// the remainder stays behind as a post-filter.
    pub fn specialize_condition(&self, clause: &AndClause, variable: &str) -> AndClause {
        let mut kept: Vec<Comparison> = Vec::new();
        match self.kind {
            IndexKind::Primary => {
                if let Some(cmp) = clause.comparisons.iter().find(|cmp| {
                    cmp.attribute_and_constant().is_some_and(|(var, path, op, _)| {
                        var == variable && op == CompareOp::Eq && (path == "_key" || path == "_id")
                    })
                }) {
                    kept.push(cmp.clone());
                }
            }
            IndexKind::Hash => {
                for field in &self.fields {
                    if let Some(cmp) = clause.comparisons.iter().find(|cmp| {
                        cmp.attribute_and_constant().is_some_and(|(var, path, op, _)| {
                            var == variable
                                && path == field
                                && matches!(op, CompareOp::Eq | CompareOp::In)
                        })
                    }) {
                        kept.push(cmp.clone());
                    }
                }
            }
            IndexKind::Skiplist | IndexKind::Persistent => {
                for field in &self.fields {
                    let eq = clause.comparisons.iter().find(|cmp| {
                        cmp.attribute_and_constant().is_some_and(|(var, path, op, _)| {
                            var == variable
                                && path == field
                                && matches!(op, CompareOp::Eq | CompareOp::In)
                        })
                    });
                    if let Some(cmp) = eq {
                        kept.push(cmp.clone());
                        continue;
                    }
                    // First non-equality field: keep its range comparisons
                    // and stop.
                    for cmp in &clause.comparisons {
                        if cmp.attribute_and_constant().is_some_and(|(var, path, op, _)| {
                            var == variable
                                && path == field
                                && matches!(
                                    op,
                                    CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge
                                )
                        }) {
                            kept.push(cmp.clone());
                        }
                    }
                    break;
                }
            }
        }
        AndClause::new(kept)
    }

    // ── Iteration search specs ──────────────────────────────────

    /// Build the scan specification for a specialised clause.
    pub fn search_for_clause(&self, clause: &AndClause, variable: &str) -> IndexSearch {
        let mut prefix: Vec<SortableValue> = Vec::new();
        for field in &self.fields {
            match clause.comparison_for(variable, field) {
                Some((CompareOp::Eq, value)) => {
                    match SortableValue::from_bson(value) {
                        Some(sv) => prefix.push(sv),
                        None => break,
                    }
                }
                _ => {
                    // First field without an equality: collect range bounds.
                    let mut lower: Option<(SortableValue, bool)> = None;
                    let mut upper: Option<(SortableValue, bool)> = None;
                    for cmp in &clause.comparisons {
                        let Some((var, path, op, value)) = cmp.attribute_and_constant() else {
                            continue;
                        };
                        if var != variable || path != field {
                            continue;
                        }
                        let Some(sv) = SortableValue::from_bson(value) else {
                            continue;
                        };
                        match op {
                            CompareOp::Gt => lower = Some((sv, false)),
                            CompareOp::Ge => lower = Some((sv, true)),
                            CompareOp::Lt => upper = Some((sv, false)),
                            CompareOp::Le => upper = Some((sv, true)),
                            _ => {}
                        }
                    }
                    if lower.is_some() || upper.is_some() {
                        return IndexSearch::Range {
                            prefix,
                            lower,
                            upper,
                        };
                    }
                    break;
                }
            }
        }
        if prefix.is_empty() {
            IndexSearch::Full
        } else {
            IndexSearch::Eq(prefix)
        }
    }

    /// Build the scan specification for a search example document: equality
    /// on each leading index field present in the example.
    pub fn search_for_example(&self, example: &Document) -> IndexSearch {
        let mut prefix = Vec::new();
        for field in &self.fields {
            match value_at_path(example, field).and_then(SortableValue::from_bson) {
                Some(sv) => prefix.push(sv),
                None => break,
            }
        }
        if prefix.is_empty() {
            IndexSearch::Full
        } else {
            IndexSearch::Eq(prefix)
        }
    }

    /// Index field values for a document, in field order. `None` when the
    /// index is sparse and any field is missing; missing fields otherwise
    /// index as null.
    pub fn values_for_document(&self, doc: &Document) -> Option<Vec<SortableValue>> {
        let mut values = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            match value_at_path(doc, field).and_then(SortableValue::from_bson) {
                Some(sv) => values.push(sv),
                None if self.sparse => return None,
                None => values.push(SortableValue::null()),
            }
        }
        Some(values)
    }

    // ── Descriptor ──────────────────────────────────────────────

    pub fn descriptor(&self) -> Document {
        let mut doc = Document::new();
        doc.insert("id", self.id as i64);
        doc.insert("type", self.kind.as_str());
        doc.insert(
            "fields",
            Bson::Array(self.fields.iter().map(|f| Bson::String(f.clone())).collect()),
        );
        doc.insert("unique", self.unique);
        doc.insert("sparse", self.sparse);
        doc
    }

    /// Rebuild an index from a descriptor, dispatching on the declared
    /// type string.
    pub fn from_descriptor(doc: &Document) -> Result<Index, EngineError> {
        let kind = doc
            .get_str("type")
            .ok()
            .and_then(IndexKind::from_str)
            .ok_or_else(|| EngineError::Encoding("unknown index type".into()))?;
        let id = doc
            .get_i64("id")
            .map_err(|_| EngineError::Encoding("index descriptor missing id".into()))?
            as u64;
        let fields = doc
            .get_array("fields")
            .map_err(|_| EngineError::Encoding("index descriptor missing fields".into()))?
            .iter()
            .map(|value| match value {
                Bson::String(s) => Ok(s.clone()),
                _ => Err(EngineError::Encoding("index field is not a string".into())),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Index {
            id,
            kind,
            fields,
            unique: doc.get_bool("unique").unwrap_or(false),
            sparse: doc.get_bool("sparse").unwrap_or(false),
        })
    }
}

/// Cost of sorting `items` documents after the fact.
pub fn default_sort_cost(items: u64) -> f64 {
    let n = items.max(2) as f64;
    n * n.log2()
}

/// Scan specification consumed by the engine's index iterators.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexSearch {
    Full,
    /// Equality on the leading fields.
    Eq(Vec<SortableValue>),
    /// Equality prefix plus one bounded field (`bool` = inclusive).
    Range {
        prefix: Vec<SortableValue>,
        lower: Option<(SortableValue, bool)>,
        upper: Option<(SortableValue, bool)>,
    },
}
