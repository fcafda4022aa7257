use bson::Bson;
use serde::{Deserialize, Serialize};

/// Binary comparison operators usable in a filter clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

impl CompareOp {
    /// Mirror the operator for swapping the comparison's sides
    /// (`5 < doc.x` becomes `doc.x > 5`).
    pub fn flipped(self) -> CompareOp {
        match self {
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Ge => CompareOp::Le,
            other => other,
        }
    }

    /// True for operators that admit the bound value itself.
    pub fn is_inclusive(self) -> bool {
        matches!(self, CompareOp::Eq | CompareOp::Le | CompareOp::Ge | CompareOp::In)
    }

    /// True for operators that constrain the value from below.
    pub fn has_lower_bound(self) -> bool {
        matches!(self, CompareOp::Eq | CompareOp::Gt | CompareOp::Ge | CompareOp::In)
    }
}

/// One side of a comparison: an attribute access on a bound variable, or a
/// constant value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Attribute { variable: String, path: String },
    Constant(Bson),
}

impl Operand {
    pub fn attribute(variable: impl Into<String>, path: impl Into<String>) -> Operand {
        Operand::Attribute {
            variable: variable.into(),
            path: path.into(),
        }
    }

    pub fn constant(value: impl Into<Bson>) -> Operand {
        Operand::Constant(value.into())
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Operand::Constant(_))
    }

    pub fn as_constant(&self) -> Option<&Bson> {
        match self {
            Operand::Constant(value) => Some(value),
            Operand::Attribute { .. } => None,
        }
    }

    pub fn as_attribute(&self) -> Option<(&str, &str)> {
        match self {
            Operand::Attribute { variable, path } => Some((variable, path)),
            Operand::Constant(_) => None,
        }
    }
}

/// A single binary comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub op: CompareOp,
    pub lhs: Operand,
    pub rhs: Operand,
}

impl Comparison {
    pub fn new(lhs: Operand, op: CompareOp, rhs: Operand) -> Comparison {
        Comparison { op, lhs, rhs }
    }

    /// View the comparison with the attribute access on the left.
    ///
    /// Returns `(variable, path, op, constant)`, flipping the operator when
    /// the attribute sits on the right. `None` if both sides are constants,
    /// both are attribute accesses, or neither side is an attribute.
    pub fn attribute_and_constant(&self) -> Option<(&str, &str, CompareOp, &Bson)> {
        match (&self.lhs, &self.rhs) {
            (Operand::Attribute { variable, path }, Operand::Constant(value)) => {
                Some((variable, path, self.op, value))
            }
            (Operand::Constant(value), Operand::Attribute { variable, path }) => {
                Some((variable, path, self.op.flipped(), value))
            }
            _ => None,
        }
    }
}

/// A conjunction of comparisons: one branch of the DNF root.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AndClause {
    pub comparisons: Vec<Comparison>,
}

impl AndClause {
    pub fn new(comparisons: Vec<Comparison>) -> AndClause {
        AndClause { comparisons }
    }

    pub fn single(comparison: Comparison) -> AndClause {
        AndClause {
            comparisons: vec![comparison],
        }
    }

    /// The sole comparison, when the clause holds exactly one.
    pub fn sole_comparison(&self) -> Option<&Comparison> {
        match self.comparisons.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    /// True when every comparison is a plain equality on the given variable.
    pub fn is_all_equality(&self, variable: &str) -> bool {
        !self.comparisons.is_empty()
            && self.comparisons.iter().all(|cmp| {
                cmp.attribute_and_constant()
                    .is_some_and(|(var, _, op, _)| var == variable && op == CompareOp::Eq)
            })
    }

    /// Find the comparison constraining `path`, if any, attribute-side first.
    pub fn comparison_for(&self, variable: &str, path: &str) -> Option<(CompareOp, &Bson)> {
        self.comparisons
            .iter()
            .filter_map(|cmp| cmp.attribute_and_constant())
            .find(|(var, p, _, _)| *var == variable && *p == path)
            .map(|(_, _, op, value)| (op, value))
    }
}

/// A filter in disjunctive normal form: an outer OR of inner ANDs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Condition {
    pub clauses: Vec<AndClause>,
}

impl Condition {
    pub fn new(clauses: Vec<AndClause>) -> Condition {
        Condition { clauses }
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}
