use serde::{Deserialize, Serialize};

/// One attribute of a sort condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    pub variable: String,
    pub path: String,
    pub ascending: bool,
}

/// An ordered list of sort attributes over one bound variable.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SortCondition {
    pub fields: Vec<SortField>,
}

impl SortCondition {
    pub fn new(fields: Vec<SortField>) -> SortCondition {
        SortCondition { fields }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// True when all fields sort in the same direction. Only unidirectional
    /// sorts can be pushed into an index scan.
    pub fn is_unidirectional(&self) -> bool {
        self.fields
            .windows(2)
            .all(|pair| pair[0].ascending == pair[1].ascending)
    }

    /// Direction of a unidirectional sort; empty sorts count as ascending.
    pub fn is_ascending(&self) -> bool {
        self.fields.first().map(|f| f.ascending).unwrap_or(true)
    }

    /// How many leading sort attributes line up with the given index
    /// fields, in order.
    pub fn covered_attributes(&self, variable: &str, index_fields: &[String]) -> usize {
        self.fields
            .iter()
            .zip(index_fields.iter())
            .take_while(|(sort_field, index_field)| {
                sort_field.variable == variable && &sort_field.path == *index_field
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(path: &str, ascending: bool) -> SortField {
        SortField {
            variable: "doc".into(),
            path: path.into(),
            ascending,
        }
    }

    #[test]
    fn unidirectional_detection() {
        let same = SortCondition::new(vec![field("x", true), field("y", true)]);
        assert!(same.is_unidirectional());

        let mixed = SortCondition::new(vec![field("x", true), field("y", false)]);
        assert!(!mixed.is_unidirectional());
    }

    #[test]
    fn covered_attributes_matches_a_prefix() {
        let sort = SortCondition::new(vec![field("x", true), field("y", true)]);
        let fields = |names: &[&str]| names.iter().map(|n| n.to_string()).collect::<Vec<_>>();
        assert_eq!(sort.covered_attributes("doc", &fields(&["x", "y", "z"])), 2);
        assert_eq!(sort.covered_attributes("doc", &fields(&["x"])), 1);
        assert_eq!(sort.covered_attributes("doc", &fields(&["y", "x"])), 0);
        assert_eq!(sort.covered_attributes("other", &fields(&["x"])), 0);
    }
}
