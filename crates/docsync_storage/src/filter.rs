//! Flat predicate filter for `find`/`delete_where`.
//!
//! Deliberately not a query planner: a filter is a flat map from field
//! name to condition, every stored document is tested in turn.

use docsync_patch::{compare_values, deep_equals};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// A flat predicate over documents.
///
/// Each entry pairs a top-level field name with either a literal value
/// (deep equality) or a condition object using the scalar comparison
/// operators (`$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`,
/// `$nin`). All entries must match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Map<String, Value>,
}

impl Filter {
    /// The empty filter, matching every document.
    pub fn all() -> Self {
        Self::default()
    }

    /// Builds a filter from a raw condition map.
    pub fn from_map(conditions: Map<String, Value>) -> Self {
        Self { conditions }
    }

    /// Adds an equality condition.
    pub fn with_eq(mut self, field: impl Into<String>, value: Value) -> Self {
        self.conditions.insert(field.into(), value);
        self
    }

    /// Returns true if `document` satisfies every condition.
    pub fn matches(&self, document: &Value) -> bool {
        let Some(fields) = document.as_object() else {
            return false;
        };
        self.conditions.iter().all(|(field, condition)| {
            let value = fields.get(field).unwrap_or(&Value::Null);
            matches_condition(value, condition)
        })
    }

    /// Returns true if the filter has no conditions.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

fn matches_condition(value: &Value, condition: &Value) -> bool {
    match condition.as_object() {
        Some(obj) if !obj.is_empty() && obj.keys().all(|k| k.starts_with('$')) => {
            obj.iter().all(|(op, operand)| scalar_op(value, op, operand))
        }
        _ => deep_equals(value, condition),
    }
}

fn scalar_op(value: &Value, op: &str, operand: &Value) -> bool {
    match op {
        "$eq" => deep_equals(value, operand),
        "$ne" => !deep_equals(value, operand),
        "$gt" => ranged(value, operand) == Some(Ordering::Greater),
        "$gte" => matches!(ranged(value, operand), Some(Ordering::Greater | Ordering::Equal)),
        "$lt" => ranged(value, operand) == Some(Ordering::Less),
        "$lte" => matches!(ranged(value, operand), Some(Ordering::Less | Ordering::Equal)),
        "$in" => operand
            .as_array()
            .is_some_and(|options| options.iter().any(|o| deep_equals(value, o))),
        "$nin" => operand
            .as_array()
            .is_some_and(|options| !options.iter().any(|o| deep_equals(value, o))),
        _ => false,
    }
}

fn ranged(value: &Value, operand: &Value) -> Option<Ordering> {
    if value.is_null() || operand.is_null() {
        return None;
    }
    Some(compare_values(value, operand))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_filter_matches_everything() {
        assert!(Filter::all().matches(&json!({"a": 1})));
        assert!(Filter::all().matches(&json!({})));
    }

    #[test]
    fn equality_on_fields() {
        let filter = Filter::all().with_eq("name", json!("Jone"));
        assert!(filter.matches(&json!({"name": "Jone", "age": 3})));
        assert!(!filter.matches(&json!({"name": "John"})));
        assert!(!filter.matches(&json!({})));
    }

    #[test]
    fn comparison_conditions() {
        let filter = Filter::all().with_eq("age", json!({"$gte": 18, "$lt": 65}));
        assert!(filter.matches(&json!({"age": 30})));
        assert!(!filter.matches(&json!({"age": 70})));
        assert!(!filter.matches(&json!({"age": null})));
    }

    #[test]
    fn in_condition() {
        let filter = Filter::all().with_eq("kind", json!({"$in": ["a", "b"]}));
        assert!(filter.matches(&json!({"kind": "a"})));
        assert!(!filter.matches(&json!({"kind": "c"})));
    }

    #[test]
    fn deep_equality_on_objects() {
        let filter = Filter::all().with_eq("pos", json!({"x": 1, "y": 2}));
        assert!(filter.matches(&json!({"pos": {"x": 1, "y": 2}})));
        assert!(!filter.matches(&json!({"pos": {"x": 1}})));
    }
}
