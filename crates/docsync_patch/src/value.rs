//! Value helpers: ordering, deep equality and path-indexed access.

use crate::error::{PatchError, PatchResult};
use crate::path::{DocPath, Segment};
use serde_json::Value;
use std::cmp::Ordering;

/// Compare two JSON values for ordering.
///
/// - Both Null → Equal
/// - a is Null → Greater (nulls sort to the end)
/// - b is Null → Less
/// - Both numbers → f64 comparison (NaN treated as Equal)
/// - Both strings → lexicographic (codepoint order)
/// - Both booleans → false < true
/// - Cross-type → type rank: number(0), string(1), bool(2), other(3)
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Number(na), Value::Number(nb)) => {
            let fa = na.as_f64().unwrap_or(f64::NAN);
            let fb = nb.as_f64().unwrap_or(f64::NAN);
            fa.partial_cmp(&fb).unwrap_or(Ordering::Equal)
        }
        (Value::String(sa), Value::String(sb)) => sa.cmp(sb),
        (Value::Bool(ba), Value::Bool(bb)) => ba.cmp(bb),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Number(_) => 0,
        Value::String(_) => 1,
        Value::Bool(_) => 2,
        _ => 3,
    }
}

/// Check deep equality of two JSON values.
pub fn deep_equals(a: &Value, b: &Value) -> bool {
    a == b
}

/// Returns a name for a value's JSON type, for error messages.
pub fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Reads the value at a path, if present.
pub fn get_path<'a>(doc: &'a Value, path: &DocPath) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path.segments() {
        current = match segment {
            Segment::Key(key) => current.as_object()?.get(key)?,
            Segment::Index(index) => current.as_array()?.get(*index)?,
        };
    }
    Some(current)
}

/// Navigates to the value at a path, creating intermediate containers.
///
/// A key segment materializes an object, an index segment materializes an
/// array padded with nulls up to the index. `Null` slots along the way are
/// replaced by the container the next segment needs. Traversing into a
/// scalar is a type mismatch.
fn resolve_create<'a>(doc: &'a mut Value, path: &DocPath, segments: &[Segment]) -> PatchResult<&'a mut Value> {
    let mut current = doc;
    for (depth, segment) in segments.iter().enumerate() {
        match segment {
            Segment::Key(key) => {
                if current.is_null() {
                    *current = Value::Object(serde_json::Map::new());
                }
                let map = match current {
                    Value::Object(map) => map,
                    other => {
                        return Err(PatchError::type_mismatch(
                            partial_path(path, depth),
                            "object",
                            type_name(other),
                        ));
                    }
                };
                current = map.entry(key.clone()).or_insert(Value::Null);
            }
            Segment::Index(index) => {
                if current.is_null() {
                    *current = Value::Array(Vec::new());
                }
                let array = match current {
                    Value::Array(array) => array,
                    other => {
                        return Err(PatchError::type_mismatch(
                            partial_path(path, depth),
                            "array",
                            type_name(other),
                        ));
                    }
                };
                if array.len() <= *index {
                    array.resize(*index + 1, Value::Null);
                }
                current = &mut array[*index];
            }
        }
    }
    Ok(current)
}

fn partial_path(path: &DocPath, depth: usize) -> String {
    let prefix = DocPathPrefix {
        path,
        len: depth + 1,
    };
    prefix.to_string()
}

struct DocPathPrefix<'a> {
    path: &'a DocPath,
    len: usize,
}

impl std::fmt::Display for DocPathPrefix<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, segment) in self.path.segments().iter().take(self.len).enumerate() {
            match segment {
                Segment::Key(key) => {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{key}")?;
                }
                Segment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

/// Writes `value` at `path`, creating intermediate containers as needed.
pub fn set_path(doc: &mut Value, path: &DocPath, value: Value) -> PatchResult<()> {
    let slot = resolve_create(doc, path, path.segments())?;
    *slot = value;
    Ok(())
}

/// Returns a mutable reference to the slot at `path`, creating
/// intermediate containers (and the slot itself, as `Null`) as needed.
pub fn slot_mut<'a>(doc: &'a mut Value, path: &DocPath) -> PatchResult<&'a mut Value> {
    resolve_create(doc, path, path.segments())
}

/// Returns a mutable reference to the existing value at `path`, without
/// creating anything along the way.
pub fn get_path_mut<'a>(doc: &'a mut Value, path: &DocPath) -> Option<&'a mut Value> {
    let mut current = doc;
    for segment in path.segments() {
        current = match segment {
            Segment::Key(key) => current.as_object_mut()?.get_mut(key)?,
            Segment::Index(index) => current.as_array_mut()?.get_mut(*index)?,
        };
    }
    Some(current)
}

/// Returns a mutable reference to the parent container of `path`, without
/// creating anything. `None` when any ancestor is missing.
pub fn parent_mut<'a>(doc: &'a mut Value, path: &DocPath) -> Option<&'a mut Value> {
    let (parents, _) = path.split_leaf();
    let mut current = doc;
    for segment in parents {
        current = match segment {
            Segment::Key(key) => current.as_object_mut()?.get_mut(key)?,
            Segment::Index(index) => current.as_array_mut()?.get_mut(*index)?,
        };
    }
    Some(current)
}

/// Removes the value at `path`.
///
/// In an object parent the key is deleted; in an array parent the slot is
/// nulled so sibling indexes stay stable. Missing paths are a no-op.
pub fn unset_path(doc: &mut Value, path: &DocPath) {
    let (_, leaf) = path.split_leaf();
    let Some(parent) = parent_mut(doc, path) else {
        return;
    };
    match (parent, leaf) {
        (Value::Object(map), Segment::Key(key)) => {
            map.remove(key);
        }
        (Value::Array(array), Segment::Index(index)) => {
            if let Some(slot) = array.get_mut(*index) {
                *slot = Value::Null;
            }
        }
        _ => {}
    }
}
