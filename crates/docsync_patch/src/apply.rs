//! Applying normalized update operations to documents.

use crate::error::{PatchError, PatchResult};
use crate::operation::{Operator, UpdateOperation, UpdateStep};
use crate::path::{DocPath, Segment};
use crate::value::{
    compare_values, deep_equals, get_path, parent_mut, set_path, slot_mut, type_name, unset_path,
};
use serde_json::{Number, Value};
use std::cmp::Ordering;

/// The reserved key marking a typed sub-object, used by `$restore`.
pub const TYPE_TAG: &str = "_type";

/// Applies a normalized operation to a document, returning a new document.
///
/// The input is never mutated. `$restore` steps see the pre-patch document
/// when recovering type tags, regardless of their position in the input.
pub fn apply(doc: &Value, operation: &UpdateOperation) -> PatchResult<Value> {
    let mut out = doc.clone();
    for step in operation.steps() {
        apply_step(&mut out, doc, step)?;
    }
    Ok(out)
}

/// Folds a sequence of operations over a document, in order.
pub fn apply_all<'a, I>(doc: &Value, operations: I) -> PatchResult<Value>
where
    I: IntoIterator<Item = &'a UpdateOperation>,
{
    let mut out = doc.clone();
    for operation in operations {
        out = apply(&out, operation)?;
    }
    Ok(out)
}

fn apply_step(out: &mut Value, original: &Value, step: &UpdateStep) -> PatchResult<()> {
    for (path, arg) in &step.args {
        match step.op {
            Operator::Set => set_path(out, path, arg.clone())?,
            Operator::Inc => apply_arith(out, path, arg, Operator::Inc)?,
            Operator::Mul => apply_arith(out, path, arg, Operator::Mul)?,
            Operator::Min => apply_min_max(out, path, arg, Ordering::Less)?,
            Operator::Max => apply_min_max(out, path, arg, Ordering::Greater)?,
            Operator::AddToSet => apply_add_to_set(out, path, arg)?,
            Operator::Pop => apply_pop(out, path, arg)?,
            Operator::Pull => apply_pull(out, path, arg)?,
            Operator::Push => apply_push(out, path, arg)?,
            Operator::CurrentDate => apply_current_date(out, path, arg)?,
            Operator::Bit => apply_bit(out, path, arg)?,
            Operator::Unset => unset_path(out, path),
            Operator::Rename => apply_rename(out, path, arg)?,
            Operator::Restore => apply_restore(out, original, path, arg),
        }
    }
    Ok(())
}

fn numeric<'a>(value: &'a Value, op: Operator, path: &DocPath) -> PatchResult<&'a Number> {
    match value {
        Value::Number(n) => Ok(n),
        Value::Null => Err(PatchError::NullOperand {
            op: op.name(),
            path: path.to_string(),
        }),
        other => Err(PatchError::type_mismatch(
            path.to_string(),
            "number",
            type_name(other),
        )),
    }
}

fn combine_numbers(current: &Number, operand: &Number, op: Operator) -> Value {
    // Integer arithmetic is preserved when both sides are integral.
    if let (Some(a), Some(b)) = (current.as_i64(), operand.as_i64()) {
        let combined = match op {
            Operator::Inc => a.wrapping_add(b),
            _ => a.wrapping_mul(b),
        };
        return Value::Number(Number::from(combined));
    }
    let a = current.as_f64().unwrap_or(f64::NAN);
    let b = operand.as_f64().unwrap_or(f64::NAN);
    let combined = match op {
        Operator::Inc => a + b,
        _ => a * b,
    };
    Number::from_f64(combined).map(Value::Number).unwrap_or(Value::Null)
}

fn apply_arith(out: &mut Value, path: &DocPath, arg: &Value, op: Operator) -> PatchResult<()> {
    let operand = numeric(arg, op, path)?.clone();
    let current = match get_path(out, path) {
        Some(value) => numeric(value, op, path)?.clone(),
        None => {
            return Err(PatchError::NullOperand {
                op: op.name(),
                path: path.to_string(),
            });
        }
    };
    set_path(out, path, combine_numbers(&current, &operand, op))
}

fn apply_min_max(out: &mut Value, path: &DocPath, arg: &Value, wanted: Ordering) -> PatchResult<()> {
    let replace = match get_path(out, path) {
        Some(Value::Null) | None => true,
        Some(current) => compare_values(arg, current) == wanted,
    };
    if replace {
        set_path(out, path, arg.clone())?;
    }
    Ok(())
}

fn each_list<'a>(arg: &'a Value, op: Operator, path: &DocPath) -> PatchResult<&'a Vec<Value>> {
    arg.get("$each")
        .and_then(Value::as_array)
        .ok_or_else(|| PatchError::invalid_argument(op.name(), path.to_string(), "missing $each"))
}

fn array_slot<'a>(out: &'a mut Value, path: &DocPath, op: Operator) -> PatchResult<&'a mut Vec<Value>> {
    let slot = slot_mut(out, path)?;
    if slot.is_null() {
        *slot = Value::Array(Vec::new());
    }
    match slot {
        Value::Array(array) => Ok(array),
        other => Err(PatchError::invalid_argument(
            op.name(),
            path.to_string(),
            format!("field is a {}, not an array", type_name(other)),
        )),
    }
}

fn apply_add_to_set(out: &mut Value, path: &DocPath, arg: &Value) -> PatchResult<()> {
    let elements = each_list(arg, Operator::AddToSet, path)?.clone();
    let array = array_slot(out, path, Operator::AddToSet)?;
    for element in elements {
        if !array.iter().any(|existing| deep_equals(existing, &element)) {
            array.push(element);
        }
    }
    Ok(())
}

fn apply_pop(out: &mut Value, path: &DocPath, arg: &Value) -> PatchResult<()> {
    let from_end = arg.as_i64() == Some(1);
    let array = array_slot(out, path, Operator::Pop)?;
    if array.is_empty() {
        return Ok(());
    }
    if from_end {
        array.pop();
    } else {
        array.remove(0);
    }
    Ok(())
}

fn apply_pull(out: &mut Value, path: &DocPath, arg: &Value) -> PatchResult<()> {
    // A missing path is left absent.
    let Some(existing) = get_path(out, path) else {
        return Ok(());
    };
    if !existing.is_array() {
        return Err(PatchError::invalid_argument(
            Operator::Pull.name(),
            path.to_string(),
            format!("field is a {}, not an array", type_name(existing)),
        ));
    }
    let condition = PullCondition::compile(arg, path)?;
    let array = array_slot(out, path, Operator::Pull)?;
    array.retain(|element| !condition.matches(element));
    Ok(())
}

/// A compiled `$pull` condition: a scalar predicate, or a sub-document
/// predicate matched field-by-field against object elements.
enum PullCondition {
    Scalar(Vec<ScalarPredicate>),
    SubDocument(Vec<(String, PullCondition)>),
}

enum ScalarPredicate {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Regex(regex::Regex),
}

impl PullCondition {
    fn compile(arg: &Value, path: &DocPath) -> PatchResult<Self> {
        let obj = arg.as_object().ok_or_else(|| {
            PatchError::invalid_argument(
                Operator::Pull.name(),
                path.to_string(),
                "condition must be an object",
            )
        })?;
        if obj.keys().all(|k| k.starts_with('$')) {
            let mut predicates = Vec::with_capacity(obj.len());
            for (name, operand) in obj {
                predicates.push(ScalarPredicate::compile(name, operand, path)?);
            }
            Ok(Self::Scalar(predicates))
        } else {
            let mut fields = Vec::with_capacity(obj.len());
            for (field, condition) in obj {
                if field.starts_with('$') {
                    return Err(PatchError::invalid_argument(
                        Operator::Pull.name(),
                        path.to_string(),
                        "condition mixes operators with field names",
                    ));
                }
                let compiled = if condition.as_object().is_some_and(|o| !o.is_empty()) {
                    Self::compile(condition, path)?
                } else {
                    Self::Scalar(vec![ScalarPredicate::Eq(condition.clone())])
                };
                fields.push((field.clone(), compiled));
            }
            Ok(Self::SubDocument(fields))
        }
    }

    fn matches(&self, element: &Value) -> bool {
        match self {
            Self::Scalar(predicates) => predicates.iter().all(|p| p.matches(element)),
            Self::SubDocument(fields) => {
                let Some(obj) = element.as_object() else {
                    return false;
                };
                fields.iter().all(|(field, condition)| {
                    obj.get(field).is_some_and(|value| condition.matches(value))
                })
            }
        }
    }
}

impl ScalarPredicate {
    fn compile(name: &str, operand: &Value, path: &DocPath) -> PatchResult<Self> {
        match name {
            "$eq" => Ok(Self::Eq(operand.clone())),
            "$ne" => Ok(Self::Ne(operand.clone())),
            "$gt" => Ok(Self::Gt(operand.clone())),
            "$gte" => Ok(Self::Gte(operand.clone())),
            "$lt" => Ok(Self::Lt(operand.clone())),
            "$lte" => Ok(Self::Lte(operand.clone())),
            "$in" => Ok(Self::In(list_operand(name, operand, path)?)),
            "$nin" => Ok(Self::Nin(list_operand(name, operand, path)?)),
            "$regex" => {
                let pattern = operand.as_str().ok_or_else(|| {
                    PatchError::invalid_argument(
                        Operator::Pull.name(),
                        path.to_string(),
                        "$regex expects a string pattern",
                    )
                })?;
                let compiled = regex::Regex::new(pattern).map_err(|e| PatchError::BadRegex {
                    pattern: pattern.into(),
                    message: e.to_string(),
                })?;
                Ok(Self::Regex(compiled))
            }
            other => Err(PatchError::invalid_argument(
                Operator::Pull.name(),
                path.to_string(),
                format!("unsupported condition operator {other}"),
            )),
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            Self::Eq(operand) => deep_equals(value, operand),
            Self::Ne(operand) => !deep_equals(value, operand),
            Self::Gt(operand) => ordered(value, operand) == Some(Ordering::Greater),
            Self::Gte(operand) => {
                matches!(ordered(value, operand), Some(Ordering::Greater | Ordering::Equal))
            }
            Self::Lt(operand) => ordered(value, operand) == Some(Ordering::Less),
            Self::Lte(operand) => {
                matches!(ordered(value, operand), Some(Ordering::Less | Ordering::Equal))
            }
            Self::In(options) => options.iter().any(|o| deep_equals(value, o)),
            Self::Nin(options) => !options.iter().any(|o| deep_equals(value, o)),
            Self::Regex(re) => value.as_str().is_some_and(|s| re.is_match(s)),
        }
    }
}

fn ordered(value: &Value, operand: &Value) -> Option<Ordering> {
    // Null never satisfies range comparisons.
    if value.is_null() || operand.is_null() {
        return None;
    }
    Some(compare_values(value, operand))
}

fn list_operand(name: &str, operand: &Value, path: &DocPath) -> PatchResult<Vec<Value>> {
    operand
        .as_array()
        .cloned()
        .ok_or_else(|| {
            PatchError::invalid_argument(
                Operator::Pull.name(),
                path.to_string(),
                format!("{name} expects an array"),
            )
        })
}

fn apply_push(out: &mut Value, path: &DocPath, arg: &Value) -> PatchResult<()> {
    let elements = each_list(arg, Operator::Push, path)?.clone();
    let position = arg.get("$position").and_then(Value::as_i64);
    let sort = arg.get("$sort").cloned();
    let slice = arg.get("$slice").and_then(Value::as_i64);

    let array = array_slot(out, path, Operator::Push)?;

    let mut at = match position {
        None => array.len(),
        Some(p) if p < 0 => array.len().saturating_sub(p.unsigned_abs() as usize),
        Some(p) => (p as usize).min(array.len()),
    };
    for element in elements {
        array.insert(at, element);
        at += 1;
    }

    if let Some(sort_spec) = sort {
        sort_array(array, &sort_spec, path)?;
    }

    if let Some(n) = slice {
        if n >= 0 {
            array.truncate(n as usize);
        } else {
            let keep = n.unsigned_abs() as usize;
            if array.len() > keep {
                array.drain(..array.len() - keep);
            }
        }
    }
    Ok(())
}

fn sort_array(array: &mut [Value], spec: &Value, path: &DocPath) -> PatchResult<()> {
    match spec {
        Value::Number(n) => {
            let descending = n.as_i64() == Some(-1);
            array.sort_by(|a, b| {
                let ord = compare_values(a, b);
                if descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
            Ok(())
        }
        Value::Object(fields) => {
            // Multi-key sort: earlier keys dominate.
            let keys: Vec<(String, bool)> = fields
                .iter()
                .map(|(k, v)| (k.clone(), v.as_i64() == Some(-1)))
                .collect();
            array.sort_by(|a, b| {
                for (key, descending) in &keys {
                    let av = a.get(key).unwrap_or(&Value::Null);
                    let bv = b.get(key).unwrap_or(&Value::Null);
                    let ord = compare_values(av, bv);
                    if ord != Ordering::Equal {
                        return if *descending { ord.reverse() } else { ord };
                    }
                }
                Ordering::Equal
            });
            Ok(())
        }
        _ => Err(PatchError::invalid_argument(
            Operator::Push.name(),
            path.to_string(),
            "$sort expects 1, -1 or a field map",
        )),
    }
}

fn apply_current_date(out: &mut Value, path: &DocPath, arg: &Value) -> PatchResult<()> {
    let now = chrono::Utc::now();
    let stamp = match arg.get("$type").and_then(Value::as_str) {
        Some("timestamp") => Value::Number(Number::from(now.timestamp_millis())),
        _ => Value::String(now.to_rfc3339()),
    };
    set_path(out, path, stamp)
}

fn apply_bit(out: &mut Value, path: &DocPath, arg: &Value) -> PatchResult<()> {
    // Deserialized operations skip normalization, so arguments are
    // checked here too.
    let (kind, operand) = arg
        .as_object()
        .and_then(|obj| if obj.len() == 1 { obj.iter().next() } else { None })
        .ok_or_else(|| {
            PatchError::invalid_argument(
                Operator::Bit.name(),
                path.to_string(),
                "expected exactly one of and/or/xor",
            )
        })?;
    if !matches!(kind.as_str(), "and" | "or" | "xor") {
        return Err(PatchError::invalid_argument(
            Operator::Bit.name(),
            path.to_string(),
            "expected {and|or|xor: integer}",
        ));
    }
    let operand = operand.as_i64().ok_or_else(|| {
        PatchError::invalid_argument(
            Operator::Bit.name(),
            path.to_string(),
            "expected {and|or|xor: integer}",
        )
    })?;
    let current = match get_path(out, path) {
        Some(Value::Number(n)) => n.as_i64().ok_or_else(|| {
            PatchError::type_mismatch(path.to_string(), "integer", "float")
        })?,
        Some(Value::Null) | None => 0,
        Some(other) => {
            return Err(PatchError::type_mismatch(
                path.to_string(),
                "integer",
                type_name(other),
            ));
        }
    };
    let combined = match kind.as_str() {
        "and" => current & operand,
        "or" => current | operand,
        _ => current ^ operand,
    };
    set_path(out, path, Value::Number(Number::from(combined)))
}

fn apply_rename(out: &mut Value, path: &DocPath, arg: &Value) -> PatchResult<()> {
    let new_name = arg.as_str().ok_or_else(|| {
        PatchError::invalid_argument(
            Operator::Rename.name(),
            path.to_string(),
            "expected the new field name as a string",
        )
    })?;
    let (_, leaf) = path.split_leaf();
    let Segment::Key(old_name) = leaf else {
        return Err(PatchError::RenameIntoArray {
            path: path.to_string(),
        });
    };
    let Some(parent) = parent_mut(out, path) else {
        return Ok(());
    };
    match parent {
        Value::Object(map) => {
            if let Some(value) = map.remove(old_name) {
                map.insert(new_name.to_string(), value);
            }
            Ok(())
        }
        Value::Array(_) => Err(PatchError::RenameIntoArray {
            path: path.to_string(),
        }),
        // Absent or scalar parent: nothing to move.
        _ => Ok(()),
    }
}

fn apply_restore(out: &mut Value, original: &Value, path: &DocPath, arg: &Value) {
    let tag = match arg.as_str() {
        Some(explicit) => Some(explicit.to_string()),
        None => get_path(original, path)
            .and_then(|was| was.get(TYPE_TAG))
            .and_then(Value::as_str)
            .map(str::to_string),
    };
    let Some(tag) = tag else {
        return;
    };
    // Primitives are left untouched; only objects carry a type tag.
    if let Some(Value::Object(map)) = crate::value::get_path_mut(out, path) {
        map.insert(TYPE_TAG.into(), Value::String(tag));
    }
}
