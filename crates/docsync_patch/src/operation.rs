//! Normalized update operations.
//!
//! An [`UpdateOperation`] is an ordered list of steps, each pairing one
//! operator with the document paths it touches. [`normalize`] converts the
//! raw JSON form (a bare field map, or a map of `$`-operators) into this
//! shape, expanding shorthands so every downstream consumer sees one
//! canonical encoding.

use crate::error::{PatchError, PatchResult};
use crate::path::DocPath;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// The closed set of update operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operator {
    /// Replace the value at a path.
    Set,
    /// Add to a numeric value.
    Inc,
    /// Keep the smaller of the current and given value.
    Min,
    /// Keep the larger of the current and given value.
    Max,
    /// Multiply a numeric value.
    Mul,
    /// Append elements not already present.
    AddToSet,
    /// Remove the first or last element of an array.
    Pop,
    /// Remove elements matching a condition.
    Pull,
    /// Insert elements, then optionally sort and slice.
    Push,
    /// Set a timestamp.
    CurrentDate,
    /// Bitwise and/or/xor.
    Bit,
    /// Remove a field.
    Unset,
    /// Move a value to a new key in the same parent.
    Rename,
    /// Re-tag typed substructures; always evaluated last.
    Restore,
}

impl Operator {
    /// All operators, in no particular order.
    pub const ALL: [Operator; 14] = [
        Operator::Set,
        Operator::Inc,
        Operator::Min,
        Operator::Max,
        Operator::Mul,
        Operator::AddToSet,
        Operator::Pop,
        Operator::Pull,
        Operator::Push,
        Operator::CurrentDate,
        Operator::Bit,
        Operator::Unset,
        Operator::Rename,
        Operator::Restore,
    ];

    /// The operator's `$`-prefixed name.
    pub fn name(&self) -> &'static str {
        match self {
            Operator::Set => "$set",
            Operator::Inc => "$inc",
            Operator::Min => "$min",
            Operator::Max => "$max",
            Operator::Mul => "$mul",
            Operator::AddToSet => "$addToSet",
            Operator::Pop => "$pop",
            Operator::Pull => "$pull",
            Operator::Push => "$push",
            Operator::CurrentDate => "$currentDate",
            Operator::Bit => "$bit",
            Operator::Unset => "$unset",
            Operator::Rename => "$rename",
            Operator::Restore => "$restore",
        }
    }

    /// Parses an operator name. Unknown names are a hard error, not a no-op.
    pub fn parse(name: &str) -> PatchResult<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.name() == name)
            .ok_or_else(|| PatchError::unknown_operator(name))
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One operator applied to a set of paths.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStep {
    /// The operator.
    pub op: Operator,
    /// `(path, argument)` pairs, in input order.
    pub args: Vec<(DocPath, Value)>,
}

/// A normalized update operation: an ordered list of steps.
///
/// Serializes as a JSON array of single-operator maps, preserving step
/// order (`$restore` steps always sort to the end during normalization).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateOperation {
    steps: Vec<UpdateStep>,
}

impl UpdateOperation {
    /// Creates an operation from pre-normalized steps.
    pub fn from_steps(steps: Vec<UpdateStep>) -> Self {
        Self { steps }
    }

    /// The steps, in application order.
    pub fn steps(&self) -> &[UpdateStep] {
        &self.steps
    }

    /// Returns true if the operation has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Serializes the operation to its JSON string form, the encoding
    /// version history stores.
    pub fn to_json_string(&self) -> PatchResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses an operation from its JSON string form.
    pub fn parse_json(raw: &str) -> PatchResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

impl Serialize for UpdateStep {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut args = Map::new();
        for (path, value) in &self.args {
            args.insert(path.to_string(), value.clone());
        }
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.op.name(), &Value::Object(args))?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for UpdateStep {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct StepVisitor;

        impl<'de> Visitor<'de> for StepVisitor {
            type Value = UpdateStep;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a single-operator map")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let (name, raw_args): (String, Map<String, Value>) = access
                    .next_entry()?
                    .ok_or_else(|| de::Error::custom("empty update step"))?;
                if access.next_entry::<String, Value>()?.is_some() {
                    return Err(de::Error::custom("update step must hold one operator"));
                }
                let op = Operator::parse(&name).map_err(de::Error::custom)?;
                let mut args = Vec::with_capacity(raw_args.len());
                for (raw_path, value) in raw_args {
                    let path = DocPath::parse(&raw_path).map_err(de::Error::custom)?;
                    args.push((path, value));
                }
                Ok(UpdateStep { op, args })
            }
        }

        deserializer.deserialize_map(StepVisitor)
    }
}

impl Serialize for UpdateOperation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.steps.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for UpdateOperation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let steps = Vec::<UpdateStep>::deserialize(deserializer)?;
        Ok(Self { steps })
    }
}

/// Normalizes a raw update document into an [`UpdateOperation`].
///
/// A bare field map becomes a single `$set` step. Operator maps keep their
/// (deterministic) key order, except `$restore`, which always moves to the
/// end. Shorthand forms expand:
///
/// - `$push: {p: v}` → `$push: {p: {$each: [v]}}` (same for `$addToSet`)
/// - `$pull: {p: v}` with a non-predicate `v` → `$pull: {p: {$eq: v}}`
/// - `$currentDate: {p: true}` → `$currentDate: {p: {$type: "date"}}`
pub fn normalize(raw: &Value) -> PatchResult<UpdateOperation> {
    let map = raw
        .as_object()
        .ok_or_else(|| PatchError::not_an_object("update operation"))?;

    let operator_keys = map.keys().filter(|k| k.starts_with('$')).count();
    if operator_keys == 0 {
        // Implicit $set.
        let mut args = Vec::with_capacity(map.len());
        for (raw_path, value) in map {
            args.push((DocPath::parse(raw_path)?, value.clone()));
        }
        return Ok(UpdateOperation::from_steps(vec![UpdateStep {
            op: Operator::Set,
            args,
        }]));
    }
    if operator_keys != map.len() {
        return Err(PatchError::MixedOperation);
    }

    let mut steps = Vec::with_capacity(map.len());
    let mut restore_steps = Vec::new();
    for (name, raw_args) in map {
        let op = Operator::parse(name)?;
        let arg_map = raw_args
            .as_object()
            .ok_or_else(|| PatchError::not_an_object(format!("{name} arguments")))?;
        let mut args = Vec::with_capacity(arg_map.len());
        for (raw_path, value) in arg_map {
            let path = DocPath::parse(raw_path)?;
            let value = normalize_arg(op, &path, value)?;
            args.push((path, value));
        }
        let step = UpdateStep { op, args };
        if op == Operator::Restore {
            restore_steps.push(step);
        } else {
            steps.push(step);
        }
    }
    steps.append(&mut restore_steps);
    Ok(UpdateOperation::from_steps(steps))
}

/// Returns true if `value` is a non-empty object where all keys start with `$`.
pub fn is_operator_object(value: &Value) -> bool {
    match value.as_object() {
        Some(obj) if !obj.is_empty() => obj.keys().all(|k| k.starts_with('$')),
        _ => false,
    }
}

fn normalize_arg(op: Operator, path: &DocPath, value: &Value) -> PatchResult<Value> {
    match op {
        Operator::Push | Operator::AddToSet => {
            if let Some(obj) = value.as_object() {
                if obj.contains_key("$each") {
                    let each = &obj["$each"];
                    if !each.is_array() {
                        return Err(PatchError::invalid_argument(
                            op.name(),
                            path.to_string(),
                            "$each must be an array",
                        ));
                    }
                    for key in obj.keys() {
                        match key.as_str() {
                            "$each" => {}
                            "$position" | "$sort" | "$slice" if op == Operator::Push => {}
                            other => {
                                return Err(PatchError::invalid_argument(
                                    op.name(),
                                    path.to_string(),
                                    format!("unsupported modifier {other}"),
                                ));
                            }
                        }
                    }
                    return Ok(value.clone());
                }
            }
            let mut wrapped = Map::new();
            wrapped.insert("$each".into(), Value::Array(vec![value.clone()]));
            Ok(Value::Object(wrapped))
        }
        Operator::Pull => {
            if value.as_object().is_some_and(|obj| !obj.is_empty()) {
                // Predicate or sub-document condition: kept as-is.
                Ok(value.clone())
            } else {
                let mut wrapped = Map::new();
                wrapped.insert("$eq".into(), value.clone());
                Ok(Value::Object(wrapped))
            }
        }
        Operator::Pop => {
            if value.is_number() {
                Ok(value.clone())
            } else {
                Err(PatchError::invalid_argument(
                    op.name(),
                    path.to_string(),
                    "expected 1 or -1",
                ))
            }
        }
        Operator::Inc | Operator::Mul => {
            if value.is_number() {
                Ok(value.clone())
            } else {
                Err(PatchError::invalid_argument(
                    op.name(),
                    path.to_string(),
                    "expected a number",
                ))
            }
        }
        Operator::CurrentDate => match value {
            Value::Bool(true) => {
                let mut wrapped = Map::new();
                wrapped.insert("$type".into(), Value::String("date".into()));
                Ok(Value::Object(wrapped))
            }
            Value::Object(obj) => match obj.get("$type").and_then(Value::as_str) {
                Some("date") | Some("timestamp") => Ok(value.clone()),
                _ => Err(PatchError::invalid_argument(
                    op.name(),
                    path.to_string(),
                    "expected true or {$type: \"date\"|\"timestamp\"}",
                )),
            },
            _ => Err(PatchError::invalid_argument(
                op.name(),
                path.to_string(),
                "expected true or {$type: \"date\"|\"timestamp\"}",
            )),
        },
        Operator::Bit => {
            let obj = value.as_object().ok_or_else(|| {
                PatchError::invalid_argument(op.name(), path.to_string(), "expected an object")
            })?;
            if obj.len() != 1 {
                return Err(PatchError::invalid_argument(
                    op.name(),
                    path.to_string(),
                    "expected exactly one of and/or/xor",
                ));
            }
            let (kind, operand) = obj.iter().next().expect("len checked above");
            if !matches!(kind.as_str(), "and" | "or" | "xor") || operand.as_i64().is_none() {
                return Err(PatchError::invalid_argument(
                    op.name(),
                    path.to_string(),
                    "expected {and|or|xor: integer}",
                ));
            }
            Ok(value.clone())
        }
        Operator::Rename => {
            if value.is_string() {
                Ok(value.clone())
            } else {
                Err(PatchError::invalid_argument(
                    op.name(),
                    path.to_string(),
                    "expected the new field name as a string",
                ))
            }
        }
        Operator::Set | Operator::Min | Operator::Max | Operator::Unset | Operator::Restore => {
            Ok(value.clone())
        }
    }
}
