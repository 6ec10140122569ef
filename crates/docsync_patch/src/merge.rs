//! Combining queued operations.
//!
//! The sequential law is authoritative: a sequence of operations means
//! "apply them in order". [`merge_for_replay`] preserves exactly that and
//! is always correct. [`merge_for_storage`] compacts a sequence into a
//! single best-effort operation for history entries; overlapping
//! operators on the same path compact with last-writer-wins (and `$each`
//! concatenation), which matches sequential application for the common
//! workloads but is not a general equivalence. Callers that need replay
//! fidelity must use the replay form.

use crate::operation::{Operator, UpdateOperation, UpdateStep};
use crate::path::DocPath;
use serde_json::{Map, Value};

/// Returns the operations in application order, unchanged.
///
/// This is the always-correct merge: replaying the result over a document
/// is by definition equivalent to applying the inputs in sequence.
pub fn merge_for_replay(operations: &[UpdateOperation]) -> Vec<UpdateOperation> {
    operations.to_vec()
}

/// Compacts a sequence of operations into one best-effort operation.
///
/// Steps are concatenated in order, then adjacent steps collapse per
/// (operator, path): a later argument replaces an earlier one, except
/// `$push`/`$addToSet`, whose `$each` lists concatenate (later modifiers
/// win). Step order of first appearance is kept, so replaying the result
/// approximates the sequential application; `$restore` steps stay last.
pub fn merge_for_storage(operations: &[UpdateOperation]) -> UpdateOperation {
    let mut steps: Vec<UpdateStep> = Vec::new();
    let mut restores: Vec<UpdateStep> = Vec::new();

    for operation in operations {
        for step in operation.steps() {
            let bucket = if step.op == Operator::Restore {
                &mut restores
            } else {
                &mut steps
            };
            for (path, arg) in &step.args {
                merge_arg(bucket, step.op, path, arg);
            }
        }
    }

    steps.append(&mut restores);
    UpdateOperation::from_steps(steps)
}

fn merge_arg(steps: &mut Vec<UpdateStep>, op: Operator, path: &DocPath, arg: &Value) {
    if let Some(step) = steps.iter_mut().find(|s| s.op == op) {
        if let Some((_, existing)) = step.args.iter_mut().find(|(p, _)| p == path) {
            *existing = combine_args(op, existing, arg);
            return;
        }
        step.args.push((path.clone(), arg.clone()));
        return;
    }
    steps.push(UpdateStep {
        op,
        args: vec![(path.clone(), arg.clone())],
    });
}

fn combine_args(op: Operator, earlier: &Value, later: &Value) -> Value {
    match op {
        Operator::Push | Operator::AddToSet => {
            let mut each: Vec<Value> = earlier
                .get("$each")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            if let Some(more) = later.get("$each").and_then(Value::as_array) {
                each.extend(more.iter().cloned());
            }
            // Later modifiers ($position/$sort/$slice) win.
            let mut merged: Map<String, Value> = later
                .as_object()
                .cloned()
                .unwrap_or_default();
            if let Some(obj) = earlier.as_object() {
                for (key, value) in obj {
                    merged.entry(key.clone()).or_insert(value.clone());
                }
            }
            merged.insert("$each".into(), Value::Array(each));
            Value::Object(merged)
        }
        _ => later.clone(),
    }
}
