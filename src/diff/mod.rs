//! Snapshot diffing.
//!
//! `diff(old, new)` yields a [`Patch`] such that `apply(old, &diff(old, new))`
//! equals `new`. Containers of the same kind are compared structurally and
//! produce path-addressed ops; anything else (scalars, or a mapping replaced
//! by a sequence, etc.) degrades to a single root replacement.
//!
//! Sequences are compared index by index: shared indices are diffed in place,
//! extra trailing items are added in ascending order or removed in descending
//! order. Mapping keys are visited in sorted order so the op sequence depends
//! only on the values, not on how they were built.

pub mod patch;
pub mod pointer;

pub use patch::{apply, apply_in_place, Patch, PatchOp};

use serde_json::{Map, Value};

/// Compute the patch that turns `old` into `new`.
pub fn compute_patch(old: &Value, new: &Value) -> Patch {
    if old == new {
        return Patch::default();
    }

    match (old, new) {
        (Value::Object(_), Value::Object(_)) | (Value::Array(_), Value::Array(_)) => {
            let mut ops = Vec::new();
            diff_into("", old, new, &mut ops);
            Patch::new(ops)
        }
        _ => Patch::full(new.clone()),
    }
}

/// Alias kept short for call sites that read as `diff(old, new)`.
pub fn diff(old: &Value, new: &Value) -> Patch {
    compute_patch(old, new)
}

fn diff_into(path: &str, old: &Value, new: &Value, ops: &mut Vec<PatchOp>) {
    if old == new {
        return;
    }

    match (old, new) {
        (Value::Object(a), Value::Object(b)) => diff_objects(path, a, b, ops),
        (Value::Array(a), Value::Array(b)) => diff_arrays(path, a, b, ops),
        _ => ops.push(PatchOp::Replace {
            path: path.to_string(),
            value: new.clone(),
        }),
    }
}

fn diff_objects(path: &str, old: &Map<String, Value>, new: &Map<String, Value>, ops: &mut Vec<PatchOp>) {
    let mut removed: Vec<&String> = old.keys().filter(|k| !new.contains_key(*k)).collect();
    removed.sort();
    for key in removed {
        ops.push(PatchOp::Remove {
            path: pointer::child(path, key),
        });
    }

    let mut keys: Vec<&String> = new.keys().collect();
    keys.sort();
    for key in keys {
        let value = &new[key.as_str()];
        match old.get(key.as_str()) {
            Some(previous) => diff_into(&pointer::child(path, key), previous, value, ops),
            None => ops.push(PatchOp::Add {
                path: pointer::child(path, key),
                value: value.clone(),
            }),
        }
    }
}

fn diff_arrays(path: &str, old: &[Value], new: &[Value], ops: &mut Vec<PatchOp>) {
    let shared = old.len().min(new.len());

    for (index, (a, b)) in old.iter().zip(new.iter()).enumerate() {
        diff_into(&pointer::child(path, &index.to_string()), a, b, ops);
    }

    for (index, value) in new.iter().enumerate().skip(shared) {
        ops.push(PatchOp::Add {
            path: pointer::child(path, &index.to_string()),
            value: value.clone(),
        });
    }

    for index in (shared..old.len()).rev() {
        ops.push(PatchOp::Remove {
            path: pointer::child(path, &index.to_string()),
        });
    }
}
