//! Patch operations and their application.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::pointer;
use crate::error::PatchError;

/// One structural edit addressed by a JSON pointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOp {
    Add { path: String, value: Value },
    Remove { path: String },
    Replace { path: String, value: Value },
}

impl PatchOp {
    pub fn path(&self) -> &str {
        match self {
            PatchOp::Add { path, .. } | PatchOp::Remove { path } | PatchOp::Replace { path, .. } => {
                path
            }
        }
    }
}

/// An ordered list of ops. Empty means "no observable change".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch(Vec<PatchOp>);

impl Patch {
    pub fn new(ops: Vec<PatchOp>) -> Self {
        Self(ops)
    }

    /// A patch that discards the old snapshot and installs `value`.
    pub fn full(value: Value) -> Self {
        Self(vec![PatchOp::Replace {
            path: String::new(),
            value,
        }])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn ops(&self) -> &[PatchOp] {
        &self.0
    }

    pub fn into_ops(self) -> Vec<PatchOp> {
        self.0
    }

    /// The replacement value when this patch is a single root replace.
    pub fn as_full_replacement(&self) -> Option<&Value> {
        match self.0.as_slice() {
            [PatchOp::Replace { path, value }] if path.is_empty() => Some(value),
            _ => None,
        }
    }
}

/// Replay `patch` onto a copy of `old`. `old` is untouched on failure.
pub fn apply(old: &Value, patch: &Patch) -> Result<Value, PatchError> {
    if let Some(value) = patch.as_full_replacement() {
        return Ok(value.clone());
    }
    let mut next = old.clone();
    apply_in_place(&mut next, patch)?;
    Ok(next)
}

/// Replay `patch` onto `target`. On failure `target` may be partially patched.
pub fn apply_in_place(target: &mut Value, patch: &Patch) -> Result<(), PatchError> {
    for op in patch.ops() {
        apply_op(target, op)?;
    }
    Ok(())
}

fn apply_op(root: &mut Value, op: &PatchOp) -> Result<(), PatchError> {
    let path = op.path();
    let mut tokens = pointer::parse(path)?;

    let Some(last) = tokens.pop() else {
        *root = match op {
            PatchOp::Add { value, .. } | PatchOp::Replace { value, .. } => value.clone(),
            PatchOp::Remove { .. } => Value::Null,
        };
        return Ok(());
    };

    let mut parent = root;
    for token in &tokens {
        parent = descend(parent, token, path)?;
    }

    match (parent, op) {
        (Value::Object(map), PatchOp::Add { value, .. }) => {
            map.insert(last, value.clone());
        }
        (Value::Object(map), PatchOp::Replace { value, .. }) => {
            let slot = map
                .get_mut(&last)
                .ok_or_else(|| PatchError::MissingPath(path.to_string()))?;
            *slot = value.clone();
        }
        (Value::Object(map), PatchOp::Remove { .. }) => {
            map.remove(&last)
                .ok_or_else(|| PatchError::MissingPath(path.to_string()))?;
        }
        (Value::Array(items), PatchOp::Add { value, .. }) => {
            let index = if last == "-" {
                items.len()
            } else {
                parse_index(&last, path, items.len() + 1)?
            };
            items.insert(index, value.clone());
        }
        (Value::Array(items), PatchOp::Replace { value, .. }) => {
            let index = parse_index(&last, path, items.len())?;
            items[index] = value.clone();
        }
        (Value::Array(items), PatchOp::Remove { .. }) => {
            let index = parse_index(&last, path, items.len())?;
            items.remove(index);
        }
        _ => return Err(PatchError::NotContainer(path.to_string())),
    }

    Ok(())
}

fn descend<'a>(value: &'a mut Value, token: &str, path: &str) -> Result<&'a mut Value, PatchError> {
    match value {
        Value::Object(map) => map
            .get_mut(token)
            .ok_or_else(|| PatchError::MissingPath(path.to_string())),
        Value::Array(items) => {
            let index = parse_index(token, path, items.len())?;
            Ok(&mut items[index])
        }
        _ => Err(PatchError::NotContainer(path.to_string())),
    }
}

/// Parse an array index that must be strictly below `bound`.
fn parse_index(token: &str, path: &str, bound: usize) -> Result<usize, PatchError> {
    // RFC 6901 forbids leading zeros.
    if token.len() > 1 && token.starts_with('0') {
        return Err(PatchError::bad_index(token, path));
    }
    match token.parse::<usize>() {
        Ok(index) if index < bound => Ok(index),
        _ => Err(PatchError::bad_index(token, path)),
    }
}
