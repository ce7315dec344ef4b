// Copyright (c) 2026 Adrian Robinson. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.

//! Diff Encoder
//!
//! Computes a minimal JSON Patch (RFC 6902 `add`/`replace`/`remove` subset)
//! describing the transition between two versions of an entity, and applies
//! such a patch to a document.
//!
//! Paths are JSON Pointers (RFC 6901). Object keys are visited in sorted
//! order, so the patch is the same whatever order the keys were enumerated in.
//!
//! # Example
//!
//! ```
//! use optimistic_cache::patch::{apply_patch, compute_diff};
//! use serde_json::json;
//!
//! let before = json!({"id": 1, "name": "Alice"});
//! let after = json!({"id": 1, "name": "Alicia"});
//!
//! let patch = compute_diff(Some(&before), Some(&after));
//! assert_eq!(patch.len(), 1);
//! assert_eq!(apply_patch(&before, &patch).unwrap(), after);
//! ```

use crate::traits::SyncError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single edit at a JSON Pointer path.
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
            PatchOp::Add { path, .. }
            | PatchOp::Remove { path }
            | PatchOp::Replace { path, .. } => path,
        }
    }
}

/// Ordered sequence of edits. Serializes as a bare JSON array.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch {
    ops: Vec<PatchOp>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn ops(&self) -> &[PatchOp] {
        &self.ops
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PatchOp> {
        self.ops.iter()
    }
}

impl From<Vec<PatchOp>> for Patch {
    fn from(ops: Vec<PatchOp>) -> Self {
        Self { ops }
    }
}

impl IntoIterator for Patch {
    type Item = PatchOp;
    type IntoIter = std::vec::IntoIter<PatchOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

impl<'a> IntoIterator for &'a Patch {
    type Item = &'a PatchOp;
    type IntoIter = std::slice::Iter<'a, PatchOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}

// ============================================================================
// Diff
// ============================================================================

/// Computes the patch that turns `original` into `updated`.
///
/// Returns an empty patch when either side is absent; whether a mutation
/// should proceed in that case is the caller's decision.
pub fn compute_diff(original: Option<&Value>, updated: Option<&Value>) -> Patch {
    let (Some(original), Some(updated)) = (original, updated) else {
        return Patch::new();
    };
    let mut ops = Vec::new();
    diff_into(&mut String::new(), original, updated, &mut ops);
    Patch { ops }
}

/// Serializes two typed entities and diffs their JSON representations.
pub fn diff_entities<T: Serialize>(
    original: Option<&T>,
    updated: Option<&T>,
) -> Result<Patch, SyncError> {
    let (Some(original), Some(updated)) = (original, updated) else {
        return Ok(Patch::new());
    };
    let original = serde_json::to_value(original).map_err(|e| SyncError::Diff(e.to_string()))?;
    let updated = serde_json::to_value(updated).map_err(|e| SyncError::Diff(e.to_string()))?;
    Ok(compute_diff(Some(&original), Some(&updated)))
}

fn diff_into(path: &mut String, old: &Value, new: &Value, ops: &mut Vec<PatchOp>) {
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => diff_objects(path, a, b, ops),
        (Value::Array(a), Value::Array(b)) => diff_arrays(path, a, b, ops),
        _ if old == new => {}
        _ => ops.push(PatchOp::Replace {
            path: path.clone(),
            value: new.clone(),
        }),
    }
}

fn diff_objects(
    path: &mut String,
    a: &Map<String, Value>,
    b: &Map<String, Value>,
    ops: &mut Vec<PatchOp>,
) {
    let mut old_keys: Vec<&String> = a.keys().collect();
    old_keys.sort();
    for key in old_keys {
        let len = push_token(path, key);
        match b.get(key) {
            Some(new_value) => diff_into(path, &a[key], new_value, ops),
            None => ops.push(PatchOp::Remove { path: path.clone() }),
        }
        path.truncate(len);
    }

    let mut added: Vec<&String> = b.keys().filter(|k| !a.contains_key(*k)).collect();
    added.sort();
    for key in added {
        let len = push_token(path, key);
        ops.push(PatchOp::Add {
            path: path.clone(),
            value: b[key].clone(),
        });
        path.truncate(len);
    }
}

fn diff_arrays(path: &mut String, a: &[Value], b: &[Value], ops: &mut Vec<PatchOp>) {
    let common = a.len().min(b.len());
    for i in 0..common {
        let len = push_token(path, &i.to_string());
        diff_into(path, &a[i], &b[i], ops);
        path.truncate(len);
    }

    // Trailing removals go highest index first so earlier indices stay valid.
    for i in (common..a.len()).rev() {
        let len = push_token(path, &i.to_string());
        ops.push(PatchOp::Remove { path: path.clone() });
        path.truncate(len);
    }
    for (i, value) in b.iter().enumerate().skip(common) {
        let len = push_token(path, &i.to_string());
        ops.push(PatchOp::Add {
            path: path.clone(),
            value: value.clone(),
        });
        path.truncate(len);
    }
}

/// Appends `/token` (escaped) and returns the length to truncate back to.
fn push_token(path: &mut String, token: &str) -> usize {
    let len = path.len();
    path.push('/');
    for c in token.chars() {
        match c {
            '~' => path.push_str("~0"),
            '/' => path.push_str("~1"),
            c => path.push(c),
        }
    }
    len
}

// ============================================================================
// Apply
// ============================================================================

/// Applies `patch` to a copy of `document`.
///
/// Fails if any operation addresses a path that does not exist (or, for
/// `add`, whose parent does not exist).
pub fn apply_patch(document: &Value, patch: &Patch) -> Result<Value, SyncError> {
    let mut doc = document.clone();
    for op in patch {
        apply_op(&mut doc, op)?;
    }
    Ok(doc)
}

fn apply_op(doc: &mut Value, op: &PatchOp) -> Result<(), SyncError> {
    let tokens = parse_pointer(op.path())?;
    let Some((last, parents)) = tokens.split_last() else {
        return match op {
            PatchOp::Add { value, .. } | PatchOp::Replace { value, .. } => {
                *doc = value.clone();
                Ok(())
            }
            PatchOp::Remove { .. } => {
                Err(SyncError::Patch("cannot remove the document root".into()))
            }
        };
    };

    let mut target = doc;
    for token in parents {
        target = match target {
            Value::Object(map) => map.get_mut(token.as_str()),
            Value::Array(items) => match array_index(token, items.len()) {
                Ok(index) => items.get_mut(index),
                Err(_) => None,
            },
            _ => None,
        }
        .ok_or_else(|| SyncError::Patch(format!("path not found: {}", op.path())))?;
    }

    match target {
        Value::Object(map) => match op {
            PatchOp::Add { value, .. } => {
                map.insert(last.clone(), value.clone());
                Ok(())
            }
            PatchOp::Replace { value, .. } => match map.get_mut(last.as_str()) {
                Some(slot) => {
                    *slot = value.clone();
                    Ok(())
                }
                None => Err(SyncError::Patch(format!("path not found: {}", op.path()))),
            },
            PatchOp::Remove { .. } => map
                .remove(last.as_str())
                .map(|_| ())
                .ok_or_else(|| SyncError::Patch(format!("path not found: {}", op.path()))),
        },
        Value::Array(items) => match op {
            PatchOp::Add { value, .. } => {
                let index = if last == "-" {
                    items.len()
                } else {
                    array_index(last, items.len() + 1)?
                };
                items.insert(index, value.clone());
                Ok(())
            }
            PatchOp::Replace { value, .. } => {
                let index = array_index(last, items.len())?;
                items[index] = value.clone();
                Ok(())
            }
            PatchOp::Remove { .. } => {
                let index = array_index(last, items.len())?;
                items.remove(index);
                Ok(())
            }
        },
        _ => Err(SyncError::Patch(format!(
            "cannot address into a scalar at {}",
            op.path()
        ))),
    }
}

fn parse_pointer(pointer: &str) -> Result<Vec<String>, SyncError> {
    if pointer.is_empty() {
        return Ok(Vec::new());
    }
    let Some(rest) = pointer.strip_prefix('/') else {
        return Err(SyncError::Patch(format!("invalid JSON pointer: {}", pointer)));
    };
    Ok(rest
        .split('/')
        .map(|token| token.replace("~1", "/").replace("~0", "~"))
        .collect())
}

/// Parses an array index token, which must be below `bound`.
fn array_index(token: &str, bound: usize) -> Result<usize, SyncError> {
    let leading_zero = token.len() > 1 && token.starts_with('0');
    match token.parse::<usize>() {
        Ok(index) if !leading_zero && index < bound => Ok(index),
        _ => Err(SyncError::Patch(format!("invalid array index: {}", token))),
    }
}
