//! Structural diff of snapshot payloads
//!
//! Keys only on the left produce `remove`, keys only on the right produce
//! `add`, keys present on both sides whose values are both maps are
//! compared recursively, and any other unequal pair produces `modify`.

use mystic_core::Value;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Map;

/// Kind of change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffOp {
    /// Key added on the right
    Add,
    /// Key removed from the left
    Remove,
    /// Value changed
    Modify,
}

/// A single change between two payloads
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateDiff {
    /// Kind of change
    pub operation: DiffOp,
    /// Key path, rendered dot-separated
    #[serde(serialize_with = "join_path")]
    pub path: Vec<String>,
    /// Value on the left, if any
    pub old_value: Option<Value>,
    /// Value on the right, if any
    pub new_value: Option<Value>,
}

fn join_path<S: Serializer>(path: &[String], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&path.join("."))
}

impl StateDiff {
    /// Dot-separated path
    #[must_use]
    pub fn dotted_path(&self) -> String {
        self.path.join(".")
    }
}

/// Diff two payloads
#[must_use]
pub fn diff_maps(left: &Map<String, Value>, right: &Map<String, Value>) -> Vec<StateDiff> {
    let mut diffs = Vec::new();
    collect(left, right, &mut Vec::new(), &mut diffs);
    diffs
}

fn collect(
    left: &Map<String, Value>,
    right: &Map<String, Value>,
    prefix: &mut Vec<String>,
    out: &mut Vec<StateDiff>,
) {
    let at = |prefix: &[String], key: &str| {
        let mut path = prefix.to_vec();
        path.push(key.to_string());
        path
    };

    for (key, old) in left {
        if !right.contains_key(key) {
            out.push(StateDiff {
                operation: DiffOp::Remove,
                path: at(prefix, key),
                old_value: Some(old.clone()),
                new_value: None,
            });
        }
    }

    for (key, new) in right {
        if !left.contains_key(key) {
            out.push(StateDiff {
                operation: DiffOp::Add,
                path: at(prefix, key),
                old_value: None,
                new_value: Some(new.clone()),
            });
        }
    }

    for (key, old) in left {
        let Some(new) = right.get(key) else {
            continue;
        };
        match (old, new) {
            (Value::Object(old_map), Value::Object(new_map)) => {
                prefix.push(key.clone());
                collect(old_map, new_map, prefix, out);
                prefix.pop();
            }
            _ if old != new => out.push(StateDiff {
                operation: DiffOp::Modify,
                path: at(prefix, key),
                old_value: Some(old.clone()),
                new_value: Some(new.clone()),
            }),
            _ => {}
        }
    }
}

/// Undo `diffs` on `target`, turning the right-hand payload back into the
/// left-hand one
pub fn apply_inverse(target: &mut Map<String, Value>, diffs: &[StateDiff]) {
    for diff in diffs.iter().rev() {
        let Some((last, parents)) = diff.path.split_last() else {
            continue;
        };
        let Some(parent) = descend(target, parents) else {
            tracing::debug!(path = %diff.dotted_path(), "diff path no longer exists");
            continue;
        };
        match diff.operation {
            DiffOp::Add => {
                parent.remove(last);
            }
            DiffOp::Remove | DiffOp::Modify => {
                if let Some(old) = &diff.old_value {
                    parent.insert(last.clone(), old.clone());
                }
            }
        }
    }
}

fn descend<'a>(
    mut map: &'a mut Map<String, Value>,
    path: &[String],
) -> Option<&'a mut Map<String, Value>> {
    for key in path {
        map = map.get_mut(key)?.as_object_mut()?;
    }
    Some(map)
}
