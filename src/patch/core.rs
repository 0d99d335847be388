use serde_json::Value;

use super::pointer;
use super::types::PatchOperation;
use crate::errors::{RepoError, Result};

/// Applies `ops` in order. Either every operation succeeds or `target` is left untouched.
///
/// # Errors
/// `PatchTestFailed` when a `test` op does not match; `InvalidPatch` for
/// malformed or missing paths.
pub fn apply(target: &mut Value, ops: &[PatchOperation]) -> Result<()> {
    let mut working = target.clone();
    for op in ops {
        apply_one(&mut working, op)?;
    }
    *target = working;
    Ok(())
}

fn apply_one(doc: &mut Value, op: &PatchOperation) -> Result<()> {
    match op {
        PatchOperation::Add { path, value } => pointer::add(doc, path, value.clone()),
        PatchOperation::Remove { path } => pointer::remove(doc, path).map(drop),
        PatchOperation::Replace { path, value } => pointer::replace(doc, path, value.clone()),
        PatchOperation::Move { from, path } => {
            if from == path {
                return pointer::get(doc, from).map(drop);
            }
            if path.starts_with(&format!("{from}/")) {
                return Err(RepoError::InvalidPatch(format!("cannot move '{from}' into its own child '{path}'")));
            }
            let value = pointer::remove(doc, from)?;
            pointer::add(doc, path, value)
        }
        PatchOperation::Copy { from, path } => {
            let value = pointer::get(doc, from)?.clone();
            pointer::add(doc, path, value)
        }
        PatchOperation::Test { path, value } => match pointer::get(doc, path) {
            Ok(found) if found == value => Ok(()),
            _ => Err(RepoError::PatchTestFailed { path: path.clone() }),
        },
    }
}

/// JSON merge: objects merge key by key, `null` deletes, anything else replaces.
pub fn merge(target: &mut Value, patch: &Value) {
    let Value::Object(changes) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    if let Value::Object(map) = target {
        for (key, change) in changes {
            if change.is_null() {
                map.remove(key);
            } else {
                merge(map.entry(key.clone()).or_insert(Value::Null), change);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ordered_operations() {
        let mut doc = json!({"name": "a", "tags": ["x"], "meta": {"n": 1}});
        let ops = vec![
            PatchOperation::test("/name", "a"),
            PatchOperation::replace("/name", "b"),
            PatchOperation::add("/tags/-", "y"),
            PatchOperation::copy_to("/meta/n", "/count"),
            PatchOperation::move_to("/meta", "/info"),
            PatchOperation::remove("/tags/0"),
        ];
        apply(&mut doc, &ops).unwrap();
        assert_eq!(doc, json!({"name": "b", "tags": ["y"], "info": {"n": 1}, "count": 1}));
    }

    #[test]
    fn failed_test_leaves_target_unchanged() {
        let mut doc = json!({"name": "a"});
        let ops = vec![PatchOperation::replace("/name", "b"), PatchOperation::test("/name", "zzz")];
        let err = apply(&mut doc, &ops).unwrap_err();
        assert!(matches!(err, RepoError::PatchTestFailed { ref path } if path == "/name"));
        assert_eq!(doc, json!({"name": "a"}));
    }

    #[test]
    fn replace_root_substitutes_document() {
        let mut doc = json!({"a": 1});
        apply(&mut doc, &[PatchOperation::replace("", json!({"b": 2}))]).unwrap();
        assert_eq!(doc, json!({"b": 2}));
    }

    #[test]
    fn missing_paths_are_invalid() {
        let mut doc = json!({"a": 1});
        assert!(matches!(
            apply(&mut doc, &[PatchOperation::remove("/nope")]),
            Err(RepoError::InvalidPatch(_))
        ));
        assert!(apply(&mut doc, &[PatchOperation::move_to("/a", "/a/b")]).is_err());
    }

    #[test]
    fn merge_document() {
        let mut doc = json!({"a": {"b": 1, "c": 2}, "d": 3});
        merge(&mut doc, &json!({"a": {"c": null, "e": 4}, "d": [1]}));
        assert_eq!(doc, json!({"a": {"b": 1, "e": 4}, "d": [1]}));
    }
}
