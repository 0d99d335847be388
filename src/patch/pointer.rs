use serde_json::Value;

use crate::errors::{RepoError, Result};

/// Splits a JSON pointer into unescaped reference tokens.
pub(super) fn tokens(pointer: &str) -> Result<Vec<String>> {
    if pointer.is_empty() {
        return Ok(Vec::new());
    }
    let Some(rest) = pointer.strip_prefix('/') else {
        return Err(RepoError::InvalidPatch(format!("pointer '{pointer}' must start with '/'")));
    };
    Ok(rest.split('/').map(|t| t.replace("~1", "/").replace("~0", "~")).collect())
}

fn index(token: &str, len: usize, allow_end: bool) -> Result<usize> {
    if allow_end && token == "-" {
        return Ok(len);
    }
    let bad = || RepoError::InvalidPatch(format!("bad array index '{token}'"));
    if token.len() > 1 && token.starts_with('0') {
        return Err(bad());
    }
    let i: usize = token.parse().map_err(|_| bad())?;
    let limit = if allow_end { len } else { len.saturating_sub(1) };
    if i > limit || (!allow_end && len == 0) {
        return Err(bad());
    }
    Ok(i)
}

pub(super) fn get<'a>(target: &'a Value, pointer: &str) -> Result<&'a Value> {
    let mut cur = target;
    for t in tokens(pointer)? {
        cur = match cur {
            Value::Object(map) => map.get(&t),
            Value::Array(items) => items.get(index(&t, items.len(), false)?),
            _ => None,
        }
        .ok_or_else(|| RepoError::InvalidPatch(format!("path '{pointer}' does not exist")))?;
    }
    Ok(cur)
}

fn parent_mut<'a>(target: &'a mut Value, parents: &[String], pointer: &str) -> Result<&'a mut Value> {
    let mut cur = target;
    for t in parents {
        cur = match cur {
            Value::Object(map) => map.get_mut(t),
            Value::Array(items) => {
                let i = index(t, items.len(), false)?;
                items.get_mut(i)
            }
            _ => None,
        }
        .ok_or_else(|| RepoError::InvalidPatch(format!("parent of '{pointer}' does not exist")))?;
    }
    Ok(cur)
}

/// Inserts or replaces at `pointer`; on arrays inserts before the index (`-` appends).
pub(super) fn add(target: &mut Value, pointer: &str, value: Value) -> Result<()> {
    let mut toks = tokens(pointer)?;
    let Some(last) = toks.pop() else {
        *target = value;
        return Ok(());
    };
    match parent_mut(target, &toks, pointer)? {
        Value::Object(map) => {
            map.insert(last, value);
        }
        Value::Array(items) => {
            let i = index(&last, items.len(), true)?;
            items.insert(i, value);
        }
        _ => return Err(RepoError::InvalidPatch(format!("cannot add at '{pointer}'"))),
    }
    Ok(())
}

pub(super) fn remove(target: &mut Value, pointer: &str) -> Result<Value> {
    let mut toks = tokens(pointer)?;
    let Some(last) = toks.pop() else {
        return Err(RepoError::InvalidPatch("cannot remove the document root".into()));
    };
    let missing = || RepoError::InvalidPatch(format!("path '{pointer}' does not exist"));
    match parent_mut(target, &toks, pointer)? {
        Value::Object(map) => map.remove(&last).ok_or_else(missing),
        Value::Array(items) => {
            let i = index(&last, items.len(), false)?;
            Ok(items.remove(i))
        }
        _ => Err(missing()),
    }
}

pub(super) fn replace(target: &mut Value, pointer: &str, value: Value) -> Result<()> {
    let mut toks = tokens(pointer)?;
    let Some(last) = toks.pop() else {
        *target = value;
        return Ok(());
    };
    let slot = match parent_mut(target, &toks, pointer)? {
        Value::Object(map) => map.get_mut(&last),
        Value::Array(items) => {
            let i = index(&last, items.len(), false)?;
            items.get_mut(i)
        }
        _ => None,
    };
    let slot = slot.ok_or_else(|| RepoError::InvalidPatch(format!("path '{pointer}' does not exist")))?;
    *slot = value;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn escaped_tokens() {
        assert_eq!(tokens("/a~1b/c~0d").unwrap(), vec!["a/b", "c~d"]);
        assert!(tokens("a").is_err());
        assert!(tokens("").unwrap().is_empty());
    }

    #[test]
    fn array_indices() {
        let mut doc = json!({"xs": [1, 2]});
        add(&mut doc, "/xs/-", json!(3)).unwrap();
        add(&mut doc, "/xs/0", json!(0)).unwrap();
        assert_eq!(doc, json!({"xs": [0, 1, 2, 3]}));
        assert!(get(&doc, "/xs/01").is_err());
        assert!(get(&doc, "/xs/4").is_err());
        assert_eq!(remove(&mut doc, "/xs/1").unwrap(), json!(1));
    }
}
