//! Evaluation of compiled filters against JSON sources. Used by the in-memory
//! backend; a real search backend executes the compiled query itself.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::cmp::Ordering;

use super::types::{
    CmpOp, DateRange, FieldCondition, MAX_PATH_DEPTH, MAX_SORT_FIELDS, Order,
    SearchOperator, SearchText, SortSpec,
};

pub fn get_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() || path.len() > 1024 {
        return None;
    }
    let mut cur = doc;
    for (depth, part) in path.split('.').enumerate() {
        if depth >= MAX_PATH_DEPTH {
            return None;
        }
        cur = cur.as_object()?.get(part)?;
    }
    Some(cur)
}

pub fn eval_condition(doc: &Value, condition: &FieldCondition) -> bool {
    match condition {
        FieldCondition::Exists { field, exists } => {
            get_path(doc, field).is_some_and(|v| !v.is_null()) == *exists
        }
        FieldCondition::In { field, values } => get_path(doc, field).is_some_and(|v| {
            values.iter().any(|x| values_equal(v, x) || array_contains(v, x))
        }),
        FieldCondition::Cmp { field, op, value } => {
            let actual = get_path(doc, field);
            match op {
                CmpOp::Eq => actual.is_some_and(|v| values_equal(v, value) || array_contains(v, value)),
                CmpOp::NotEq => !actual.is_some_and(|v| values_equal(v, value) || array_contains(v, value)),
                CmpOp::Gt => actual.is_some_and(|v| compare_values(v, value) == Ordering::Greater),
                CmpOp::Gte => actual.is_some_and(|v| compare_values(v, value) != Ordering::Less),
                CmpOp::Lt => actual.is_some_and(|v| compare_values(v, value) == Ordering::Less),
                CmpOp::Lte => actual.is_some_and(|v| compare_values(v, value) != Ordering::Greater),
            }
        }
    }
}

pub fn eval_date_range(doc: &Value, range: &DateRange) -> bool {
    let Some(at) = get_path(doc, &range.field).and_then(as_datetime) else {
        return false;
    };
    range.start.is_none_or(|s| at >= s) && range.end.is_none_or(|e| at <= e)
}

/// Naive full-text match: terms are compared case-insensitively against the
/// words of every string value in the document.
pub fn eval_search(doc: &Value, search: &SearchText) -> bool {
    let terms: Vec<String> = search.text.split_whitespace().map(str::to_lowercase).collect();
    if terms.is_empty() {
        return true;
    }
    let mut words = Vec::new();
    collect_words(doc, &mut words);
    let has = |t: &String| words.iter().any(|w| w == t);
    match search.default_operator {
        SearchOperator::And => terms.iter().all(has),
        SearchOperator::Or => terms.iter().any(has),
    }
}

fn collect_words(v: &Value, out: &mut Vec<String>) {
    match v {
        Value::String(s) => out.extend(
            s.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()).map(str::to_lowercase),
        ),
        Value::Array(items) => items.iter().for_each(|i| collect_words(i, out)),
        Value::Object(map) => map.values().for_each(|i| collect_words(i, out)),
        _ => {}
    }
}

pub fn compare_docs(a: &Value, b: &Value, sort: &[SortSpec]) -> Ordering {
    for s in sort.iter().take(MAX_SORT_FIELDS) {
        let ord = match (get_path(a, &s.field), get_path(b, &s.field)) {
            (Some(x), Some(y)) => compare_values(x, y),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return if s.order == Order::Asc { ord } else { ord.reverse() };
        }
    }
    Ordering::Equal
}

pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => match (parse_datetime(x), parse_datetime(y)) {
            (Some(dx), Some(dy)) => dx.cmp(&dy),
            _ => x.cmp(y),
        },
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_values(a, b) == Ordering::Equal,
        _ => a == b,
    }
}

fn array_contains(haystack: &Value, needle: &Value) -> bool {
    haystack.as_array().is_some_and(|items| items.iter().any(|i| values_equal(i, needle)))
}

const fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|d| d.with_timezone(&Utc))
}

fn as_datetime(v: &Value) -> Option<DateTime<Utc>> {
    v.as_str().and_then(parse_datetime)
}

/// Keeps only the given dotted paths. An empty list keeps everything.
pub fn project_fields(doc: &Value, paths: &[String]) -> Value {
    if paths.is_empty() {
        return doc.clone();
    }
    let mut out = Value::Object(Map::new());
    for path in paths {
        if let Some(v) = get_path(doc, path) {
            insert_path(&mut out, path, v.clone());
        }
    }
    out
}

fn insert_path(root: &mut Value, path: &str, value: Value) {
    let mut cur = root;
    let mut segs = path.split('.').peekable();
    while let Some(seg) = segs.next() {
        let Some(map) = cur.as_object_mut() else { return };
        if segs.peek().is_none() {
            map.insert(seg.to_string(), value);
            return;
        }
        cur = map.entry(seg.to_string()).or_insert_with(|| Value::Object(Map::new()));
    }
}
