use serde_json::Value;
use std::collections::{HashMap, HashSet};

use super::types::{Aggregate, AggregationResults, Bucket, NamedAggregate};
use crate::expr::{AggregationField, AggregationKind, AggregationSet};
use crate::query::eval::{compare_values, get_path};

pub(crate) fn aggregate(sources: &[&Value], request: &AggregationSet) -> AggregationResults {
    AggregationResults(request.fields.iter().map(|f| aggregate_field(sources, f)).collect())
}

fn aggregate_field(sources: &[&Value], field: &AggregationField) -> NamedAggregate {
    let (kind, path) = field.kind_and_field();
    let aggregate = match kind {
        AggregationKind::Terms => terms(sources, path, field),
        AggregationKind::Missing => Aggregate::Count(
            sources.iter().filter(|s| get_path(s, path).is_none_or(Value::is_null)).count() as u64,
        ),
        AggregationKind::Cardinality => {
            let distinct: HashSet<String> =
                sources.iter().flat_map(|s| values_at(s, path)).map(Value::to_string).collect();
            Aggregate::Count(distinct.len() as u64)
        }
        AggregationKind::Min | AggregationKind::Max | AggregationKind::Sum | AggregationKind::Avg => {
            let nums: Vec<f64> =
                sources.iter().flat_map(|s| values_at(s, path)).filter_map(Value::as_f64).collect();
            Aggregate::Value(metric(kind, &nums))
        }
    };
    NamedAggregate { name: field.name.clone(), aggregate }
}

fn metric(kind: AggregationKind, nums: &[f64]) -> Option<f64> {
    if nums.is_empty() {
        return None;
    }
    Some(match kind {
        AggregationKind::Min => nums.iter().copied().fold(f64::INFINITY, f64::min),
        AggregationKind::Max => nums.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        AggregationKind::Sum => nums.iter().sum(),
        _ => nums.iter().sum::<f64>() / nums.len() as f64,
    })
}

fn terms(sources: &[&Value], path: &str, field: &AggregationField) -> Aggregate {
    let mut groups: HashMap<String, (Value, Vec<&Value>)> = HashMap::new();
    for &s in sources {
        for v in values_at(s, path) {
            if v.is_null() {
                continue;
            }
            groups.entry(v.to_string()).or_insert_with(|| (v.clone(), Vec::new())).1.push(s);
        }
    }
    let mut ordered: Vec<(Value, Vec<&Value>)> = groups.into_values().collect();
    ordered.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| compare_values(&a.0, &b.0)));

    let size = field.size() as usize;
    let other_count = ordered.iter().skip(size).map(|(_, docs)| docs.len() as u64).sum();
    let children = AggregationSet { fields: field.children.clone() };
    let buckets = ordered
        .into_iter()
        .take(size)
        .map(|(key, docs)| Bucket {
            key,
            count: docs.len() as u64,
            aggregations: if children.is_empty() {
                AggregationResults::default()
            } else {
                aggregate(&docs, &children)
            },
        })
        .collect();
    Aggregate::Buckets { buckets, other_count }
}

/// Values at `path`, flattening one level of arrays.
fn values_at<'a>(source: &'a Value, path: &str) -> Vec<&'a Value> {
    match get_path(source, path) {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(v) => vec![v],
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parse_aggregations;
    use serde_json::json;

    #[test]
    fn terms_with_size_and_nested_metrics() {
        let docs = [
            json!({"cat": "a", "price": 10, "tags": ["x", "y"]}),
            json!({"cat": "a", "price": 20, "tags": ["x"]}),
            json!({"cat": "b", "price": 5}),
            json!({"cat": "c", "price": 1}),
        ];
        let refs: Vec<&Value> = docs.iter().collect();
        let req = parse_aggregations("cat:2(max:price) terms:tags cardinality:cat missing:tags").unwrap();
        let out = aggregate(&refs, &req);

        let cats = out.buckets("cat").unwrap();
        assert_eq!(cats.len(), 2);
        assert_eq!(cats[0].key, json!("a"));
        assert_eq!(cats[0].count, 2);
        assert_eq!(cats[0].aggregations.value("max:price"), Some(20.0));
        match out.get("cat").unwrap() {
            Aggregate::Buckets { other_count, .. } => assert_eq!(*other_count, 1),
            other => panic!("unexpected {other:?}"),
        }
        let tags = out.buckets("terms:tags").unwrap();
        assert_eq!(tags[0].key, json!("x"));
        assert_eq!(tags[0].count, 2);
        assert_eq!(out.value("cardinality:cat"), Some(3.0));
        assert_eq!(out.value("missing:tags"), Some(2.0));
    }
}
