use serde::{Deserialize, Serialize};
use std::fmt;

/// Bucket count used when an aggregation field carries no `:N` suffix.
pub const DEFAULT_BUCKET_SIZE: u32 = 25;

/// A malformed expression. Returned as a value so callers can surface it as
/// user input validation rather than a fault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} (at position {position})")]
pub struct ExpressionError {
    pub message: String,
    pub position: usize,
}

impl ExpressionError {
    pub(crate) fn new(message: impl Into<String>, position: usize) -> Self {
        Self { message: message.into(), position }
    }
}

/// One selected field; children restrict which sub-fields of an object are kept.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FieldInclude {
    pub name: String,
    pub children: Vec<FieldInclude>,
}

impl FieldInclude {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), children: Vec::new() }
    }

    #[must_use]
    pub fn with_children(mut self, children: Vec<Self>) -> Self {
        self.children = children;
        self
    }

    fn collect_paths(&self, prefix: &str, out: &mut Vec<String>) {
        let path = if prefix.is_empty() { self.name.clone() } else { format!("{prefix}.{}", self.name) };
        if self.children.is_empty() {
            out.push(path);
        } else {
            for child in &self.children {
                child.collect_paths(&path, out);
            }
        }
    }
}

/// Ordered set of selected fields, as produced by [`crate::expr::parse_field_includes`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FieldIncludeSet {
    pub fields: Vec<FieldInclude>,
}

impl FieldIncludeSet {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Leaf-only dotted paths: a node with children contributes only its descendants.
    #[must_use]
    pub fn to_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        for f in &self.fields {
            f.collect_paths("", &mut out);
        }
        out
    }

    /// Adds `other`'s fields, merging same-named nodes.
    pub fn merge(&mut self, other: Self) {
        for f in other.fields {
            merge_field(&mut self.fields, f);
        }
    }
}

pub(crate) fn merge_field(into: &mut Vec<FieldInclude>, field: FieldInclude) {
    if let Some(existing) = into.iter_mut().find(|f| f.name == field.name) {
        for child in field.children {
            merge_field(&mut existing.children, child);
        }
    } else {
        let mut fresh = FieldInclude::new(field.name);
        for child in field.children {
            merge_field(&mut fresh.children, child);
        }
        into.push(fresh);
    }
}

fn write_includes(f: &mut fmt::Formatter<'_>, fields: &[FieldInclude]) -> fmt::Result {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        f.write_str(&field.name)?;
        if !field.children.is_empty() {
            f.write_str("(")?;
            write_includes(f, &field.children)?;
            f.write_str(")")?;
        }
    }
    Ok(())
}

impl fmt::Display for FieldIncludeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_includes(f, &self.fields)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregationKind {
    Terms,
    Min,
    Max,
    Avg,
    Sum,
    Cardinality,
    Missing,
}

impl AggregationKind {
    fn from_prefix(prefix: &str) -> Option<Self> {
        Some(match prefix.to_ascii_lowercase().as_str() {
            "terms" => Self::Terms,
            "min" => Self::Min,
            "max" => Self::Max,
            "avg" => Self::Avg,
            "sum" => Self::Sum,
            "cardinality" => Self::Cardinality,
            "missing" => Self::Missing,
            _ => return None,
        })
    }
}

/// One requested aggregation. Same shape as [`FieldInclude`] plus a bucket size.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AggregationField {
    pub name: String,
    pub size: Option<u32>,
    pub children: Vec<AggregationField>,
}

impl AggregationField {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), size: None, children: Vec::new() }
    }

    #[must_use]
    pub fn with_size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    #[must_use]
    pub fn with_children(mut self, children: Vec<Self>) -> Self {
        self.children = children;
        self
    }

    /// Effective bucket count.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.size.unwrap_or(DEFAULT_BUCKET_SIZE)
    }

    /// Decodes `kind:field`; a bare name is a terms aggregation on that field.
    #[must_use]
    pub fn kind_and_field(&self) -> (AggregationKind, &str) {
        if let Some((prefix, field)) = self.name.split_once(':')
            && let Some(kind) = AggregationKind::from_prefix(prefix)
        {
            return (kind, field);
        }
        (AggregationKind::Terms, self.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AggregationSet {
    pub fields: Vec<AggregationField>,
}

impl AggregationSet {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn write_aggregations(f: &mut fmt::Formatter<'_>, fields: &[AggregationField]) -> fmt::Result {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        f.write_str(&field.name)?;
        if let Some(size) = field.size {
            write!(f, ":{size}")?;
        }
        if !field.children.is_empty() {
            f.write_str("(")?;
            write_aggregations(f, &field.children)?;
            f.write_str(")")?;
        }
    }
    Ok(())
}

impl fmt::Display for AggregationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_aggregations(f, &self.fields)
    }
}
