use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{RepoError, Result};
use crate::expr::{AggregationSet, FieldIncludeSet};
use crate::types::{DocumentId, SoftDeleteMode};

// Safety limits to prevent resource abuse
pub(crate) const MAX_PATH_DEPTH: usize = 32;
pub const MAX_IN_SET: usize = 1000;
pub(crate) const MAX_SORT_FIELDS: usize = 8;
pub const MAX_IDS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub order: Order,
}

impl SortSpec {
    #[must_use]
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), order: Order::Asc }
    }

    #[must_use]
    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), order: Order::Desc }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldCondition {
    Cmp { field: String, op: CmpOp, value: Value },
    In { field: String, values: Vec<Value> },
    Exists { field: String, exists: bool },
}

impl FieldCondition {
    #[must_use]
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Cmp { field: field.into(), op: CmpOp::Eq, value: value.into() }
    }

    #[must_use]
    pub fn not_eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Cmp { field: field.into(), op: CmpOp::NotEq, value: value.into() }
    }

    #[must_use]
    pub fn cmp(field: impl Into<String>, op: CmpOp, value: impl Into<Value>) -> Self {
        Self::Cmp { field: field.into(), op, value: value.into() }
    }

    #[must_use]
    pub fn any_of(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::In { field: field.into(), values }
    }

    #[must_use]
    pub fn exists(field: impl Into<String>) -> Self {
        Self::Exists { field: field.into(), exists: true }
    }

    #[must_use]
    pub fn missing(field: impl Into<String>) -> Self {
        Self::Exists { field: field.into(), exists: false }
    }
}

/// Inclusive range over a timestamp field; either bound may be open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub field: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SearchOperator {
    #[default]
    Or,
    And,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchText {
    pub text: String,
    pub default_operator: SearchOperator,
}

/// Parent/child join against another index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Relation {
    /// Keep documents whose `parent_field` names a matching document in `index`.
    HasParent { index: String, parent_field: String, query: Box<QueryParts> },
    /// Keep documents referenced by a matching document in `index` through its `parent_field`.
    HasChild { index: String, parent_field: String, query: Box<QueryParts> },
}

/// Everything a caller can ask of a query. Capability traits in
/// [`super::capabilities`] decide which of these a concrete query type exposes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryParts {
    pub ids: Vec<DocumentId>,
    pub excluded_ids: Vec<DocumentId>,
    pub date_ranges: Vec<DateRange>,
    pub conditions: Vec<FieldCondition>,
    pub system_conditions: Vec<FieldCondition>,
    pub search: Option<SearchText>,
    pub relations: Vec<Relation>,
    pub soft_delete_mode: Option<SoftDeleteMode>,
    pub fields: FieldIncludeSet,
    pub sort: Vec<SortSpec>,
    pub aggregations: AggregationSet,
}

fn check_conditions(conditions: &[FieldCondition]) -> Result<()> {
    for condition in conditions {
        if let FieldCondition::In { field, values } = condition
            && values.len() > MAX_IN_SET
        {
            return Err(RepoError::InvalidOptions(format!(
                "'{field}' matches {} values, at most {MAX_IN_SET} allowed",
                values.len()
            )));
        }
    }
    Ok(())
}

impl QueryParts {
    /// Rejects id and value sets too large to hand to a backend.
    ///
    /// # Errors
    /// `InvalidOptions` naming the oversized set, including inside relations.
    pub fn check_limits(&self) -> Result<()> {
        for ids in [&self.ids, &self.excluded_ids] {
            if ids.len() > MAX_IDS {
                return Err(RepoError::InvalidOptions(format!(
                    "{} ids in one query, at most {MAX_IDS} allowed",
                    ids.len()
                )));
            }
        }
        check_conditions(&self.conditions)?;
        check_conditions(&self.system_conditions)?;
        for relation in &self.relations {
            match relation {
                Relation::HasParent { query, .. } | Relation::HasChild { query, .. } => query.check_limits()?,
            }
        }
        Ok(())
    }
}

/// Backend-facing form of a query, after options and system filters are folded in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompiledQuery {
    pub ids: Vec<DocumentId>,
    pub excluded_ids: Vec<DocumentId>,
    pub date_ranges: Vec<DateRange>,
    pub conditions: Vec<FieldCondition>,
    pub search: Option<SearchText>,
    pub relations: Vec<CompiledRelation>,
    pub fields: Vec<String>,
    pub sort: Vec<SortSpec>,
    pub aggregations: AggregationSet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CompiledRelation {
    HasParent { index: String, parent_field: String, query: Box<CompiledQuery> },
    HasChild { index: String, parent_field: String, query: Box<CompiledQuery> },
}
