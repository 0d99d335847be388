//! Narrow query capabilities. A query type implements only the traits it
//! supports, so e.g. `with_date_range` does not type-check on a query that
//! cannot filter by date.
//!
//! Merge rules when the same capability is applied twice: lists append (ids,
//! conditions, ranges, sorts, aggregations), selected fields merge by name, and
//! scalar settings (search text, soft-delete mode) overwrite.

use chrono::{DateTime, Utc};

use super::types::{
    DateRange, FieldCondition, QueryParts, Relation, SearchOperator, SearchText, SortSpec,
};
use crate::errors::Result;
use crate::expr::{AggregationSet, FieldIncludeSet, parse_aggregations, parse_field_includes};
use crate::types::{DocumentId, SoftDeleteMode};

/// Access to the descriptor every capability writes into.
pub trait RepositoryQuery: Send + Sync {
    fn parts(&self) -> &QueryParts;
    fn parts_mut(&mut self) -> &mut QueryParts;
}

pub trait IdentityQuery: RepositoryQuery + Sized {
    #[must_use]
    fn with_id(self, id: impl Into<DocumentId>) -> Self {
        self.with_ids([id.into()])
    }

    #[must_use]
    fn with_ids(mut self, ids: impl IntoIterator<Item = DocumentId>) -> Self {
        let parts = self.parts_mut();
        for id in ids {
            if !parts.ids.contains(&id) {
                parts.ids.push(id);
            }
        }
        self
    }

    #[must_use]
    fn excluding_ids(mut self, ids: impl IntoIterator<Item = DocumentId>) -> Self {
        let parts = self.parts_mut();
        for id in ids {
            if !parts.excluded_ids.contains(&id) {
                parts.excluded_ids.push(id);
            }
        }
        self
    }
}

pub trait DateRangeQuery: RepositoryQuery + Sized {
    #[must_use]
    fn with_date_range(
        mut self,
        field: impl Into<String>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Self {
        self.parts_mut().date_ranges.push(DateRange { field: field.into(), start, end });
        self
    }
}

pub trait FieldConditionQuery: RepositoryQuery + Sized {
    #[must_use]
    fn with_condition(mut self, condition: FieldCondition) -> Self {
        self.parts_mut().conditions.push(condition);
        self
    }
}

pub trait SearchQuery: RepositoryQuery + Sized {
    #[must_use]
    fn with_search(mut self, text: impl Into<String>) -> Self {
        let op = self.parts().search.as_ref().map(|s| s.default_operator).unwrap_or_default();
        self.parts_mut().search = Some(SearchText { text: text.into(), default_operator: op });
        self
    }

    #[must_use]
    fn with_search_operator(mut self, op: SearchOperator) -> Self {
        let parts = self.parts_mut();
        match parts.search.as_mut() {
            Some(s) => s.default_operator = op,
            None => parts.search = Some(SearchText { text: String::new(), default_operator: op }),
        }
        self
    }
}

pub trait ParentChildQuery: RepositoryQuery + Sized {
    #[must_use]
    fn with_parent(
        mut self,
        index: impl Into<String>,
        parent_field: impl Into<String>,
        parent: impl RepositoryQuery,
    ) -> Self {
        self.parts_mut().relations.push(Relation::HasParent {
            index: index.into(),
            parent_field: parent_field.into(),
            query: Box::new(parent.parts().clone()),
        });
        self
    }

    #[must_use]
    fn with_child(
        mut self,
        index: impl Into<String>,
        parent_field: impl Into<String>,
        child: impl RepositoryQuery,
    ) -> Self {
        self.parts_mut().relations.push(Relation::HasChild {
            index: index.into(),
            parent_field: parent_field.into(),
            query: Box::new(child.parts().clone()),
        });
        self
    }
}

pub trait SoftDeleteQuery: RepositoryQuery + Sized {
    #[must_use]
    fn with_soft_delete_mode(mut self, mode: SoftDeleteMode) -> Self {
        self.parts_mut().soft_delete_mode = Some(mode);
        self
    }
}

pub trait SortQuery: RepositoryQuery + Sized {
    #[must_use]
    fn sort_by(mut self, sort: SortSpec) -> Self {
        self.parts_mut().sort.push(sort);
        self
    }
}

pub trait FieldSelectQuery: RepositoryQuery + Sized {
    #[must_use]
    fn with_fields(mut self, fields: FieldIncludeSet) -> Self {
        self.parts_mut().fields.merge(fields);
        self
    }

    /// Parses and merges a field-inclusion expression.
    ///
    /// # Errors
    /// Returns `InvalidExpression` when the expression is malformed.
    fn with_fields_expr(self, expr: &str) -> Result<Self> {
        let fields = parse_field_includes(expr)?;
        Ok(self.with_fields(fields))
    }
}

pub trait AggregationQuery: RepositoryQuery + Sized {
    #[must_use]
    fn with_aggregations(mut self, aggregations: AggregationSet) -> Self {
        self.parts_mut().aggregations.fields.extend(aggregations.fields);
        self
    }

    /// # Errors
    /// Returns `InvalidExpression` when the expression is malformed.
    fn with_aggregations_expr(self, expr: &str) -> Result<Self> {
        let aggs = parse_aggregations(expr)?;
        Ok(self.with_aggregations(aggs))
    }
}

/// Always-applied predicates layered under the caller's filters (tenant scoping and the like).
pub trait SystemFilterQuery: RepositoryQuery + Sized {
    #[must_use]
    fn with_system_filter(mut self, condition: FieldCondition) -> Self {
        self.parts_mut().system_conditions.push(condition);
        self
    }
}

/// General-purpose query supporting every capability.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    parts: QueryParts,
}

impl Query {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RepositoryQuery for Query {
    fn parts(&self) -> &QueryParts {
        &self.parts
    }
    fn parts_mut(&mut self) -> &mut QueryParts {
        &mut self.parts
    }
}

impl IdentityQuery for Query {}
impl DateRangeQuery for Query {}
impl FieldConditionQuery for Query {}
impl SearchQuery for Query {}
impl ParentChildQuery for Query {}
impl SoftDeleteQuery for Query {}
impl SortQuery for Query {}
impl FieldSelectQuery for Query {}
impl AggregationQuery for Query {}
impl SystemFilterQuery for Query {}

/// Lookup by id with optional field selection; nothing else.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdQuery {
    parts: QueryParts,
}

impl IdQuery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RepositoryQuery for IdQuery {
    fn parts(&self) -> &QueryParts {
        &self.parts
    }
    fn parts_mut(&mut self) -> &mut QueryParts {
        &mut self.parts
    }
}

impl IdentityQuery for IdQuery {}
impl FieldSelectQuery for IdQuery {}
