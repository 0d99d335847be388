use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::query::CompiledQuery;
use crate::types::DocumentId;

/// A source document as the backend stores it, with the version it tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: DocumentId,
    pub version: u64,
    pub source: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: DocumentId,
    pub version: u64,
    pub score: Option<f64>,
    pub source: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: CompiledQuery,
    pub offset: usize,
    /// Zero asks for totals and aggregations only.
    pub limit: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    pub total: u64,
    pub aggregations: AggregationResults,
}

/// One page read through a server-held snapshot cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorPage {
    pub cursor_id: String,
    pub hits: Vec<SearchHit>,
    pub total: u64,
    pub aggregations: AggregationResults,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WriteOp {
    Add { id: DocumentId, source: Value },
    Update { id: DocumentId, source: Value, expected_version: Option<u64> },
    Delete { id: DocumentId, expected_version: Option<u64> },
}

impl WriteOp {
    #[must_use]
    pub const fn id(&self) -> &DocumentId {
        match self {
            Self::Add { id, .. } | Self::Update { id, .. } | Self::Delete { id, .. } => id,
        }
    }
}

/// Per-item result of a bulk write or script execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteOutcome {
    Written { id: DocumentId, version: u64 },
    Deleted { id: DocumentId },
    NotFound { id: DocumentId },
    Duplicate { id: DocumentId },
    VersionConflict { id: DocumentId, expected: Option<u64>, actual: Option<u64> },
    Failed { id: DocumentId, message: String },
}

impl WriteOutcome {
    #[must_use]
    pub const fn id(&self) -> &DocumentId {
        match self {
            Self::Written { id, .. }
            | Self::Deleted { id }
            | Self::NotFound { id }
            | Self::Duplicate { id }
            | Self::VersionConflict { id, .. }
            | Self::Failed { id, .. } => id,
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Written { .. } | Self::Deleted { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub key: Value,
    pub count: u64,
    pub aggregations: AggregationResults,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Aggregate {
    /// Term buckets; `other_count` counts documents in buckets cut by the size limit.
    Buckets { buckets: Vec<Bucket>, other_count: u64 },
    /// Numeric metric; `None` when no document carried a number.
    Value(Option<f64>),
    Count(u64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedAggregate {
    pub name: String,
    pub aggregate: Aggregate,
}

/// Aggregation results in request order. Names may repeat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregationResults(pub Vec<NamedAggregate>);

impl AggregationResults {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Aggregate> {
        self.0.iter().find(|a| a.name == name).map(|a| &a.aggregate)
    }

    #[must_use]
    pub fn buckets(&self, name: &str) -> Option<&[Bucket]> {
        match self.get(name)? {
            Aggregate::Buckets { buckets, .. } => Some(buckets),
            _ => None,
        }
    }

    #[must_use]
    pub fn value(&self, name: &str) -> Option<f64> {
        match self.get(name)? {
            Aggregate::Value(v) => *v,
            Aggregate::Count(c) => Some(*c as f64),
            Aggregate::Buckets { .. } => None,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
