//! Compact string DSLs for field selection and aggregation requests.

mod aggregation;
mod field_include;
mod grammar;
mod types;

pub use aggregation::parse_aggregations;
pub use field_include::parse_field_includes;
pub use types::{
    AggregationField, AggregationKind, AggregationSet, DEFAULT_BUCKET_SIZE, ExpressionError,
    FieldInclude, FieldIncludeSet,
};
