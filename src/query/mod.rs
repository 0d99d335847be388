//! Composable query descriptor, per-call options and the compiled form handed
//! to the backend.

mod capabilities;
mod compile;
pub(crate) mod eval;
mod options;
mod types;

pub use capabilities::{
    AggregationQuery, DateRangeQuery, FieldConditionQuery, FieldSelectQuery, IdQuery,
    IdentityQuery, ParentChildQuery, Query, RepositoryQuery, SearchQuery, SoftDeleteQuery,
    SortQuery, SystemFilterQuery,
};
pub use compile::compile_query;
pub use options::{CommandOptions, MAX_PAGE_LIMIT};
pub(crate) use options::offset_from;
pub use types::{MAX_IDS, MAX_IN_SET};
pub use types::{
    CmpOp, CompiledQuery, CompiledRelation, DateRange, FieldCondition, Order, QueryParts,
    Relation, SearchOperator, SearchText, SortSpec,
};
