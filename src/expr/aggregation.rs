use super::grammar::{Flavor, RawField, scan};
use super::types::{AggregationField, AggregationSet, ExpressionError};

const FLAVOR: Flavor = Flavor { sizes: true, whitespace_separates: true, slash_nesting: false };

/// Parses an aggregation expression such as `terms:category:10(max:price) terms:tags`.
///
/// A trailing `:N` sets the bucket size. Unlike field inclusion, repeated names
/// are kept as separate siblings.
///
/// # Errors
/// Returns an [`ExpressionError`] for unbalanced parentheses.
pub fn parse_aggregations(text: &str) -> Result<AggregationSet, ExpressionError> {
    let raw = scan(text, FLAVOR)?;
    Ok(AggregationSet { fields: raw.into_iter().map(convert).collect() })
}

fn convert(raw: RawField) -> AggregationField {
    AggregationField {
        name: raw.name,
        size: raw.size,
        children: raw.children.into_iter().map(convert).collect(),
    }
}
