use super::grammar::{Flavor, RawField, scan};
use super::types::{ExpressionError, FieldInclude, FieldIncludeSet, merge_field};

const FLAVOR: Flavor = Flavor { sizes: false, whitespace_separates: false, slash_nesting: true };

/// Parses a field-inclusion expression such as `id,name,address(city,zip)`.
///
/// Repeated names in one scope are merged (`a,a(b)` yields a single `a` with
/// child `b`). `a/b` is shorthand for `a(b)`.
///
/// # Errors
/// Returns an [`ExpressionError`] for unbalanced parentheses.
pub fn parse_field_includes(text: &str) -> Result<FieldIncludeSet, ExpressionError> {
    let raw = scan(text, FLAVOR)?;
    let mut fields = Vec::with_capacity(raw.len());
    for r in raw {
        merge_field(&mut fields, convert(r));
    }
    Ok(FieldIncludeSet { fields })
}

fn convert(raw: RawField) -> FieldInclude {
    FieldInclude { name: raw.name, children: raw.children.into_iter().map(convert).collect() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_valid_and_empty() {
        let set = parse_field_includes("").unwrap();
        assert!(set.is_empty());
        assert!(parse_field_includes("  , ,").unwrap().is_empty());
    }

    #[test]
    fn unbalanced_parens_are_reported() {
        let err = parse_field_includes("a(b").unwrap_err();
        assert!(err.message.contains("missing ')'"));
        let err = parse_field_includes("a)").unwrap_err();
        assert!(err.message.contains("unexpected ')'"));
        assert_eq!(err.position, 1);
    }

    #[test]
    fn repeated_names_merge_children() {
        let set = parse_field_includes("a,a(b),c,a(d)").unwrap();
        assert_eq!(set.fields.len(), 2);
        assert_eq!(set.to_string(), "a(b,d),c");
        assert_eq!(set.to_paths(), vec!["a.b", "a.d", "c"]);
    }

    #[test]
    fn slash_is_nesting_shorthand() {
        let slash = parse_field_includes("results/id, results/name, total").unwrap();
        let parens = parse_field_includes("results(id,name),total").unwrap();
        assert_eq!(slash, parens);
    }

    #[test]
    fn whitespace_is_trimmed() {
        let set = parse_field_includes("  id , address ( city , zip ) ").unwrap();
        assert_eq!(set.to_string(), "id,address(city,zip)");
    }

    #[test]
    fn flatten_is_leaf_only() {
        let set = parse_field_includes("meta(tags(name),created),id").unwrap();
        assert_eq!(set.to_paths(), vec!["meta.tags.name", "meta.created", "id"]);
    }

    #[test]
    fn render_and_reparse_is_stable() {
        let set = parse_field_includes("a,b(c,d(e)),f").unwrap();
        let again = parse_field_includes(&set.to_string()).unwrap();
        assert_eq!(set, again);
    }
}
