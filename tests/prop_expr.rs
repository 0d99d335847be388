use proptest::prelude::*;
use searchrepo::expr::{
    AggregationField, AggregationSet, FieldInclude, FieldIncludeSet, parse_aggregations, parse_field_includes,
};

fn includes(depth: u32) -> BoxedStrategy<Vec<FieldInclude>> {
    let names = proptest::collection::btree_set("[a-z][a-z0-9_]{0,5}", 1..4);
    if depth == 0 {
        return names.prop_map(|ns| ns.into_iter().map(FieldInclude::new).collect()).boxed();
    }
    names
        .prop_flat_map(move |ns| {
            let n = ns.len();
            (Just(ns), proptest::collection::vec(proptest::option::of(includes(depth - 1)), n))
        })
        .prop_map(|(ns, kids)| {
            ns.into_iter().zip(kids).map(|(name, k)| FieldInclude::new(name).with_children(k.unwrap_or_default())).collect()
        })
        .boxed()
}

fn aggregations(depth: u32) -> BoxedStrategy<Vec<AggregationField>> {
    let field = ("[a-z][a-z0-9_]{0,5}", proptest::option::of(1u32..500));
    let fields = proptest::collection::vec(field, 1..4);
    if depth == 0 {
        return fields
            .prop_map(|fs| {
                fs.into_iter()
                    .map(|(name, size)| match size {
                        Some(s) => AggregationField::new(name).with_size(s),
                        None => AggregationField::new(name),
                    })
                    .collect()
            })
            .boxed();
    }
    fields
        .prop_flat_map(move |fs| {
            let n = fs.len();
            (Just(fs), proptest::collection::vec(proptest::option::of(aggregations(depth - 1)), n))
        })
        .prop_map(|(fs, kids)| {
            fs.into_iter()
                .zip(kids)
                .map(|((name, size), k)| {
                    let field = AggregationField::new(name).with_children(k.unwrap_or_default());
                    match size {
                        Some(s) => field.with_size(s),
                        None => field,
                    }
                })
                .collect()
        })
        .boxed()
}

fn leaf_count(fields: &[FieldInclude]) -> usize {
    fields.iter().map(|f| if f.children.is_empty() { 1 } else { leaf_count(&f.children) }).sum()
}

proptest! {
    #[test]
    fn prop_parsers_never_panic(text in "\\PC{0,64}") {
        if let Err(e) = parse_field_includes(&text) {
            prop_assert!(e.position <= text.len());
        }
        if let Err(e) = parse_aggregations(&text) {
            prop_assert!(e.position <= text.len());
        }
    }

    #[test]
    fn prop_field_includes_render_and_reparse(fields in includes(2)) {
        let set = FieldIncludeSet { fields };
        let parsed = parse_field_includes(&set.to_string()).unwrap();
        prop_assert_eq!(parsed.to_paths().len(), leaf_count(&set.fields));
        prop_assert_eq!(parsed, set);
    }

    #[test]
    fn prop_aggregations_render_and_reparse(fields in aggregations(2)) {
        let set = AggregationSet { fields };
        let parsed = parse_aggregations(&set.to_string()).unwrap();
        prop_assert_eq!(parsed, set);
    }

    #[test]
    fn prop_unclosed_group_is_rejected(fields in includes(1)) {
        let text = format!("{}(", FieldIncludeSet { fields });
        prop_assert!(parse_field_includes(&text).is_err());
        prop_assert!(parse_aggregations(&text).is_err());
    }
}
