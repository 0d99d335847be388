use super::options::CommandOptions;
use super::types::{CompiledQuery, CompiledRelation, FieldCondition, QueryParts, Relation};
use crate::document::Capabilities;
use crate::types::SoftDeleteMode;

/// Folds options, capability-driven filters and system filters into the form
/// handed to the backend.
///
/// Soft-delete visibility comes from the options, then the query, then defaults
/// to `ActiveOnly`; it is ignored for types that do not soft delete.
#[must_use]
pub fn compile_query(
    parts: &QueryParts,
    options: &CommandOptions,
    caps: &Capabilities,
    system_conditions: &[FieldCondition],
) -> CompiledQuery {
    let mut conditions: Vec<FieldCondition> = Vec::with_capacity(
        system_conditions.len() + parts.system_conditions.len() + parts.conditions.len() + 1,
    );
    conditions.extend(system_conditions.iter().cloned());
    conditions.extend(parts.system_conditions.iter().cloned());
    conditions.extend(parts.conditions.iter().cloned());

    if let Some(field) = caps.soft_delete_field {
        let mode = options.soft_delete_mode.or(parts.soft_delete_mode).unwrap_or_default();
        match mode {
            SoftDeleteMode::ActiveOnly => conditions.push(FieldCondition::not_eq(field, true)),
            SoftDeleteMode::DeletedOnly => conditions.push(FieldCondition::eq(field, true)),
            SoftDeleteMode::All => {}
        }
    }

    CompiledQuery {
        ids: parts.ids.clone(),
        excluded_ids: parts.excluded_ids.clone(),
        date_ranges: parts.date_ranges.clone(),
        conditions,
        search: parts.search.clone().filter(|s| !s.text.trim().is_empty()),
        relations: parts.relations.iter().map(compile_relation).collect(),
        fields: parts.fields.to_paths(),
        sort: parts.sort.clone(),
        aggregations: parts.aggregations.clone(),
    }
}

fn compile_relation(relation: &Relation) -> CompiledRelation {
    // Related documents are matched as stored: no capability folding on the other side.
    let sub = |q: &QueryParts| Box::new(compile_query(q, &CommandOptions::default(), &Capabilities::NONE, &[]));
    match relation {
        Relation::HasParent { index, parent_field, query } => CompiledRelation::HasParent {
            index: index.clone(),
            parent_field: parent_field.clone(),
            query: sub(query),
        },
        Relation::HasChild { index, parent_field, query } => CompiledRelation::HasChild {
            index: index.clone(),
            parent_field: parent_field.clone(),
            query: sub(query),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{FieldConditionQuery, Query, RepositoryQuery, SearchQuery, SoftDeleteQuery};

    const SOFT: Capabilities = Capabilities::NONE.soft_deletes("is_deleted");

    #[test]
    fn active_only_is_default_for_soft_deleting_types() {
        let q = Query::new();
        let c = compile_query(q.parts(), &CommandOptions::default(), &SOFT, &[]);
        assert_eq!(c.conditions, vec![FieldCondition::not_eq("is_deleted", true)]);
        let plain = compile_query(q.parts(), &CommandOptions::default(), &Capabilities::NONE, &[]);
        assert!(plain.conditions.is_empty());
    }

    #[test]
    fn options_override_query_soft_delete_mode() {
        let q = Query::new().with_soft_delete_mode(SoftDeleteMode::All);
        let c = compile_query(q.parts(), &CommandOptions::default(), &SOFT, &[]);
        assert!(c.conditions.is_empty());
        let opts = CommandOptions::new().soft_delete_mode(SoftDeleteMode::DeletedOnly);
        let c = compile_query(q.parts(), &opts, &SOFT, &[]);
        assert_eq!(c.conditions, vec![FieldCondition::eq("is_deleted", true)]);
    }

    #[test]
    fn system_filters_come_first_and_blank_search_is_dropped() {
        let q = Query::new().with_condition(FieldCondition::eq("a", 1)).with_search("   ");
        let sys = [FieldCondition::eq("tenant", "t1")];
        let c = compile_query(q.parts(), &CommandOptions::default(), &Capabilities::NONE, &sys);
        assert_eq!(c.conditions[0], FieldCondition::eq("tenant", "t1"));
        assert!(c.search.is_none());
    }
}
