//! Search, filter and sort clause construction.
//!
//! Column names only ever come from entity metadata. Caller input decides
//! which whitelisted columns are used and supplies bound values, but never
//! reaches the SQL text itself.

use serde_json::{Map, Value};

use fieldline_core::{EntityMetadata, SortOrder, ValidationError};

use crate::fragment::SqlFragment;
use crate::value::SqlValue;

/// Range operators accepted in an object-valued filter, with their SQL form.
const RANGE_OPERATORS: [(&str, &str); 4] = [("gte", ">="), ("gt", ">"), ("lte", "<="), ("lt", "<")];

/// Case-insensitive substring match OR'd across `searchable_fields`.
///
/// An absent or blank term yields an empty fragment, which composes as a
/// no-op rather than as "match nothing".
pub fn build_search_clause(term: Option<&str>, searchable_fields: &[String]) -> SqlFragment {
    let term = match term.map(str::trim) {
        Some(t) if !t.is_empty() => t,
        _ => return SqlFragment::empty(),
    };
    if searchable_fields.is_empty() {
        return SqlFragment::empty();
    }

    let predicates: Vec<String> = searchable_fields
        .iter()
        .map(|col| format!("{}::text ILIKE $1", col))
        .collect();

    SqlFragment::new(
        format!("({})", predicates.join(" OR ")),
        vec![SqlValue::Text(format!("%{}%", escape_like(term)))],
    )
}

/// Escape LIKE wildcards so the term matches literally.
pub fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Output of [`build_filter_clause`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterClause {
    pub fragment: SqlFragment,
    /// The filters that were actually applied, echoed back to the caller.
    pub applied: Map<String, Value>,
}

/// AND together one predicate per whitelisted filter.
///
/// - scalar: equality
/// - `null`: `IS NULL`
/// - array: membership (`IN`)
/// - object with `gte/gt/lte/lt`: range, only on numeric and date columns
///
/// Keys outside `filterable_fields` are dropped silently: they appear in
/// neither the SQL nor the echo. Values that cannot be coerced to the
/// column type fail with a `ValidationError` on that field.
pub fn build_filter_clause(
    filters: &Map<String, Value>,
    meta: &EntityMetadata,
) -> Result<FilterClause, ValidationError> {
    let mut predicates = Vec::new();
    let mut applied = Map::new();

    let mut keys: Vec<&String> = filters.keys().collect();
    keys.sort();

    for key in keys {
        let value = &filters[key];
        if !meta.filterable_fields.contains(key) {
            tracing::debug!(entity = %meta.entity_key, filter = %key, "Dropping non-filterable key");
            continue;
        }
        let Some(def) = meta.field(key) else {
            continue;
        };

        let coerce = |v: &Value| {
            SqlValue::coerce(key, def.field_type, v)
                .map_err(|_| ValidationError::invalid_filter_value(key, &def.field_type.to_string()))
        };

        match value {
            Value::Null => {
                predicates.push(SqlFragment::new(format!("{} IS NULL", key), vec![]));
                applied.insert(key.clone(), Value::Null);
            }
            Value::Object(ops) => {
                if !def.field_type.supports_range() {
                    tracing::debug!(entity = %meta.entity_key, filter = %key, "Dropping range filter on non-range column");
                    continue;
                }
                let mut parts = Vec::new();
                let mut params = Vec::new();
                let mut echo = Map::new();
                for (op, sql_op) in RANGE_OPERATORS {
                    if let Some(bound) = ops.get(op) {
                        params.push(coerce(bound)?);
                        parts.push(format!("{} {} ${}", key, sql_op, params.len()));
                        echo.insert(op.to_string(), bound.clone());
                    }
                }
                if parts.is_empty() {
                    continue;
                }
                predicates.push(SqlFragment::new(parts.join(" AND "), params));
                applied.insert(key.clone(), Value::Object(echo));
            }
            Value::Array(items) => {
                if items.is_empty() {
                    continue;
                }
                let params = items.iter().map(&coerce).collect::<Result<Vec<_>, _>>()?;
                let placeholders: Vec<String> =
                    (1..=params.len()).map(|i| format!("${}", i)).collect();
                predicates.push(SqlFragment::new(
                    format!("{} IN ({})", key, placeholders.join(", ")),
                    params,
                ));
                applied.insert(key.clone(), value.clone());
            }
            scalar => {
                let param = coerce(scalar)?;
                predicates.push(SqlFragment::new(format!("{} = $1", key), vec![param]));
                applied.insert(key.clone(), scalar.clone());
            }
        }
    }

    Ok(FilterClause {
        fragment: SqlFragment::and_all(predicates),
        applied,
    })
}

/// Resolve the ORDER BY expression.
///
/// `sort_by` must be a sortable column; `sort_order` must be ASC or DESC in
/// any case. With neither given the entity's default sort applies. The
/// primary key is appended as a tiebreaker so paging is stable.
pub fn build_sort_clause(
    sort_by: Option<&str>,
    sort_order: Option<&str>,
    meta: &EntityMetadata,
) -> Result<String, ValidationError> {
    let default_sort = meta.effective_default_sort();

    let order = match sort_order.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => SortOrder::parse(raw).ok_or_else(|| ValidationError::invalid_sort_order(raw))?,
        None if sort_by.is_none() => default_sort.order,
        None => SortOrder::Asc,
    };

    let column = match sort_by.map(str::trim).filter(|s| !s.is_empty()) {
        Some(requested) => {
            let allowed = meta
                .sortable_fields
                .iter()
                .find(|f| f.as_str() == requested)
                .ok_or_else(|| {
                    let names: Vec<&str> = meta.sortable_fields.iter().map(|s| s.as_str()).collect();
                    ValidationError::invalid_sort_field(requested, &names)
                })?;
            allowed.as_str()
        }
        None => default_sort.field.as_str(),
    };

    if column == meta.primary_key {
        Ok(format!("{} {}", column, order))
    } else {
        Ok(format!("{} {}, {} {}", column, order, meta.primary_key, order))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldline_core::EntityRegistry;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn work_orders() -> EntityMetadata {
        EntityRegistry::builtin()
            .unwrap()
            .get("work_order")
            .unwrap()
            .clone()
    }

    fn filters(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn test_search_or_across_fields() {
        let fields = vec!["title".to_string(), "description".to_string()];
        let f = build_search_clause(Some("leak"), &fields);
        assert_eq!(
            f.sql,
            "(title::text ILIKE $1 OR description::text ILIKE $1)"
        );
        assert_eq!(f.params, vec![SqlValue::Text("%leak%".to_string())]);
    }

    #[test]
    fn test_blank_search_is_noop() {
        let fields = vec!["title".to_string()];
        assert!(build_search_clause(None, &fields).is_empty());
        assert!(build_search_clause(Some("   "), &fields).is_empty());
        assert!(build_search_clause(Some("x"), &[]).is_empty());
    }

    #[test]
    fn test_search_escapes_wildcards() {
        let fields = vec!["sku".to_string()];
        let f = build_search_clause(Some("50%_off\\"), &fields);
        assert_eq!(f.params, vec![SqlValue::Text("%50\\%\\_off\\\\%".to_string())]);
    }

    #[test]
    fn test_filter_equality_and_whitelist() {
        let meta = work_orders();
        let clause = build_filter_clause(
            &filters(json!({
                "status": "pending",
                "customer_id": "7",
                "password_hash": "x",
                "title; DROP TABLE work_orders": "y"
            })),
            &meta,
        )
        .unwrap();

        assert_eq!(clause.fragment.sql, "customer_id = $1 AND status = $2");
        assert_eq!(
            clause.fragment.params,
            vec![SqlValue::Int(7), SqlValue::Text("pending".to_string())]
        );
        assert_eq!(
            Value::Object(clause.applied),
            json!({"status": "pending", "customer_id": "7"})
        );
    }

    #[test]
    fn test_filter_null_and_membership() {
        let meta = work_orders();
        let clause = build_filter_clause(
            &filters(json!({
                "assigned_technician_id": null,
                "priority": ["high", "urgent"]
            })),
            &meta,
        )
        .unwrap();
        assert_eq!(
            clause.fragment.sql,
            "assigned_technician_id IS NULL AND priority IN ($1, $2)"
        );
        assert_eq!(clause.fragment.params.len(), 2);
    }

    #[test]
    fn test_filter_range_on_date() {
        let meta = work_orders();
        let clause = build_filter_clause(
            &filters(json!({
                "scheduled_date": {"gte": "2024-01-01", "lt": "2024-02-01", "ne": "x"}
            })),
            &meta,
        )
        .unwrap();
        assert_eq!(
            clause.fragment.sql,
            "scheduled_date >= $1 AND scheduled_date < $2"
        );
        assert_eq!(
            Value::Object(clause.applied),
            json!({"scheduled_date": {"gte": "2024-01-01", "lt": "2024-02-01"}})
        );
    }

    #[test]
    fn test_range_on_text_column_is_dropped() {
        let meta = work_orders();
        let clause =
            build_filter_clause(&filters(json!({"status": {"gt": "a"}})), &meta).unwrap();
        assert!(clause.fragment.is_empty());
        assert!(clause.applied.is_empty());
    }

    #[test]
    fn test_filter_bad_value_is_validation_error() {
        let meta = work_orders();
        let err = build_filter_clause(&filters(json!({"customer_id": "seven"})), &meta)
            .unwrap_err();
        assert_eq!(err.field(), Some("customer_id"));
    }

    #[test]
    fn test_sort_default() {
        let meta = work_orders();
        assert_eq!(
            build_sort_clause(None, None, &meta).unwrap(),
            "created_at DESC, id DESC"
        );
    }

    #[test]
    fn test_sort_whitelisted_case_insensitive_order() {
        let meta = work_orders();
        assert_eq!(
            build_sort_clause(Some("title"), Some("desc"), &meta).unwrap(),
            "title DESC, id DESC"
        );
        assert_eq!(
            build_sort_clause(Some("id"), Some("Asc"), &meta).unwrap(),
            "id ASC"
        );
        assert_eq!(
            build_sort_clause(Some("title"), None, &meta).unwrap(),
            "title ASC, id ASC"
        );
    }

    #[test]
    fn test_sort_rejects_unknown_column() {
        let meta = work_orders();
        let err = build_sort_clause(Some("title; DROP TABLE x"), None, &meta).unwrap_err();
        assert_eq!(err.field(), Some("sortBy"));
        let err = build_sort_clause(Some("description"), None, &meta).unwrap_err();
        assert_eq!(err.field(), Some("sortBy"));
    }

    #[test]
    fn test_sort_rejects_bad_order() {
        let meta = work_orders();
        let err = build_sort_clause(Some("title"), Some("up"), &meta).unwrap_err();
        assert_eq!(err.field(), Some("sortOrder"));
    }

    #[test]
    fn test_composed_clauses_parse_as_postgres() {
        use sqlparser::dialect::PostgreSqlDialect;
        use sqlparser::parser::Parser;

        let meta = work_orders();
        let search = build_search_clause(Some("pump"), &meta.searchable_fields);
        let filter = build_filter_clause(
            &filters(json!({
                "status": ["pending", "assigned"],
                "scheduled_date": {"gte": "2024-01-01"},
                "assigned_technician_id": null
            })),
            &meta,
        )
        .unwrap();
        let order = build_sort_clause(Some("scheduled_date"), Some("DESC"), &meta).unwrap();

        let clause = SqlFragment::and_all([search, filter.fragment]);
        let sql = format!(
            "SELECT * FROM {}{} ORDER BY {} LIMIT 10 OFFSET 0",
            meta.table,
            clause.where_sql(),
            order
        );
        assert_eq!(crate::max_placeholder(&sql), clause.params.len());
        Parser::parse_sql(&PostgreSqlDialect {}, &sql).unwrap();
    }
}
