//! The generic entity service.
//!
//! One implementation serves every entity: all per-entity behavior comes
//! from [`EntityMetadata`] looked up by key.
//!
//! ```text
//! find_all:  metadata -> pagination -> search/filter/sort -> RLS -> COUNT, SELECT
//! find_by_id:                          pk = $1           -> RLS -> SELECT
//! update:    strip -> validate -> RLS lookup -> protected? -> UPDATE
//! delete:                         RLS lookup -> protected? -> UPDATE soft-delete flag
//! ```

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};

use fieldline_core::{
    AuditAction, AuditContext, AuditEvent, EntityMetadata, EntityRegistry, FieldType,
    ValidationError, ValidationErrorKind,
};
use fieldline_query::{
    SqlFragment, SqlValue, build_filter_clause, build_search_clause, build_sort_clause,
    generate_metadata, parse_params,
};
use fieldline_rls::{RlsContext, RlsFilterApplier};
use fieldline_schema::{Operation, SchemaCache};

use crate::error::EntityError;
use crate::store::{EntityStore, Row};
use crate::types::{FindAllPlan, ListOptions, Mutation, QueryResult, ServiceOptions};

/// Metadata-driven CRUD over an [`EntityStore`].
///
/// Holds no per-request state. The schema cache is owned by the instance so
/// separate services never share one. Planning needs no store, so
/// `EntityService<()>` is enough for dry runs.
pub struct EntityService<S> {
    store: S,
    registry: Arc<EntityRegistry>,
    applier: RlsFilterApplier,
    schemas: SchemaCache,
    options: ServiceOptions,
}

impl<S> EntityService<S> {
    pub fn new(store: S, registry: Arc<EntityRegistry>, applier: RlsFilterApplier) -> Self {
        Self {
            store,
            registry,
            applier,
            schemas: SchemaCache::new(),
            options: ServiceOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ServiceOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn schemas(&self) -> &SchemaCache {
        &self.schemas
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Compose the COUNT and SELECT statements for a list request.
    ///
    /// Fails on the first invalid parameter; nothing is executed.
    pub fn plan_find_all(
        &self,
        entity: &str,
        options: &ListOptions,
        ctx: &RlsContext,
    ) -> Result<FindAllPlan, EntityError> {
        let meta = self.registry.get(entity)?;

        let page = parse_params(
            options.page.as_ref(),
            options.limit.as_ref(),
            self.options.default_limit,
            self.options.max_limit,
        )?;
        let search = build_search_clause(options.search.as_deref(), &meta.searchable_fields);
        let filters = build_filter_clause(&options.filters, meta)?;
        let order_by = build_sort_clause(
            options.sort_by.as_deref(),
            options.sort_order.as_deref(),
            meta,
        )?;

        let rls = self
            .applier
            .apply_to(ctx, meta, SqlFragment::and_all([search, filters.fragment]));
        let filtered = rls.fragment();
        let where_sql = filtered.where_sql();

        let count = SqlFragment::new(
            format!("SELECT COUNT(*) AS total FROM {}{}", meta.table, where_sql),
            filtered.params.clone(),
        );
        // Limit and offset are validated integers, never caller text.
        let select = SqlFragment::new(
            format!(
                "SELECT * FROM {}{} ORDER BY {} LIMIT {} OFFSET {}",
                meta.table, where_sql, order_by, page.limit, page.offset
            ),
            filtered.params,
        );

        tracing::debug!(
            entity = %entity,
            table = %meta.table,
            role = %ctx.role,
            rls_applied = rls.rls_applied,
            sql = %select.sql,
            "Planned list query"
        );

        Ok(FindAllPlan {
            entity: entity.to_string(),
            table: meta.table.clone(),
            page,
            count,
            select,
            applied_filters: filters.applied,
            rls,
        })
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    fn pk_predicate(&self, meta: &EntityMetadata, id: &Value) -> Result<SqlFragment, ValidationError> {
        let pk_type = meta
            .field(&meta.primary_key)
            .map(|f| f.field_type)
            .unwrap_or(FieldType::Integer);
        let value = SqlValue::coerce(&meta.primary_key, pk_type, id)?;
        if matches!(value, SqlValue::Null(_)) {
            return Err(ValidationError::not_nullable(&meta.primary_key));
        }
        Ok(SqlFragment::new(format!("{} = $1", meta.primary_key), vec![value]))
    }

    /// `pk = id` restricted to rows the caller can see.
    fn visible_pk_predicate(
        &self,
        meta: &EntityMetadata,
        id: &Value,
        ctx: &RlsContext,
    ) -> Result<SqlFragment, EntityError> {
        let rls = self.applier.apply_to(ctx, meta, self.pk_predicate(meta, id)?);
        Ok(rls.fragment())
    }

    fn select_by_id(
        &self,
        meta: &EntityMetadata,
        id: &Value,
        ctx: &RlsContext,
    ) -> Result<SqlFragment, EntityError> {
        let filtered = self.visible_pk_predicate(meta, id, ctx)?;
        Ok(SqlFragment::new(
            format!("SELECT * FROM {}{} LIMIT 1", meta.table, filtered.where_sql()),
            filtered.params,
        ))
    }

    fn ensure_not_protected(&self, meta: &EntityMetadata, row: &Row) -> Result<(), EntityError> {
        if !meta.is_protected_record(row) {
            return Ok(());
        }
        let identity = row
            .get(&meta.identity_field)
            .map(display_id)
            .unwrap_or_default();
        tracing::warn!(
            entity = %meta.entity_key,
            identity = %identity,
            "Rejected mutation of protected record"
        );
        Err(EntityError::ProtectedResource {
            entity: meta.entity_key.clone(),
            identity,
        })
    }
}

impl<S: EntityStore> EntityService<S> {
    /// List one page of rows visible to the caller.
    ///
    /// COUNT and SELECT run with identical WHERE clauses and parameters.
    /// Without snapshot isolation in the store, `total` may drift from
    /// `data` under concurrent writes.
    pub async fn find_all(
        &self,
        entity: &str,
        options: &ListOptions,
        ctx: &RlsContext,
    ) -> Result<QueryResult, EntityError> {
        let plan = self.plan_find_all(entity, options, ctx)?;

        let total = self.store.fetch_count(&plan.count).await?;
        let data = self.store.fetch_all(&plan.select).await?;

        Ok(QueryResult {
            data,
            pagination: generate_metadata(plan.page.page, plan.page.limit, total.max(0) as u64),
            applied_filters: plan.applied_filters,
            rls_applied: plan.rls.rls_applied,
            timestamp: Utc::now(),
        })
    }

    /// Fetch one row by primary key.
    ///
    /// Returns `None` both when the row does not exist and when RLS hides it.
    pub async fn find_by_id(
        &self,
        entity: &str,
        id: &Value,
        ctx: &RlsContext,
    ) -> Result<Option<Row>, EntityError> {
        let meta = self.registry.get(entity)?;
        let statement = self.select_by_id(meta, id, ctx)?;
        Ok(self.store.fetch_optional(&statement).await?)
    }

    // =========================================================================
    // WRITES
    // =========================================================================

    /// Insert a row from caller input.
    ///
    /// Fields the caller may not set are stripped before validation, so the
    /// statement only ever names creatable columns.
    pub async fn create(
        &self,
        entity: &str,
        data: &Value,
        audit: &AuditContext,
    ) -> Result<Mutation, EntityError> {
        let meta = self.registry.get(entity)?;
        let schema = self.schemas.schema_for(&self.registry, entity, Operation::Create)?;
        let values = schema.validate(data)?;

        let bound = bind_columns(meta, &values)?;
        let columns: Vec<&str> = bound.iter().map(|(c, _)| c.as_str()).collect();
        let placeholders: Vec<String> = (1..=bound.len()).map(|i| format!("${}", i)).collect();
        let statement = SqlFragment::new(
            format!(
                "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
                meta.table,
                columns.join(", "),
                placeholders.join(", ")
            ),
            bound.into_iter().map(|(_, v)| v).collect(),
        );
        tracing::debug!(entity = %entity, table = %meta.table, sql = %statement.sql, "Executing insert");

        let row = self.store.fetch_one(&statement).await?;
        let event = AuditEvent::builder(audit, AuditAction::Create, entity)
            .resource_id(row.get(&meta.primary_key).cloned().unwrap_or(Value::Null))
            .new_values(Value::Object(row.clone()))
            .build();

        Ok(Mutation { row, audit: event })
    }

    /// Apply a partial update to a row the caller can see.
    pub async fn update(
        &self,
        entity: &str,
        id: &Value,
        patch: &Value,
        ctx: &RlsContext,
        audit: &AuditContext,
    ) -> Result<Mutation, EntityError> {
        let meta = self.registry.get(entity)?;
        let schema = self.schemas.schema_for(&self.registry, entity, Operation::Update)?;

        let Value::Object(input) = patch else {
            return Err(ValidationError::new(
                ValidationErrorKind::InvalidType,
                "Input must be a JSON object",
            )
            .into());
        };
        if schema.strip(input).is_empty() {
            return Err(EntityError::MinFields {
                entity: entity.to_string(),
            });
        }
        let values = schema.validate(patch)?;

        let current = self.load_target(meta, id, ctx).await?;
        self.ensure_not_protected(meta, &current)?;

        let mut set = SqlFragment::empty();
        for (column, value) in bind_columns(meta, &values)? {
            set.append(", ", SqlFragment::new(format!("{} = $1", column), vec![value]));
        }
        let mut statement = SqlFragment::new(format!("UPDATE {} SET {}", meta.table, set.sql), set.params);
        statement.append(" WHERE ", self.visible_pk_predicate(meta, id, ctx)?);
        statement.sql.push_str(" RETURNING *");
        tracing::debug!(entity = %entity, table = %meta.table, sql = %statement.sql, "Executing update");

        let row = self.write_target(meta, id, &statement).await?;
        let event = AuditEvent::builder(audit, AuditAction::Update, entity)
            .resource_id(id.clone())
            .old_values(Value::Object(current))
            .new_values(Value::Object(row.clone()))
            .build();

        Ok(Mutation { row, audit: event })
    }

    /// Soft-delete a row by clearing its active flag.
    pub async fn delete(
        &self,
        entity: &str,
        id: &Value,
        ctx: &RlsContext,
        audit: &AuditContext,
    ) -> Result<Mutation, EntityError> {
        let meta = self.registry.get(entity)?;
        let current = self.load_target(meta, id, ctx).await?;
        self.ensure_not_protected(meta, &current)?;

        let mut statement = SqlFragment::new(
            format!("UPDATE {} SET {} = $1", meta.table, meta.soft_delete_field),
            vec![SqlValue::Bool(false)],
        );
        statement.append(" WHERE ", self.visible_pk_predicate(meta, id, ctx)?);
        statement.sql.push_str(" RETURNING *");
        tracing::debug!(entity = %entity, table = %meta.table, sql = %statement.sql, "Executing soft delete");

        let row = self.write_target(meta, id, &statement).await?;
        let event = AuditEvent::builder(audit, AuditAction::Delete, entity)
            .resource_id(id.clone())
            .old_values(Value::Object(current))
            .new_values(Value::Object(row.clone()))
            .build();

        Ok(Mutation { row, audit: event })
    }

    /// Permanently remove a row.
    ///
    /// Never reached through [`delete`](Self::delete); callers opt in by name.
    pub async fn hard_delete(
        &self,
        entity: &str,
        id: &Value,
        ctx: &RlsContext,
        audit: &AuditContext,
    ) -> Result<Mutation, EntityError> {
        let meta = self.registry.get(entity)?;
        let current = self.load_target(meta, id, ctx).await?;
        self.ensure_not_protected(meta, &current)?;

        let mut statement = SqlFragment::new(format!("DELETE FROM {}", meta.table), vec![]);
        statement.append(" WHERE ", self.visible_pk_predicate(meta, id, ctx)?);
        statement.sql.push_str(" RETURNING *");
        tracing::warn!(entity = %entity, table = %meta.table, id = %id, "Executing hard delete");

        let row = self.write_target(meta, id, &statement).await?;
        let event = AuditEvent::builder(audit, AuditAction::HardDelete, entity)
            .resource_id(id.clone())
            .old_values(Value::Object(current))
            .build();

        Ok(Mutation { row, audit: event })
    }

    /// Run a mutation whose WHERE clause repeats the caller's RLS predicate.
    ///
    /// A row that stopped matching after [`load_target`](Self::load_target)
    /// is reported as not found rather than written.
    async fn write_target(
        &self,
        meta: &EntityMetadata,
        id: &Value,
        statement: &SqlFragment,
    ) -> Result<Row, EntityError> {
        self.store
            .fetch_optional(statement)
            .await?
            .ok_or_else(|| EntityError::NotFound {
                entity: meta.entity_key.clone(),
                id: display_id(id),
            })
    }

    /// The row a mutation targets, as visible to the caller.
    async fn load_target(
        &self,
        meta: &EntityMetadata,
        id: &Value,
        ctx: &RlsContext,
    ) -> Result<Row, EntityError> {
        let statement = self.select_by_id(meta, id, ctx)?;
        self.store
            .fetch_optional(&statement)
            .await?
            .ok_or_else(|| EntityError::NotFound {
                entity: meta.entity_key.clone(),
                id: display_id(id),
            })
    }
}

/// Coerce validated input to typed parameters, in column order.
fn bind_columns(
    meta: &EntityMetadata,
    values: &Map<String, Value>,
) -> Result<Vec<(String, SqlValue)>, ValidationError> {
    values
        .iter()
        .map(|(column, value)| {
            let field_type = meta
                .field(column)
                .map(|f| f.field_type)
                .unwrap_or(FieldType::Json);
            SqlValue::coerce(column, field_type, value).map(|v| (column.clone(), v))
        })
        .collect()
}

fn display_id(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
