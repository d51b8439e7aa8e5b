//! RLS clause injection.
//!
//! Merges a resolved policy into an existing WHERE clause:
//!
//! | Policy              | Clause                         | `rls_applied` |
//! |---------------------|--------------------------------|---------------|
//! | `NoFilter`          | unchanged                      | false         |
//! | `AllRecords`        | unchanged                      | true          |
//! | `OwnRecordsByField` | `(<existing>) AND field = $N`  | true          |
//! | `DenyAll`           | `(<existing>) AND 1=0`         | true          |

use fieldline_core::EntityMetadata;
use fieldline_core::config::is_identifier;
use fieldline_query::{SqlFragment, SqlValue};

use crate::context::RlsContext;
use crate::policy::{Policy, PolicyResolver, PolicySource};

/// Clause matching zero rows.
const MATCH_NOTHING: &str = "1=0";

/// Applies RLS policies to WHERE clauses.
#[derive(Debug, Clone, Default)]
pub struct RlsFilterApplier {
    resolver: PolicyResolver,
}

impl RlsFilterApplier {
    pub fn new(resolver: PolicyResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &PolicyResolver {
        &self.resolver
    }

    /// The policy governing `entity` for this caller.
    ///
    /// A pre-resolved policy in the context is only trusted for the resource
    /// it was resolved for. An ownership rule naming a column the entity does
    /// not declare becomes `DenyAll`, whatever its source.
    pub fn policy_for(&self, ctx: &RlsContext, entity: &EntityMetadata) -> Policy {
        let resource = entity.rls_resource.as_str();
        let policy = match &ctx.policy {
            Some(policy) if ctx.resource == resource => policy.clone(),
            _ => {
                let resolution = self.resolver.resolve_detailed(&ctx.role, resource);
                if resolution.source == PolicySource::Undeclared {
                    tracing::warn!(
                        role = %ctx.role,
                        resource = %resource,
                        "No RLS rule declared for role; denying all rows"
                    );
                }
                resolution.policy
            }
        };

        if let Policy::OwnRecordsByField { field, .. } = &policy {
            if !is_identifier(field) || entity.field(field).is_none() {
                tracing::warn!(
                    role = %ctx.role,
                    entity = %entity.entity_key,
                    field = %field,
                    "Ownership policy names an undeclared column; denying all rows"
                );
                return Policy::DenyAll;
            }
        }
        policy
    }

    /// Apply the caller's policy for `entity` to `existing`.
    pub fn apply_to(&self, ctx: &RlsContext, entity: &EntityMetadata, existing: SqlFragment) -> RlsApplication {
        let policy = self.policy_for(ctx, entity);
        let applied = apply_policy(&policy, ctx, existing);
        tracing::debug!(
            role = %ctx.role,
            resource = %entity.rls_resource,
            policy = %policy,
            rls_applied = applied.rls_applied,
            "Applied RLS policy"
        );
        applied
    }
}

/// Merge `policy` into `existing`.
///
/// An ownership rule whose identity is missing from the context, or whose
/// column is not a plain identifier, fails closed as `DenyAll`.
pub fn apply_policy(policy: &Policy, ctx: &RlsContext, existing: SqlFragment) -> RlsApplication {
    match policy {
        Policy::NoFilter => RlsApplication::unchanged(policy.clone(), existing, false),
        Policy::AllRecords => RlsApplication::unchanged(policy.clone(), existing, true),
        Policy::DenyAll => RlsApplication::denied(existing),
        Policy::OwnRecordsByField { field, .. } if !is_identifier(field) => {
            tracing::warn!(
                role = %ctx.role,
                resource = %ctx.resource,
                "Ownership policy column is not an identifier; denying all rows"
            );
            RlsApplication::denied(existing)
        }
        Policy::OwnRecordsByField { field, identity } => match ctx.identity(*identity) {
            Some(id) => RlsApplication::restricted(
                policy.clone(),
                existing,
                SqlFragment::new(format!("{} = $1", field), vec![SqlValue::Int(id)]),
            ),
            None => {
                tracing::warn!(
                    role = %ctx.role,
                    resource = %ctx.resource,
                    identity = %identity,
                    "Ownership policy without identity in context; denying all rows"
                );
                RlsApplication::denied(existing)
            }
        },
    }
}

/// Result of applying RLS to a clause.
#[derive(Debug, Clone, PartialEq)]
pub struct RlsApplication {
    /// Final WHERE clause body, without the `WHERE` keyword. May be empty.
    pub where_clause: String,
    /// Parameters for `where_clause`, numbered `$1..$n`.
    pub values: Vec<SqlValue>,
    /// Whether a policy was evaluated for this resource.
    pub rls_applied: bool,
    /// The policy that was actually enforced.
    pub policy: Policy,
}

impl RlsApplication {
    fn unchanged(policy: Policy, existing: SqlFragment, rls_applied: bool) -> Self {
        Self {
            where_clause: existing.sql,
            values: existing.params,
            rls_applied,
            policy,
        }
    }

    fn restricted(policy: Policy, existing: SqlFragment, rls: SqlFragment) -> Self {
        // Parenthesize so an OR inside the existing clause cannot escape the RLS predicate.
        let mut out = existing.parenthesized();
        out.append(" AND ", rls);
        Self {
            where_clause: out.sql,
            values: out.params,
            rls_applied: true,
            policy,
        }
    }

    fn denied(existing: SqlFragment) -> Self {
        Self::restricted(Policy::DenyAll, existing, SqlFragment::new(MATCH_NOTHING, vec![]))
    }

    /// The merged clause as a fragment, for further composition.
    pub fn fragment(&self) -> SqlFragment {
        SqlFragment::new(self.where_clause.clone(), self.values.clone())
    }

    /// Whether the enforced policy can match no rows at all.
    pub fn denies_all(&self) -> bool {
        self.policy == Policy::DenyAll
    }

    /// Human-readable summary for operators.
    pub fn explain(&self) -> String {
        let mut out = format!("policy: {}\nrls_applied: {}\n", self.policy, self.rls_applied);
        if self.where_clause.is_empty() {
            out.push_str("where: <none>\n");
        } else {
            out.push_str(&format!("where: {}\n", self.where_clause));
        }
        for (i, v) in self.values.iter().enumerate() {
            out.push_str(&format!("  ${} = {}\n", i + 1, v));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldline_core::{Catalog, EntityRegistry, IdentitySource};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn catalog() -> Catalog {
        Catalog::builtin().unwrap()
    }

    fn applier_for(catalog: &Catalog) -> RlsFilterApplier {
        RlsFilterApplier::new(PolicyResolver::new(catalog.policies.clone()))
    }

    fn apply(ctx: &RlsContext, entity: &str, existing: SqlFragment) -> RlsApplication {
        let catalog = catalog();
        let meta = catalog.entities.get(entity).unwrap();
        applier_for(&catalog).apply_to(ctx, meta, existing)
    }

    fn entity_for_resource<'a>(registry: &'a EntityRegistry, resource: &str) -> &'a EntityMetadata {
        registry
            .iter()
            .find(|meta| meta.rls_resource == resource)
            .unwrap_or_else(|| panic!("no entity for resource {}", resource))
    }

    fn existing() -> SqlFragment {
        SqlFragment::new(
            "status = $1 OR priority = $2",
            vec![SqlValue::Text("pending".into()), SqlValue::Text("urgent".into())],
        )
    }

    #[test]
    fn test_no_filter_is_unchanged_and_not_applied() {
        let ctx = RlsContext::new("admin", 1, "roles");
        let out = apply(&ctx, "role", existing());
        assert_eq!(out.policy, Policy::NoFilter);
        assert!(!out.rls_applied);
        assert_eq!(out.where_clause, "status = $1 OR priority = $2");
        assert_eq!(out.values.len(), 2);
    }

    #[test]
    fn test_all_records_is_unchanged_but_applied() {
        let ctx = RlsContext::new("admin", 1, "invoices");
        let out = apply(&ctx, "invoice", existing());
        assert!(out.rls_applied);
        assert_eq!(out.where_clause, "status = $1 OR priority = $2");
    }

    #[test]
    fn test_own_records_appends_renumbered_predicate() {
        let ctx = RlsContext::new("customer", 3, "work_orders").with_customer_profile(7);
        let out = apply(&ctx, "work_order", existing());
        assert!(out.rls_applied);
        assert_eq!(
            out.where_clause,
            "(status = $1 OR priority = $2) AND customer_id = $3"
        );
        assert_eq!(out.values[2], SqlValue::Int(7));
    }

    #[test]
    fn test_own_records_on_empty_clause() {
        let ctx = RlsContext::new("technician", 3, "work_orders").with_technician_profile(9);
        let out = apply(&ctx, "work_order", SqlFragment::empty());
        assert_eq!(out.where_clause, "assigned_technician_id = $1");
        assert_eq!(out.values, vec![SqlValue::Int(9)]);
    }

    #[test]
    fn test_own_records_by_user_id() {
        let ctx = RlsContext::new("customer", 42, "users");
        let out = apply(&ctx, "user", SqlFragment::empty());
        assert_eq!(out.where_clause, "id = $1");
        assert_eq!(out.values, vec![SqlValue::Int(42)]);
    }

    #[test]
    fn test_missing_identity_fails_closed() {
        let ctx = RlsContext::new("customer", 3, "invoices");
        let out = apply(&ctx, "invoice", existing());
        assert!(out.denies_all());
        assert!(out.rls_applied);
        assert!(out.where_clause.ends_with("AND 1=0"));
    }

    #[test]
    fn test_deny_all_matches_nothing_regardless_of_existing() {
        let ctx = RlsContext::new("technician", 3, "invoices").with_technician_profile(2);
        for clause in [
            SqlFragment::empty(),
            existing(),
            SqlFragment::new("1=1 OR id = $1", vec![SqlValue::Int(5)]),
        ] {
            let out = apply(&ctx, "invoice", clause);
            assert!(out.rls_applied);
            assert!(out.where_clause == "1=0" || out.where_clause.ends_with(") AND 1=0"));
        }
    }

    #[test]
    fn test_every_declared_null_pair_follows_resource_semantics() {
        use fieldline_core::NullSemantics;
        let catalog = catalog();
        let applier = applier_for(&catalog);
        for (resource, declaration) in &applier.resolver().table().resources {
            let meta = entity_for_resource(&catalog.entities, resource);
            for (role, rule) in &declaration.roles {
                if rule.is_some() {
                    continue;
                }
                let ctx = RlsContext::new(role.clone(), 1, resource.clone());
                let out = applier.apply_to(&ctx, meta, existing());
                match declaration.null_semantics {
                    NullSemantics::NoFilter => {
                        assert!(!out.rls_applied, "{}/{}", role, resource);
                        assert_eq!(out.where_clause, existing().sql);
                    }
                    NullSemantics::DenyAll => {
                        assert!(out.rls_applied, "{}/{}", role, resource);
                        assert!(out.where_clause.ends_with("AND 1=0"));
                    }
                }
            }
        }
    }

    #[test]
    fn test_pre_resolved_policy_only_for_its_resource() {
        let catalog = catalog();
        let applier = applier_for(&catalog);
        let ctx = RlsContext::new("customer", 3, "work_orders")
            .with_customer_profile(7)
            .with_policy(Policy::AllRecords);

        let work_order = catalog.entities.get("work_order").unwrap();
        let invoice = catalog.entities.get("invoice").unwrap();
        assert_eq!(applier.policy_for(&ctx, work_order), Policy::AllRecords);
        assert_eq!(
            applier.policy_for(&ctx, invoice),
            Policy::OwnRecordsByField {
                field: "customer_id".to_string(),
                identity: IdentitySource::CustomerProfile,
            }
        );
    }

    #[test]
    fn test_pre_resolved_ownership_column_is_not_interpolated() {
        let ctx: RlsContext = serde_json::from_value(json!({
            "role": "customer",
            "userId": 3,
            "customerProfileId": 7,
            "resource": "invoices",
            "policy": {
                "type": "own_records_by_field",
                "field": "1=1 OR customer_id",
                "identity": "customer_profile"
            }
        }))
        .unwrap();

        let out = apply(&ctx, "invoice", SqlFragment::empty());
        assert!(out.denies_all());
        assert_eq!(out.where_clause, "1=0");
        assert!(out.values.is_empty());
    }

    #[test]
    fn test_pre_resolved_ownership_column_must_exist_on_entity() {
        let ctx = RlsContext::new("customer", 3, "invoices")
            .with_customer_profile(7)
            .with_policy(Policy::OwnRecordsByField {
                field: "owner_id".to_string(),
                identity: IdentitySource::CustomerProfile,
            });

        let out = apply(&ctx, "invoice", existing());
        assert!(out.denies_all());
        assert!(out.rls_applied);
        assert_eq!(out.where_clause, "(status = $1 OR priority = $2) AND 1=0");
        assert!(!out.where_clause.contains("owner_id"));
    }

    #[test]
    fn test_apply_policy_rejects_non_identifier_column() {
        let ctx = RlsContext::new("customer", 3, "invoices").with_customer_profile(7);
        let policy = Policy::OwnRecordsByField {
            field: "customer_id; drop table invoices".to_string(),
            identity: IdentitySource::CustomerProfile,
        };
        let out = apply_policy(&policy, &ctx, SqlFragment::empty());
        assert_eq!(out.policy, Policy::DenyAll);
        assert_eq!(out.where_clause, "1=0");
    }

    #[test]
    fn test_explain_lists_params() {
        let ctx = RlsContext::new("customer", 3, "work_orders").with_customer_profile(7);
        let text = apply(&ctx, "work_order", SqlFragment::empty()).explain();
        assert!(text.contains("policy: OwnRecordsByField(customer_id = customerProfileId)"));
        assert!(text.contains("$1 = 7"));
    }
}
