//! Policy variants and the `(role, resource)` resolver.

use serde::{Deserialize, Serialize};
use std::fmt;

use fieldline_core::{IdentitySource, NullSemantics, PolicyTableConfig, RoleRule, RuleKeyword};

/// How rows of a resource are restricted for a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Policy {
    /// Evaluated, and deliberately imposes no restriction.
    AllRecords,
    /// Rows whose `field` equals the caller's `identity`.
    OwnRecordsByField {
        field: String,
        identity: IdentitySource,
    },
    /// No rows.
    DenyAll,
    /// The resource has no RLS concept.
    NoFilter,
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Policy::AllRecords => write!(f, "AllRecords"),
            Policy::OwnRecordsByField { field, identity } => {
                write!(f, "OwnRecordsByField({} = {})", field, identity)
            }
            Policy::DenyAll => write!(f, "DenyAll"),
            Policy::NoFilter => write!(f, "NoFilter"),
        }
    }
}

/// Where a resolved policy came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicySource {
    /// An explicit rule for the role.
    Declared,
    /// A `null` rule, mapped through the resource's declared semantics.
    NullSemantics(NullSemantics),
    /// Neither the role nor the resource is in the table.
    Undeclared,
}

/// A policy plus its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub policy: Policy,
    pub source: PolicySource,
}

/// Maps `(role, resource)` to a [`Policy`] using the configured table.
///
/// Resolution is pure: no I/O, no logging, no state. Undeclared pairs
/// resolve to `DenyAll`.
#[derive(Debug, Clone, Default)]
pub struct PolicyResolver {
    table: PolicyTableConfig,
}

impl PolicyResolver {
    pub fn new(table: PolicyTableConfig) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &PolicyTableConfig {
        &self.table
    }

    /// Resolve the policy for a role on a resource.
    pub fn resolve(&self, role: &str, resource: &str) -> Policy {
        self.resolve_detailed(role, resource).policy
    }

    /// Resolve and report where the answer came from.
    pub fn resolve_detailed(&self, role: &str, resource: &str) -> Resolution {
        let undeclared = Resolution {
            policy: Policy::DenyAll,
            source: PolicySource::Undeclared,
        };
        let Some(declaration) = self.table.resource(resource) else {
            return undeclared;
        };
        let Some(rule) = declaration.roles.get(role) else {
            return undeclared;
        };

        match rule {
            None => Resolution {
                policy: match declaration.null_semantics {
                    NullSemantics::NoFilter => Policy::NoFilter,
                    NullSemantics::DenyAll => Policy::DenyAll,
                },
                source: PolicySource::NullSemantics(declaration.null_semantics),
            },
            Some(RoleRule::Keyword(keyword)) => Resolution {
                policy: match keyword {
                    RuleKeyword::AllRecords => Policy::AllRecords,
                    RuleKeyword::DenyAll => Policy::DenyAll,
                    RuleKeyword::NoFilter => Policy::NoFilter,
                },
                source: PolicySource::Declared,
            },
            Some(RoleRule::OwnRecords { own_records }) => Resolution {
                policy: Policy::OwnRecordsByField {
                    field: own_records.field.clone(),
                    identity: own_records.identity,
                },
                source: PolicySource::Declared,
            },
        }
    }

    /// Null semantics declared for a resource.
    pub fn null_semantics(&self, resource: &str) -> Option<NullSemantics> {
        self.table.resource(resource).map(|r| r.null_semantics)
    }

    /// Every declared `(role, resource)` pair with its resolved policy.
    pub fn declared_pairs(&self) -> Vec<(String, String, Policy)> {
        let mut pairs = Vec::new();
        for (resource, declaration) in &self.table.resources {
            for role in declaration.roles.keys() {
                pairs.push((role.clone(), resource.clone(), self.resolve(role, resource)));
            }
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldline_core::Catalog;

    fn builtin() -> PolicyResolver {
        PolicyResolver::new(Catalog::builtin().unwrap().policies)
    }

    #[test]
    fn test_same_null_rule_differs_per_resource() {
        let resolver = builtin();
        // Both are written as `null` in the table.
        assert_eq!(resolver.resolve("technician", "roles"), Policy::NoFilter);
        assert_eq!(resolver.resolve("technician", "invoices"), Policy::DenyAll);

        assert_eq!(
            resolver.resolve_detailed("technician", "invoices").source,
            PolicySource::NullSemantics(NullSemantics::DenyAll)
        );
    }

    #[test]
    fn test_declared_rules() {
        let resolver = builtin();
        assert_eq!(resolver.resolve("admin", "invoices"), Policy::AllRecords);
        assert_eq!(resolver.resolve("admin", "roles"), Policy::NoFilter);
        assert_eq!(resolver.resolve("customer", "inventory"), Policy::DenyAll);
        assert_eq!(
            resolver.resolve("customer", "work_orders"),
            Policy::OwnRecordsByField {
                field: "customer_id".to_string(),
                identity: IdentitySource::CustomerProfile,
            }
        );
    }

    #[test]
    fn test_undeclared_pairs_fail_closed() {
        let resolver = builtin();
        let r = resolver.resolve_detailed("auditor", "invoices");
        assert_eq!(r.policy, Policy::DenyAll);
        assert_eq!(r.source, PolicySource::Undeclared);
        assert_eq!(resolver.resolve("admin", "payroll"), Policy::DenyAll);
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let resolver = builtin();
        for _ in 0..3 {
            assert_eq!(resolver.resolve("customer", "invoices"), resolver.resolve("customer", "invoices"));
        }
    }

    #[test]
    fn test_declared_pairs_cover_table() {
        let resolver = builtin();
        let pairs = resolver.declared_pairs();
        assert!(pairs.iter().any(|(role, res, p)| role == "admin" && res == "roles" && *p == Policy::NoFilter));
        assert_eq!(
            pairs.len(),
            resolver.table().resources.values().map(|r| r.roles.len()).sum::<usize>()
        );
    }

    #[test]
    fn test_policy_display() {
        let p = Policy::OwnRecordsByField {
            field: "assigned_technician_id".to_string(),
            identity: IdentitySource::TechnicianProfile,
        };
        assert_eq!(p.to_string(), "OwnRecordsByField(assigned_technician_id = technicianProfileId)");
    }
}
