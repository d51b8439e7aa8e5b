//! RLS policy table configuration.
//!
//! The table maps each resource to per-role rules. Every resource must
//! declare what a bare `null` rule means for it, because reference data and
//! financial data read the same `null` in opposite ways:
//!
//! ```yaml
//! resources:
//!   roles:
//!     null_semantics: no_filter
//!     roles:
//!       admin: null
//!   invoices:
//!     null_semantics: deny_all
//!     roles:
//!       admin: all_records
//!       customer:
//!         own_records: { field: customer_id, identity: customer_profile }
//!       technician: null
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::ConfigError;

/// What a `null` rule means for a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullSemantics {
    /// The resource has no RLS concept; queries run unrestricted.
    NoFilter,
    /// Nothing is visible.
    DenyAll,
}

/// Which identifier of the caller an ownership rule compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    User,
    CustomerProfile,
    TechnicianProfile,
}

impl fmt::Display for IdentitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentitySource::User => write!(f, "userId"),
            IdentitySource::CustomerProfile => write!(f, "customerProfileId"),
            IdentitySource::TechnicianProfile => write!(f, "technicianProfileId"),
        }
    }
}

/// Keyword rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKeyword {
    AllRecords,
    DenyAll,
    NoFilter,
}

/// Ownership rule: rows where `field` equals the caller's `identity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnRecordsRule {
    pub field: String,
    pub identity: IdentitySource,
}

/// A role's rule for one resource, as written in YAML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoleRule {
    /// `all_records`, `deny_all` or `no_filter`.
    Keyword(RuleKeyword),
    /// `{ own_records: { field, identity } }`.
    OwnRecords { own_records: OwnRecordsRule },
}

/// Policy declaration for one resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcePolicy {
    /// Required. There is no default.
    pub null_semantics: NullSemantics,

    /// Role name to rule. A YAML `null` is stored as `None` and resolved
    /// through `null_semantics`.
    #[serde(default)]
    pub roles: BTreeMap<String, Option<RoleRule>>,
}

/// The complete `(role, resource)` policy table.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PolicyTableConfig {
    #[serde(default)]
    pub resources: BTreeMap<String, ResourcePolicy>,
}

impl PolicyTableConfig {
    /// Parse a policy table from YAML.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let table: Self = serde_yaml::from_str(content)?;
        table.check()?;
        Ok(table)
    }

    /// Look up a resource declaration.
    pub fn resource(&self, name: &str) -> Option<&ResourcePolicy> {
        self.resources.get(name)
    }

    /// All role names that appear anywhere in the table.
    pub fn role_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .resources
            .values()
            .flat_map(|r| r.roles.keys().map(|k| k.as_str()))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    fn check(&self) -> Result<(), ConfigError> {
        for (resource, policy) in &self.resources {
            for (role, rule) in &policy.roles {
                if let Some(RoleRule::OwnRecords { own_records }) = rule {
                    if !super::is_identifier(&own_records.field) {
                        return Err(ConfigError::Config(format!(
                            "resources.{}.roles.{}: invalid ownership column '{}'",
                            resource, role, own_records.field
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rule_shapes() {
        let yaml = r#"
resources:
  invoices:
    null_semantics: deny_all
    roles:
      admin: all_records
      dispatcher: no_filter
      technician: null
      customer:
        own_records:
          field: customer_id
          identity: customer_profile
"#;
        let table = PolicyTableConfig::from_yaml(yaml).unwrap();
        let invoices = table.resource("invoices").unwrap();
        assert_eq!(invoices.null_semantics, NullSemantics::DenyAll);
        assert_eq!(
            invoices.roles["admin"],
            Some(RoleRule::Keyword(RuleKeyword::AllRecords))
        );
        assert_eq!(invoices.roles["technician"], None);
        assert_eq!(
            invoices.roles["customer"],
            Some(RoleRule::OwnRecords {
                own_records: OwnRecordsRule {
                    field: "customer_id".to_string(),
                    identity: IdentitySource::CustomerProfile,
                }
            })
        );
    }

    #[test]
    fn test_missing_null_semantics_is_rejected() {
        let yaml = r#"
resources:
  roles:
    roles:
      admin: null
"#;
        let err = PolicyTableConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("null_semantics"));
    }

    #[test]
    fn test_invalid_ownership_column_rejected() {
        let yaml = r#"
resources:
  work_orders:
    null_semantics: deny_all
    roles:
      customer:
        own_records: { field: "customer_id; drop table x", identity: customer_profile }
"#;
        assert!(matches!(
            PolicyTableConfig::from_yaml(yaml),
            Err(ConfigError::Config(_))
        ));
    }

    #[test]
    fn test_role_names_are_deduplicated() {
        let yaml = r#"
resources:
  a: { null_semantics: no_filter, roles: { admin: null, customer: deny_all } }
  b: { null_semantics: deny_all, roles: { admin: all_records } }
"#;
        let table = PolicyTableConfig::from_yaml(yaml).unwrap();
        assert_eq!(table.role_names(), vec!["admin", "customer"]);
    }
}
