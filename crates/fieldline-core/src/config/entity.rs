//! Entity metadata definitions.
//!
//! One `EntityMetadata` describes one table: its columns, which of them a
//! write may touch, which of them list queries may search, filter and sort
//! on, and which RLS resource governs its rows.
//!
//! Example (`entities.yaml`):
//! ```yaml
//! entities:
//!   customer:
//!     table: customers
//!     identity_field: email
//!     rls_resource: customers
//!     fields:
//!       id: { type: integer, readonly: true }
//!       email: { type: email, required: true, nullable: false }
//!     field_access:
//!       email: { create: allow, update: allow }
//!     searchable_fields: [email]
//!     filterable_fields: [email]
//!     sortable_fields: [id, email]
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Column type as declared in metadata. Drives value coercion and range filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Text,
    Email,
    Integer,
    Decimal,
    Boolean,
    Date,
    Timestamp,
    Json,
}

impl FieldType {
    /// Whether `gte/gt/lte/lt` range filters make sense for this type.
    pub fn supports_range(&self) -> bool {
        matches!(
            self,
            FieldType::Integer | FieldType::Decimal | FieldType::Date | FieldType::Timestamp
        )
    }

    /// Whether the value is carried as a JSON string.
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            FieldType::String
                | FieldType::Text
                | FieldType::Email
                | FieldType::Date
                | FieldType::Timestamp
        )
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldType::String => "string",
            FieldType::Text => "text",
            FieldType::Email => "email",
            FieldType::Integer => "integer",
            FieldType::Decimal => "decimal",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Timestamp => "timestamp",
            FieldType::Json => "json",
        };
        write!(f, "{}", s)
    }
}

/// A single column definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    #[serde(rename = "type")]
    pub field_type: FieldType,

    /// Must be present on create.
    #[serde(default)]
    pub required: bool,

    /// Never writable, regardless of `field_access`.
    #[serde(default)]
    pub readonly: bool,

    #[serde(default = "default_true")]
    pub nullable: bool,

    /// Regex the (string) value must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    /// Inclusive numeric lower bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    /// Inclusive numeric upper bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,

    /// Allowed values (for status-like columns).
    #[serde(default, rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Per-operation write permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    Allow,
    #[default]
    None,
}

/// Write access for one field. Missing entries mean `none` for both operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FieldAccess {
    #[serde(default)]
    pub create: Access,
    #[serde(default)]
    pub update: Access,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    /// Parse `asc`/`desc` in any letter case.
    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("asc") {
            Some(SortOrder::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Some(SortOrder::Desc)
        } else {
            None
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_sql())
    }
}

/// Default ordering for list queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    #[serde(default)]
    pub order: SortOrder,
}

/// Rows that may never be modified or deleted through the generic layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectedRecords {
    /// Column whose value identifies a protected row.
    pub field: String,
    /// Values of `field` that mark the row as protected.
    pub values: Vec<Value>,
}

/// Static descriptor for one entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityMetadata {
    /// Registry key. Filled from the map key at load time.
    #[serde(default)]
    pub entity_key: String,

    pub table: String,

    #[serde(default = "default_primary_key")]
    pub primary_key: String,

    /// Natural unique key used in user-facing messages (email, sku, ...).
    pub identity_field: String,

    /// Resource name looked up in the RLS policy table.
    pub rls_resource: String,

    #[serde(default)]
    pub system_protected: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protected_records: Option<ProtectedRecords>,

    pub fields: BTreeMap<String, FieldDef>,

    #[serde(default)]
    pub field_access: BTreeMap<String, FieldAccess>,

    #[serde(default)]
    pub immutable_fields: BTreeSet<String>,

    /// Searched in declaration order.
    #[serde(default)]
    pub searchable_fields: Vec<String>,

    #[serde(default)]
    pub filterable_fields: BTreeSet<String>,

    #[serde(default)]
    pub sortable_fields: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_sort: Option<SortSpec>,

    #[serde(default = "default_soft_delete_field")]
    pub soft_delete_field: String,
}

impl EntityMetadata {
    /// Look up a field definition.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.get(name)
    }

    fn access(&self, name: &str) -> FieldAccess {
        self.field_access.get(name).copied().unwrap_or_default()
    }

    /// Check if a field may be supplied on create.
    pub fn can_create(&self, name: &str) -> bool {
        match self.fields.get(name) {
            Some(def) if !def.readonly => self.access(name).create == Access::Allow,
            _ => false,
        }
    }

    /// Check if a field may be supplied on update.
    pub fn can_update(&self, name: &str) -> bool {
        match self.fields.get(name) {
            Some(def) if !def.readonly && !self.immutable_fields.contains(name) => {
                self.access(name).update == Access::Allow
            }
            _ => false,
        }
    }

    /// Fields accepted on create, in column order.
    pub fn creatable_fields(&self) -> impl Iterator<Item = (&str, &FieldDef)> {
        self.fields
            .iter()
            .filter(|(name, _)| self.can_create(name))
            .map(|(name, def)| (name.as_str(), def))
    }

    /// Fields accepted on update, in column order.
    pub fn updatable_fields(&self) -> impl Iterator<Item = (&str, &FieldDef)> {
        self.fields
            .iter()
            .filter(|(name, _)| self.can_update(name))
            .map(|(name, def)| (name.as_str(), def))
    }

    /// Fields that must be present on create.
    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(_, def)| def.required)
            .map(|(name, _)| name.as_str())
    }

    /// Ordering used when the caller does not pick one.
    pub fn effective_default_sort(&self) -> SortSpec {
        self.default_sort.clone().unwrap_or_else(|| SortSpec {
            field: self.primary_key.clone(),
            order: SortOrder::Asc,
        })
    }

    /// Whether `row` is one of the entity's protected records.
    ///
    /// Only entities flagged `system_protected` have protected records.
    pub fn is_protected_record(&self, row: &Map<String, Value>) -> bool {
        if !self.system_protected {
            return false;
        }
        match &self.protected_records {
            Some(rule) => row
                .get(&rule.field)
                .map(|v| rule.values.contains(v))
                .unwrap_or(false),
            // Flagged without a rule: every row is protected.
            None => true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_primary_key() -> String {
    "id".to_string()
}

fn default_soft_delete_field() -> String {
    "is_active".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn role_metadata() -> EntityMetadata {
        let yaml = r#"
table: roles
identity_field: name
rls_resource: roles
system_protected: true
protected_records:
  field: name
  values: [admin, customer]
fields:
  id: { type: integer, readonly: true }
  name: { type: string, required: true }
  description: { type: text }
  priority: { type: integer, min: 0 }
  created_at: { type: timestamp, readonly: true }
field_access:
  name: { create: allow, update: allow }
  description: { create: allow, update: allow }
  priority: { create: allow }
  created_at: { create: allow, update: allow }
immutable_fields: [name]
"#;
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_absent_field_access_is_fail_closed() {
        let meta = role_metadata();
        assert!(!meta.can_create("id"));
        assert!(!meta.can_update("id"));
        assert!(!meta.can_create("unknown"));
    }

    #[test]
    fn test_readonly_overrides_field_access() {
        let meta = role_metadata();
        assert!(!meta.can_create("created_at"));
        assert!(!meta.can_update("created_at"));
    }

    #[test]
    fn test_immutable_fields_not_updatable() {
        let meta = role_metadata();
        assert!(meta.can_create("name"));
        assert!(!meta.can_update("name"));
        assert!(meta.can_update("description"));
        assert!(!meta.can_update("priority"));
    }

    #[test]
    fn test_creatable_and_updatable_lists() {
        let meta = role_metadata();
        let creatable: Vec<&str> = meta.creatable_fields().map(|(n, _)| n).collect();
        assert_eq!(creatable, vec!["description", "name", "priority"]);
        let updatable: Vec<&str> = meta.updatable_fields().map(|(n, _)| n).collect();
        assert_eq!(updatable, vec!["description"]);
    }

    #[test]
    fn test_protected_record_detection() {
        let meta = role_metadata();
        let admin = json!({"id": 1, "name": "admin"});
        let custom = json!({"id": 9, "name": "auditor"});
        assert!(meta.is_protected_record(admin.as_object().unwrap()));
        assert!(!meta.is_protected_record(custom.as_object().unwrap()));
    }

    #[test]
    fn test_defaults() {
        let meta = role_metadata();
        assert_eq!(meta.primary_key, "id");
        assert_eq!(meta.soft_delete_field, "is_active");
        let sort = meta.effective_default_sort();
        assert_eq!(sort.field, "id");
        assert_eq!(sort.order, SortOrder::Asc);
        assert!(meta.field("description").unwrap().nullable);
    }

    #[test]
    fn test_sort_order_parse_is_case_insensitive() {
        assert_eq!(SortOrder::parse("desc"), Some(SortOrder::Desc));
        assert_eq!(SortOrder::parse("AsC"), Some(SortOrder::Asc));
        assert_eq!(SortOrder::parse("ascending"), None);
    }
}
