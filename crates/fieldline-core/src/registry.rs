//! Entity metadata registry.
//!
//! The registry is loaded once and never mutated. Loading runs every
//! consistency check up front so the query and write paths can trust
//! metadata-derived identifiers without re-checking them.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;

use crate::config::{
    ConfigError, EntityMetadata, FieldType, FieldlineConfig, PolicyTableConfig, RoleRule,
    is_identifier,
};
use crate::error::RegistryError;

/// Entity metadata compiled into the binary.
pub const BUILTIN_ENTITIES: &str = include_str!("../metadata/entities.yaml");

/// RLS policy table compiled into the binary.
pub const BUILTIN_RLS: &str = include_str!("../metadata/rls.yaml");

#[derive(Debug, Deserialize)]
struct EntitiesFile {
    #[serde(default)]
    entities: BTreeMap<String, EntityMetadata>,
}

/// Read-only lookup of entity metadata by key.
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    entities: BTreeMap<String, EntityMetadata>,
}

impl EntityRegistry {
    /// Parse and check entity metadata.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let registry = Self::parse(content)?;
        fail_on_errors(registry.lint(None))?;
        Ok(registry)
    }

    fn parse(content: &str) -> Result<Self, ConfigError> {
        let file: EntitiesFile = serde_yaml::from_str(content)?;
        let entities = file
            .entities
            .into_iter()
            .map(|(key, mut meta)| {
                meta.entity_key = key.clone();
                (key, meta)
            })
            .collect();
        Ok(Self { entities })
    }

    /// The built-in field-service entities.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_yaml(BUILTIN_ENTITIES)
    }

    /// Get metadata for an entity.
    pub fn get(&self, key: &str) -> Result<&EntityMetadata, RegistryError> {
        self.entities
            .get(key)
            .ok_or_else(|| RegistryError::UnknownEntity {
                key: key.to_string(),
            })
    }

    /// Entity keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityMetadata> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Check metadata consistency, optionally against a policy table.
    ///
    /// Returns every problem found rather than stopping at the first.
    pub fn lint(&self, policies: Option<&PolicyTableConfig>) -> Vec<MetadataIssue> {
        let mut issues = Vec::new();
        for (key, meta) in &self.entities {
            lint_entity(key, meta, &mut issues);
            if let Some(policies) = policies {
                lint_entity_policy(key, meta, policies, &mut issues);
            }
        }

        if let Some(policies) = policies {
            for resource in policies.resources.keys() {
                if !self.entities.values().any(|m| &m.rls_resource == resource) {
                    issues.push(MetadataIssue::warning(
                        format!("resources.{}", resource),
                        "resource is not used by any entity",
                    ));
                }
            }
        }
        issues
    }
}

/// Entity registry plus the policy table it was checked against.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub entities: EntityRegistry,
    pub policies: PolicyTableConfig,
}

impl Catalog {
    /// Parse both documents and cross-check them.
    pub fn from_yaml(entities: &str, rls: &str) -> Result<Self, ConfigError> {
        let entities = EntityRegistry::from_yaml(entities)?;
        let policies = PolicyTableConfig::from_yaml(rls)?;
        fail_on_errors(entities.lint(Some(&policies)))?;
        Ok(Self { entities, policies })
    }

    /// The built-in entities and policy table.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_yaml(BUILTIN_ENTITIES, BUILTIN_RLS)
    }

    /// Every consistency issue in both documents.
    ///
    /// Unlike [`Catalog::from_yaml`], lint errors are returned rather than
    /// failing the load. Malformed YAML still fails.
    pub fn lint_yaml(entities: &str, rls: &str) -> Result<Vec<MetadataIssue>, ConfigError> {
        let entities = EntityRegistry::parse(entities)?;
        let policies = PolicyTableConfig::from_yaml(rls)?;
        Ok(entities.lint(Some(&policies)))
    }

    /// Load the documents a config points at, falling back to built-ins.
    pub fn from_config(config: &FieldlineConfig) -> Result<Self, ConfigError> {
        let entities = config.read_entities()?;
        let rls = config.read_rls()?;
        Self::from_yaml(
            entities.as_deref().unwrap_or(BUILTIN_ENTITIES),
            rls.as_deref().unwrap_or(BUILTIN_RLS),
        )
    }
}

/// How serious a metadata problem is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    Warning,
    Error,
}

/// A problem found while checking metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataIssue {
    pub severity: IssueSeverity,
    /// Dotted path, e.g. `entities.user.sortable_fields`.
    pub location: String,
    pub message: String,
}

impl MetadataIssue {
    fn error(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Error,
            location: location.into(),
            message: message.into(),
        }
    }

    fn warning(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Warning,
            location: location.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for MetadataIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

fn fail_on_errors(issues: Vec<MetadataIssue>) -> Result<(), ConfigError> {
    let errors: Vec<String> = issues
        .iter()
        .filter(|i| i.severity == IssueSeverity::Error)
        .map(|i| i.to_string())
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Config(errors.join("; ")))
    }
}

fn lint_entity(key: &str, meta: &EntityMetadata, issues: &mut Vec<MetadataIssue>) {
    let loc = |section: &str| format!("entities.{}.{}", key, section);

    if !is_identifier(key) {
        issues.push(MetadataIssue::error(
            format!("entities.{}", key),
            "entity key must match ^[a-z_][a-z0-9_]*$",
        ));
    }
    if !is_identifier(&meta.table) {
        issues.push(MetadataIssue::error(
            loc("table"),
            format!("'{}' is not a valid table name", meta.table),
        ));
    }
    if meta.fields.is_empty() {
        issues.push(MetadataIssue::error(loc("fields"), "entity declares no fields"));
    }

    for (name, def) in &meta.fields {
        if !is_identifier(name) {
            issues.push(MetadataIssue::error(
                loc("fields"),
                format!("'{}' is not a valid column name", name),
            ));
        }
        if let Some(pattern) = &def.pattern {
            if let Err(e) = regex::Regex::new(pattern) {
                issues.push(MetadataIssue::error(
                    format!("entities.{}.fields.{}.pattern", key, name),
                    format!("invalid regex: {}", e),
                ));
            }
        }
        if def.required && !meta.can_create(name) {
            issues.push(MetadataIssue::error(
                format!("entities.{}.fields.{}", key, name),
                "required field is not creatable",
            ));
        }
    }

    let mut must_exist = |section: &str, field: &str| {
        if !meta.fields.contains_key(field) {
            issues.push(MetadataIssue::error(
                loc(section),
                format!("references undeclared field '{}'", field),
            ));
        }
    };

    must_exist("primary_key", &meta.primary_key);
    must_exist("identity_field", &meta.identity_field);
    must_exist("soft_delete_field", &meta.soft_delete_field);
    if let Some(sort) = &meta.default_sort {
        must_exist("default_sort", &sort.field);
    }
    if let Some(rule) = &meta.protected_records {
        must_exist("protected_records", &rule.field);
    }
    for f in meta.field_access.keys() {
        must_exist("field_access", f);
    }
    for f in &meta.immutable_fields {
        must_exist("immutable_fields", f);
    }
    for f in &meta.searchable_fields {
        must_exist("searchable_fields", f);
    }
    for f in &meta.filterable_fields {
        must_exist("filterable_fields", f);
    }
    for f in &meta.sortable_fields {
        must_exist("sortable_fields", f);
    }

    if let Some(sort) = &meta.default_sort {
        if !meta.sortable_fields.is_empty() && !meta.sortable_fields.contains(&sort.field) {
            issues.push(MetadataIssue::warning(
                loc("default_sort"),
                format!("'{}' is not in sortable_fields", sort.field),
            ));
        }
    }

    if let Some(def) = meta.fields.get(&meta.soft_delete_field) {
        if def.field_type != FieldType::Boolean {
            issues.push(MetadataIssue::error(
                loc("soft_delete_field"),
                format!("'{}' must be a boolean column", meta.soft_delete_field),
            ));
        }
    }

    if meta.creatable_fields().next().is_none() {
        issues.push(MetadataIssue::warning(
            loc("field_access"),
            "no field is creatable; create will always fail",
        ));
    }
    if meta.system_protected && meta.protected_records.is_none() {
        issues.push(MetadataIssue::warning(
            loc("system_protected"),
            "no protected_records rule; every row is protected",
        ));
    }
}

fn lint_entity_policy(
    key: &str,
    meta: &EntityMetadata,
    policies: &PolicyTableConfig,
    issues: &mut Vec<MetadataIssue>,
) {
    let Some(resource) = policies.resource(&meta.rls_resource) else {
        issues.push(MetadataIssue::error(
            format!("entities.{}.rls_resource", key),
            format!(
                "resource '{}' has no declaration in the policy table",
                meta.rls_resource
            ),
        ));
        return;
    };

    for (role, rule) in &resource.roles {
        if let Some(RoleRule::OwnRecords { own_records }) = rule {
            if !meta.fields.contains_key(&own_records.field) {
                issues.push(MetadataIssue::error(
                    format!("resources.{}.roles.{}", meta.rls_resource, role),
                    format!(
                        "ownership column '{}' does not exist on entity '{}'",
                        own_records.field, key
                    ),
                ));
            }
        }
    }
}
