//! `fieldline check` command implementation.
//!
//! Validates configuration for consistency and correctness:
//! - Configuration file and pagination limits
//! - Entity metadata consistency (identifiers, whitelists, field access)
//! - RLS policy table cross-checks against entity metadata
//! - Role coverage across resources

use anyhow::Result;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use fieldline_core::{
    BUILTIN_ENTITIES, BUILTIN_RLS, Catalog, FieldlineConfig, IssueSeverity, MetadataIssue,
    NullSemantics, PolicyTableConfig,
};
use fieldline_schema::{Operation, SchemaCache};

// ============================================================================
// Check Result Types
// ============================================================================

/// Severity level for check results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Informational message.
    Info,
    /// Warning - may indicate a potential issue.
    Warning,
    /// Error - configuration is invalid.
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARN"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// A single check finding.
#[derive(Debug, Clone)]
pub struct CheckFinding {
    pub severity: Severity,
    /// Category of the check that produced this finding.
    pub category: String,
    pub message: String,
    /// Optional file the finding refers to.
    pub file: Option<PathBuf>,
    /// Optional location within the document (e.g., "entities.user.sortable_fields").
    pub location: Option<String>,
}

impl CheckFinding {
    fn error(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, category, message)
    }

    fn warning(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, category, message)
    }

    fn info(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, category, message)
    }

    fn new(severity: Severity, category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            category: category.into(),
            message: message.into(),
            file: None,
            location: None,
        }
    }

    fn with_file(mut self, file: Option<&PathBuf>) -> Self {
        self.file = file.cloned();
        self
    }

    fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Results from running all checks.
#[derive(Debug, Default)]
pub struct CheckResults {
    pub findings: Vec<CheckFinding>,
}

impl CheckResults {
    fn extend(&mut self, findings: impl IntoIterator<Item = CheckFinding>) {
        self.findings.extend(findings);
    }

    /// Returns true if there are any errors.
    pub fn has_errors(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::Error)
    }

    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    fn count(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }

    /// Print human-readable summary, most severe first.
    pub fn print_summary(&self) {
        for severity in [Severity::Error, Severity::Warning, Severity::Info] {
            let mut group: Vec<_> = self
                .findings
                .iter()
                .filter(|f| f.severity == severity)
                .collect();
            if group.is_empty() {
                continue;
            }
            group.sort_by(|a, b| a.category.cmp(&b.category));

            println!("\n{} ({}):", severity, group.len());
            println!("{}", "-".repeat(60));
            for finding in group {
                print_finding(finding);
            }
        }

        println!();
        println!("{}", "=".repeat(60));
        if !self.has_errors() && self.warning_count() == 0 {
            println!("All checks passed.");
        } else {
            println!(
                "Summary: {} error(s), {} warning(s)",
                self.error_count(),
                self.warning_count()
            );
        }
    }
}

fn print_finding(finding: &CheckFinding) {
    let location = match (&finding.file, &finding.location) {
        (Some(f), Some(l)) => format!(" [{}:{}]", f.display(), l),
        (Some(f), None) => format!(" [{}]", f.display()),
        (None, Some(l)) => format!(" [{}]", l),
        (None, None) => String::new(),
    };

    println!(
        "  {} [{}]{}: {}",
        finding.severity, finding.category, location, finding.message
    );
}

// ============================================================================
// Main Check Runner
// ============================================================================

/// Run all checks without printing.
pub fn run_quiet(config_path: Option<&Path>) -> Result<CheckResults> {
    let mut results = CheckResults::default();

    // 1. Main configuration file
    let config = match super::load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            results.extend([CheckFinding::error("config", format!("{:#}", e))]);
            return Ok(results);
        }
    };

    // 2. Metadata and policy documents
    let (entities, rls) = match read_documents(&config) {
        Ok(docs) => docs,
        Err(e) => {
            results.extend([CheckFinding::error("config", format!("{:#}", e))]);
            return Ok(results);
        }
    };

    let issues = match Catalog::lint_yaml(&entities, &rls) {
        Ok(issues) => issues,
        Err(e) => {
            results.extend([CheckFinding::error("parse", e.to_string())]);
            return Ok(results);
        }
    };
    results.extend(issues.iter().map(|i| issue_finding(i, &config)));
    if results.has_errors() {
        return Ok(results);
    }

    // 3. Checks that need a loaded catalog
    let catalog = Catalog::from_yaml(&entities, &rls)?;
    results.extend(check_null_semantics(&catalog.policies));
    results.extend(check_role_coverage(&catalog.policies));
    results.extend(check_schemas(&catalog));

    Ok(results)
}

/// Run all checks and print the findings. Fails when any check errors.
pub fn run(config_path: Option<&Path>) -> Result<()> {
    println!("Checking Fieldline configuration...");

    let results = run_quiet(config_path)?;
    results.print_summary();

    if results.has_errors() {
        anyhow::bail!(
            "Configuration check failed with {} error(s)",
            results.error_count()
        );
    }
    Ok(())
}

fn read_documents(config: &FieldlineConfig) -> Result<(String, String)> {
    let entities = config
        .read_entities()?
        .unwrap_or_else(|| BUILTIN_ENTITIES.to_string());
    let rls = config.read_rls()?.unwrap_or_else(|| BUILTIN_RLS.to_string());
    Ok((entities, rls))
}

fn issue_finding(issue: &MetadataIssue, config: &FieldlineConfig) -> CheckFinding {
    let (category, file) = if issue.location.starts_with("resources.") {
        ("rls", config.rls_file.as_ref())
    } else {
        ("metadata", config.entities_file.as_ref())
    };
    let severity = match issue.severity {
        IssueSeverity::Error => Severity::Error,
        IssueSeverity::Warning => Severity::Warning,
    };
    CheckFinding::new(severity, category, issue.message.clone())
        .with_file(file)
        .with_location(issue.location.clone())
}

// ============================================================================
// Policy Table Checks
// ============================================================================

/// Spell out what every `null` rule means on its resource.
fn check_null_semantics(policies: &PolicyTableConfig) -> Vec<CheckFinding> {
    let mut findings = Vec::new();
    for (resource, declaration) in &policies.resources {
        let null_roles: Vec<&str> = declaration
            .roles
            .iter()
            .filter(|(_, rule)| rule.is_none())
            .map(|(role, _)| role.as_str())
            .collect();
        if null_roles.is_empty() {
            continue;
        }
        let meaning = match declaration.null_semantics {
            NullSemantics::NoFilter => "NoFilter (all rows, rlsApplied=false)",
            NullSemantics::DenyAll => "DenyAll (no rows)",
        };
        findings.push(
            CheckFinding::info(
                "null-semantics",
                format!("null rules for [{}] resolve to {}", null_roles.join(", "), meaning),
            )
            .with_location(format!("resources.{}", resource)),
        );
    }
    findings
}

/// Roles declared somewhere but missing on a resource resolve to DenyAll.
fn check_role_coverage(policies: &PolicyTableConfig) -> Vec<CheckFinding> {
    let all_roles: BTreeSet<&str> = policies
        .resources
        .values()
        .flat_map(|r| r.roles.keys().map(|k| k.as_str()))
        .collect();

    let mut findings = Vec::new();
    for (resource, declaration) in &policies.resources {
        for role in &all_roles {
            if !declaration.roles.contains_key(*role) {
                findings.push(
                    CheckFinding::warning(
                        "role-coverage",
                        format!("role '{}' has no rule here and will be denied all rows", role),
                    )
                    .with_location(format!("resources.{}.roles", resource)),
                );
            }
        }
    }
    findings
}

// ============================================================================
// Schema Checks
// ============================================================================

/// Every entity must yield usable create and update schemas.
fn check_schemas(catalog: &Catalog) -> Vec<CheckFinding> {
    let cache = SchemaCache::new();
    let mut findings = Vec::new();
    for key in catalog.entities.keys() {
        for operation in [Operation::Create, Operation::Update] {
            match cache.schema_for(&catalog.entities, key, operation) {
                Ok(schema) if schema.field_names().next().is_none() => {
                    findings.push(
                        CheckFinding::warning(
                            "schema",
                            format!("{} accepts no fields; every {} will be rejected", operation, operation),
                        )
                        .with_location(format!("entities.{}", key)),
                    );
                }
                Ok(_) => {}
                Err(e) => findings.push(CheckFinding::error("schema", e.to_string())),
            }
        }
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_builtin_configuration_has_no_errors() {
        let dir = TempDir::new().unwrap();
        let config = write(&dir, "fieldline.yaml", "project: test\n");
        let results = run_quiet(Some(&config)).unwrap();
        assert!(!results.has_errors(), "{:?}", results.findings);
        assert!(
            results
                .findings
                .iter()
                .any(|f| f.category == "null-semantics"
                    && f.location.as_deref() == Some("resources.invoices"))
        );
    }

    #[test]
    fn test_missing_null_semantics_is_an_error() {
        let dir = TempDir::new().unwrap();
        write(&dir, "rls.yaml", "resources:\n  users:\n    roles:\n      admin: all_records\n");
        let config = write(&dir, "fieldline.yaml", "rls_file: rls.yaml\n");
        let results = run_quiet(Some(&config)).unwrap();
        assert!(results.has_errors());
        assert_eq!(results.findings[0].category, "parse");
    }

    #[test]
    fn test_metadata_errors_are_reported_with_location() {
        let dir = TempDir::new().unwrap();
        let entities = BUILTIN_ENTITIES.replace(
            "searchable_fields: [email, first_name, last_name]",
            "searchable_fields: [email, password_hash]",
        );
        write(&dir, "entities.yaml", &entities);
        let config = write(&dir, "fieldline.yaml", "entities_file: entities.yaml\n");

        let results = run_quiet(Some(&config)).unwrap();
        let finding = results
            .findings
            .iter()
            .find(|f| f.severity == Severity::Error)
            .unwrap();
        assert_eq!(finding.category, "metadata");
        assert_eq!(finding.location.as_deref(), Some("entities.user.searchable_fields"));
        assert!(finding.file.as_ref().unwrap().ends_with("entities.yaml"));
    }

    #[test]
    fn test_missing_referenced_file() {
        let dir = TempDir::new().unwrap();
        let config = write(&dir, "fieldline.yaml", "rls_file: nowhere.yaml\n");
        let results = run_quiet(Some(&config)).unwrap();
        assert!(results.has_errors());
        assert!(results.findings[0].message.contains("referenced file not found"));
    }

    #[test]
    fn test_role_coverage_warns_on_gaps() {
        let table = PolicyTableConfig::from_yaml(
            "resources:\n  a:\n    null_semantics: deny_all\n    roles:\n      admin: all_records\n      \
             customer: deny_all\n  b:\n    null_semantics: no_filter\n    roles:\n      admin: ~\n",
        )
        .unwrap();
        let findings = check_role_coverage(&table);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].location.as_deref(), Some("resources.b.roles"));
        assert!(findings[0].message.contains("customer"));
    }
}
