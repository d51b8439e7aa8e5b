//! Configuration types for Fieldline.
//!
//! Configuration is loaded from YAML files and combined into a single
//! `FieldlineConfig` structure.
//!
//! # Configuration Files
//!
//! - **fieldline.yaml**: Main configuration file with database and pagination settings
//! - **entities.yaml**: Entity metadata (tables, fields, write access, query whitelists)
//! - **rls.yaml**: The `(role, resource)` policy table
//!
//! When `entities_file` or `rls_file` is omitted the built-in field-service
//! definitions are used.

pub mod database;
pub mod entity;
pub mod policy;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use database::{DatabaseConfig, PoolConfig};
pub use entity::{
    Access, EntityMetadata, FieldAccess, FieldDef, FieldType, ProtectedRecords, SortOrder,
    SortSpec,
};
pub use policy::{
    IdentitySource, NullSemantics, OwnRecordsRule, PolicyTableConfig, ResourcePolicy, RoleRule,
    RuleKeyword,
};

/// Complete Fieldline configuration loaded from files.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FieldlineConfig {
    /// Project name.
    #[serde(default)]
    pub project: Option<String>,

    /// PostgreSQL connection.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// List query paging limits.
    #[serde(default)]
    pub pagination: PaginationConfig,

    /// Path to the entity metadata file.
    #[serde(default)]
    pub entities_file: Option<PathBuf>,

    /// Path to the RLS policy table file.
    #[serde(default)]
    pub rls_file: Option<PathBuf>,
}

/// Paging limits applied by the list endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// Limit used when the caller does not send one.
    #[serde(default = "default_limit")]
    pub default_limit: u32,

    /// Largest accepted limit.
    #[serde(default = "default_max_limit")]
    pub max_limit: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl FieldlineConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.check()?;
        Ok(config)
    }

    /// Load configuration and resolve referenced files against the
    /// directory containing the config file.
    pub fn load_with_context(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = Self::from_file(path)?;

        let base_dir = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        config.entities_file = config
            .entities_file
            .take()
            .map(|f| resolve_path(&base_dir, f));
        config.rls_file = config.rls_file.take().map(|f| resolve_path(&base_dir, f));

        for file in [&config.entities_file, &config.rls_file].into_iter().flatten() {
            if !file.exists() {
                return Err(ConfigError::Config(format!(
                    "referenced file not found: {}",
                    file.display()
                )));
            }
        }

        Ok(config)
    }

    /// Read the entity metadata YAML, if an external file is configured.
    pub fn read_entities(&self) -> Result<Option<String>, ConfigError> {
        self.entities_file
            .as_ref()
            .map(fs::read_to_string)
            .transpose()
            .map_err(ConfigError::from)
    }

    /// Read the policy table YAML, if an external file is configured.
    pub fn read_rls(&self) -> Result<Option<String>, ConfigError> {
        self.rls_file
            .as_ref()
            .map(fs::read_to_string)
            .transpose()
            .map_err(ConfigError::from)
    }

    fn check(&self) -> Result<(), ConfigError> {
        let p = &self.pagination;
        if p.max_limit == 0 {
            return Err(ConfigError::Config(
                "pagination.max_limit must be at least 1".to_string(),
            ));
        }
        if p.default_limit == 0 || p.default_limit > p.max_limit {
            return Err(ConfigError::Config(format!(
                "pagination.default_limit must be between 1 and max_limit ({})",
                p.max_limit
            )));
        }
        Ok(())
    }
}

fn resolve_path(base_dir: &Path, file: PathBuf) -> PathBuf {
    if file.is_absolute() {
        file
    } else {
        base_dir.join(file)
    }
}

/// Whether `s` is safe to interpolate as an unquoted SQL identifier.
///
/// Accepts `^[a-z_][a-z0-9_]*$`.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn default_limit() -> u32 {
    50
}

fn default_max_limit() -> u32 {
    100
}
