//! Shared types for Fieldline: configuration, the entity metadata registry,
//! validation errors and the audit event shape.

pub mod audit;
pub mod config;
pub mod error;
pub mod registry;

pub use audit::{AuditAction, AuditContext, AuditEvent, AuditEventBuilder};
pub use config::{
    Access, ConfigError, DatabaseConfig, EntityMetadata, FieldAccess, FieldDef, FieldType,
    FieldlineConfig, IdentitySource, NullSemantics, OwnRecordsRule, PaginationConfig,
    PolicyTableConfig, ResourcePolicy, RoleRule, RuleKeyword, SortOrder, SortSpec,
};
pub use error::{FieldError, RegistryError, ValidationError, ValidationErrorKind};
pub use registry::{
    BUILTIN_ENTITIES, BUILTIN_RLS, Catalog, EntityRegistry, IssueSeverity, MetadataIssue,
};
