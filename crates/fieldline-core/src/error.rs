//! Error types shared by the query, schema and service layers.
//!
//! `ValidationError` is raised before any SQL is issued. It carries a
//! field-level detail array so callers can render per-field messages.

use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Input field (or query parameter) the failure refers to.
    pub field: String,
    /// Human-readable reason.
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Error type for validation failures.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The kind of validation error.
    pub kind: ValidationErrorKind,
    /// Human-readable error message.
    pub message: String,
    /// Field-level details.
    pub details: Vec<FieldError>,
}

impl ValidationError {
    /// Create a new validation error without field details.
    pub fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: Vec::new(),
        }
    }

    /// Create a validation error pointing at a single field.
    pub fn for_field(
        kind: ValidationErrorKind,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        Self {
            kind,
            details: vec![FieldError::new(field, message.clone())],
            message,
        }
    }

    /// The first field this error refers to, if any.
    pub fn field(&self) -> Option<&str> {
        self.details.first().map(|d| d.field.as_str())
    }

    // =========================================================================
    // QUERY PARAMETER ERRORS
    // =========================================================================

    /// `sortBy` names a column outside the sortable whitelist.
    pub fn invalid_sort_field(requested: &str, allowed: &[&str]) -> Self {
        Self::for_field(
            ValidationErrorKind::InvalidSortField,
            "sortBy",
            format!(
                "Cannot sort by '{}'. Allowed fields: {}",
                requested,
                allowed.join(", ")
            ),
        )
    }

    /// `sortOrder` is neither ASC nor DESC.
    pub fn invalid_sort_order(requested: &str) -> Self {
        Self::for_field(
            ValidationErrorKind::InvalidSortOrder,
            "sortOrder",
            format!("Invalid sort order '{}'. Expected ASC or DESC", requested),
        )
    }

    /// Page or limit is out of range or not an integer.
    pub fn invalid_pagination(param: &str, message: impl Into<String>) -> Self {
        Self::for_field(ValidationErrorKind::InvalidPagination, param, message)
    }

    /// A whitelisted filter carries a value that cannot be coerced to the column type.
    pub fn invalid_filter_value(field: &str, expected: &str) -> Self {
        Self::for_field(
            ValidationErrorKind::InvalidFilter,
            field,
            format!("Filter value for '{}' must be of type {}", field, expected),
        )
    }

    // =========================================================================
    // INPUT ERRORS
    // =========================================================================

    /// Required field is missing after write-access stripping.
    pub fn required_field_missing(entity: &str, field: &str) -> Self {
        Self::for_field(
            ValidationErrorKind::RequiredFieldMissing,
            field,
            format!(
                "Required field '{}' is missing for create operation on '{}'",
                field, entity
            ),
        )
    }

    /// An update carried no writable fields.
    pub fn empty_input() -> Self {
        Self::new(
            ValidationErrorKind::EmptyInput,
            "At least one field must be provided.",
        )
    }

    /// Value has the wrong JSON type for the field.
    pub fn invalid_type(field: &str, expected: &str) -> Self {
        Self::for_field(
            ValidationErrorKind::InvalidType,
            field,
            format!("Field '{}' must be of type {}", field, expected),
        )
    }

    /// Value does not match the field's pattern.
    pub fn pattern_mismatch(field: &str, pattern: &str) -> Self {
        Self::for_field(
            ValidationErrorKind::PatternMismatch,
            field,
            format!(
                "Value for field '{}' does not match required pattern: {}",
                field, pattern
            ),
        )
    }

    /// Value is not one of the declared allowed values.
    pub fn value_not_allowed(field: &str, value: &Value, allowed: &[String]) -> Self {
        Self::for_field(
            ValidationErrorKind::ValueNotAllowed,
            field,
            format!(
                "Value {} for field '{}' is not in allowed values: {}",
                value,
                field,
                allowed.join(", ")
            ),
        )
    }

    /// Numeric value or string length is outside the declared bounds.
    pub fn out_of_range(field: &str, message: impl Into<String>) -> Self {
        Self::for_field(ValidationErrorKind::OutOfRange, field, message)
    }

    /// Null supplied for a non-nullable field.
    pub fn not_nullable(field: &str) -> Self {
        Self::for_field(
            ValidationErrorKind::NotNullable,
            field,
            format!("Field '{}' cannot be null", field),
        )
    }

    /// Collapse several field failures into one error.
    ///
    /// A single failure is returned as-is.
    pub fn aggregate(entity: &str, mut errors: Vec<ValidationError>) -> Self {
        if errors.len() == 1 {
            return errors.remove(0);
        }
        let details: Vec<FieldError> = errors.into_iter().flat_map(|e| e.details).collect();
        Self {
            kind: ValidationErrorKind::InvalidInput,
            message: format!(
                "Validation failed for '{}': {} field error(s)",
                entity,
                details.len()
            ),
            details,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Categories of validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    // =========================================================================
    // Query parameter errors
    // =========================================================================
    /// Sort column is not in the sortable whitelist.
    InvalidSortField,
    /// Sort direction is not ASC or DESC.
    InvalidSortOrder,
    /// Page or limit is invalid.
    InvalidPagination,
    /// Filter value cannot be coerced.
    InvalidFilter,

    // =========================================================================
    // Input errors
    // =========================================================================
    /// Required field is missing for create.
    RequiredFieldMissing,
    /// Update payload has no writable fields.
    EmptyInput,
    /// Wrong value type.
    InvalidType,
    /// Value does not match pattern.
    PatternMismatch,
    /// Value is not in the allowed list.
    ValueNotAllowed,
    /// Value or length outside bounds.
    OutOfRange,
    /// Null for a non-nullable field.
    NotNullable,
    /// Several field errors at once.
    InvalidInput,
}

/// Lookup failure in the entity registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown entity: {key}")]
    UnknownEntity { key: String },
}
