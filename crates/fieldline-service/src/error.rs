//! Error types for the entity service.

use thiserror::Error;

use fieldline_core::{RegistryError, ValidationError};

/// Errors returned by [`EntityService`](crate::EntityService) operations.
///
/// Everything except `Database` is detected before a write statement is
/// issued.
#[derive(Debug, Error)]
pub enum EntityError {
    /// Input failed shape, range or whitelist validation.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// No metadata is registered under the requested key.
    #[error(transparent)]
    UnknownEntity(#[from] RegistryError),

    /// An update patch had no writable fields left after stripping.
    #[error("at least one field required to update {entity}")]
    MinFields { entity: String },

    /// A mutation targeted a system-protected record.
    #[error("{entity} '{identity}' is system-protected and cannot be modified")]
    ProtectedResource { entity: String, identity: String },

    /// The target row does not exist or is not visible to the caller.
    #[error("{entity} {id} not found")]
    NotFound { entity: String, id: String },

    /// Store failure, passed through untouched.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl EntityError {
    /// Whether the error was raised before reaching the store.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, EntityError::Database(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = EntityError::MinFields {
            entity: "work_order".to_string(),
        };
        assert!(err.to_string().contains("at least one field required"));

        let err = EntityError::ProtectedResource {
            entity: "role".to_string(),
            identity: "admin".to_string(),
        };
        assert_eq!(err.to_string(), "role 'admin' is system-protected and cannot be modified");
    }

    #[test]
    fn test_unknown_entity_passes_registry_message() {
        let err: EntityError = RegistryError::UnknownEntity {
            key: "payroll".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "unknown entity: payroll");
        assert!(err.is_client_error());
        assert!(!EntityError::Database(sqlx::Error::RowNotFound).is_client_error());
    }
}
