//! Memoized schema construction.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use fieldline_core::{EntityRegistry, RegistryError};

use crate::schema::{EntitySchema, Operation, build_entity_schema};

/// Cache of built schemas keyed by `(entity, operation)`.
///
/// Each key is built at most once per cache under normal operation. Two
/// threads racing on a cold key may both build; the first insert wins and
/// both receive the same `Arc`.
#[derive(Debug, Default)]
pub struct SchemaCache {
    schemas: RwLock<HashMap<(String, Operation), Arc<EntitySchema>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The schema for `entity` and `operation`, building it on first use.
    pub fn schema_for(
        &self,
        registry: &EntityRegistry,
        entity: &str,
        operation: Operation,
    ) -> Result<Arc<EntitySchema>, RegistryError> {
        let key = (entity.to_string(), operation);
        {
            let schemas = self.schemas.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(schema) = schemas.get(&key) {
                return Ok(Arc::clone(schema));
            }
        }

        let meta = registry.get(entity)?;
        let built = Arc::new(build_entity_schema(meta, operation));
        tracing::debug!(entity = %entity, operation = %operation, "Built input schema");

        let mut schemas = self.schemas.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(schemas.entry(key).or_insert(built)))
    }

    pub fn len(&self) -> usize {
        self.schemas.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached schema.
    pub fn clear(&self) {
        self.schemas.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_key_returns_same_schema() {
        let registry = EntityRegistry::builtin().unwrap();
        let cache = SchemaCache::new();
        let a = cache.schema_for(&registry, "work_order", Operation::Create).unwrap();
        let b = cache.schema_for(&registry, "work_order", Operation::Create).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_operations_are_cached_separately() {
        let registry = EntityRegistry::builtin().unwrap();
        let cache = SchemaCache::new();
        let create = cache.schema_for(&registry, "invoice", Operation::Create).unwrap();
        let update = cache.schema_for(&registry, "invoice", Operation::Update).unwrap();
        assert!(!Arc::ptr_eq(&create, &update));
        assert_eq!(create.operation, Operation::Create);
        assert_eq!(update.operation, Operation::Update);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_unknown_entity_is_not_cached() {
        let registry = EntityRegistry::builtin().unwrap();
        let cache = SchemaCache::new();
        let err = cache.schema_for(&registry, "payroll", Operation::Create).unwrap_err();
        assert_eq!(err, RegistryError::UnknownEntity { key: "payroll".to_string() });
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear() {
        let registry = EntityRegistry::builtin().unwrap();
        let cache = SchemaCache::new();
        cache.schema_for(&registry, "role", Operation::Update).unwrap();
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_callers_share_one_schema() {
        let registry = Arc::new(EntityRegistry::builtin().unwrap());
        let cache = Arc::new(SchemaCache::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    cache.schema_for(&registry, "customer", Operation::Create).unwrap()
                })
            })
            .collect();
        let schemas: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(schemas.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }
}
