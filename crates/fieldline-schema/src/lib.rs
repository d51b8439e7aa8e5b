//! # fieldline-schema
//!
//! Input validation schemas derived from entity metadata.
//!
//! ```text
//! EntityMetadata ──build_entity_schema──▶ EntitySchema ──validate──▶ stripped input
//!                                              │
//!                                              └──to_json_schema──▶ JSON Schema document
//! ```
//!
//! [`SchemaCache`] memoizes schemas per `(entity, operation)`.

pub mod cache;
pub mod schema;

pub use cache::SchemaCache;
pub use schema::{EntitySchema, FieldRule, Operation, build_entity_schema};
