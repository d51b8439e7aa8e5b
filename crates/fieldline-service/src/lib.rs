//! # fieldline-service
//!
//! One generic CRUD service for every entity in the registry.
//!
//! The service composes whitelisted query clauses, merges the caller's RLS
//! policy, validates writes against cached schemas and hands fully
//! parameterized statements to an [`EntityStore`]. It never persists audit
//! events; each write returns its [`AuditEvent`](fieldline_core::AuditEvent)
//! in a [`Mutation`].
//!
//! ## Example
//!
//! ```ignore
//! let service = EntityService::new(store, Arc::new(catalog.entities), applier);
//! let ctx = RlsContext::new("customer", 3, "work_orders").with_customer_profile(7);
//! let page = service.find_all("work_order", &ListOptions::default(), &ctx).await?;
//! assert!(page.rls_applied);
//! ```

pub mod error;
pub mod service;
pub mod store;
pub mod types;

pub use error::EntityError;
pub use service::EntityService;
pub use store::{EntityStore, Row};
pub use types::{FindAllPlan, ListOptions, Mutation, QueryResult, ServiceOptions};
