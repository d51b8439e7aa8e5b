//! # fieldline-rls
//!
//! Row-level security for Fieldline.
//!
//! This crate provides:
//! - A pure resolver from `(role, resource)` to a [`Policy`], backed by the
//!   configured policy table
//! - An applier that merges the policy into a parameterized WHERE clause
//!
//! ## How It Works
//!
//! **Before (list filters from the caller):**
//! ```sql
//! status = $1 OR priority = $2
//! ```
//!
//! **After (role `customer`, resource `work_orders`):**
//! ```sql
//! (status = $1 OR priority = $2) AND customer_id = $3
//! ```
//!
//! Anything the table does not declare resolves to `DenyAll`.

pub mod applier;
pub mod context;
pub mod policy;

pub use applier::{RlsApplication, RlsFilterApplier, apply_policy};
pub use context::RlsContext;
pub use policy::{Policy, PolicyResolver, PolicySource, Resolution};
