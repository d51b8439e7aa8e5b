//! CLI command implementations.

pub mod check;
pub mod data;
pub mod explain;
pub mod schema;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::{Map, Value};

use fieldline_core::{Catalog, FieldlineConfig};
use fieldline_rls::{PolicyResolver, RlsContext, RlsFilterApplier};
use fieldline_service::ListOptions;

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "fieldline.yaml";

/// Caller identity flags shared by commands that evaluate RLS.
#[derive(Args, Debug, Clone)]
pub struct CallerArgs {
    /// Caller role, e.g. admin, dispatcher, technician, customer
    #[arg(long)]
    pub role: String,

    #[arg(long = "user-id", default_value_t = 1)]
    pub user_id: i64,

    #[arg(long = "customer-profile-id")]
    pub customer_profile_id: Option<i64>,

    #[arg(long = "technician-profile-id")]
    pub technician_profile_id: Option<i64>,
}

impl CallerArgs {
    pub fn context(&self, resource: &str) -> RlsContext {
        let mut ctx = RlsContext::new(self.role.clone(), self.user_id, resource);
        ctx.customer_profile_id = self.customer_profile_id;
        ctx.technician_profile_id = self.technician_profile_id;
        ctx
    }
}

/// List parameters as they would arrive on a query string.
#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    #[arg(long)]
    pub page: Option<String>,

    #[arg(long)]
    pub limit: Option<String>,

    #[arg(long)]
    pub search: Option<String>,

    /// Filter as field=value; JSON arrays and objects are accepted as values
    #[arg(long = "filter", value_name = "FIELD=VALUE")]
    pub filters: Vec<String>,

    #[arg(long = "sort-by")]
    pub sort_by: Option<String>,

    #[arg(long = "sort-order")]
    pub sort_order: Option<String>,
}

impl ListArgs {
    pub fn to_options(&self) -> Result<ListOptions> {
        let mut filters = Map::new();
        for raw in &self.filters {
            let (field, value) = raw
                .split_once('=')
                .with_context(|| format!("filter '{}' must look like field=value", raw))?;
            filters.insert(field.trim().to_string(), parse_filter_value(value));
        }
        Ok(ListOptions {
            page: self.page.clone().map(Value::String),
            limit: self.limit.clone().map(Value::String),
            search: self.search.clone(),
            filters,
            sort_by: self.sort_by.clone(),
            sort_order: self.sort_order.clone(),
        })
    }
}

fn parse_filter_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed == "null" {
        return Value::Null;
    }
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        if let Ok(v) = serde_json::from_str(trimmed) {
            return v;
        }
    }
    Value::String(trimmed.to_string())
}

/// Load configuration from an explicit path, `./fieldline.yaml`, or defaults.
pub fn load_config(path: Option<&Path>) -> Result<FieldlineConfig> {
    match path {
        Some(p) => FieldlineConfig::load_with_context(p)
            .with_context(|| format!("Failed to load configuration from {}", p.display())),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            FieldlineConfig::load_with_context(DEFAULT_CONFIG_FILE)
                .context("Failed to load ./fieldline.yaml")
        }
        None => Ok(FieldlineConfig::default()),
    }
}

pub fn load_catalog(config: &FieldlineConfig) -> Result<Catalog> {
    Catalog::from_config(config).context("Failed to load entity metadata and RLS policies")
}

pub fn applier(catalog: &Catalog) -> RlsFilterApplier {
    RlsFilterApplier::new(PolicyResolver::new(catalog.policies.clone()))
}
