//! `fieldline schema` command implementation.

use anyhow::{Context, Result};

use fieldline_core::Catalog;
use fieldline_schema::{Operation, SchemaCache};

/// Print the JSON Schema accepted by `operation` on `entity`.
pub fn run(catalog: &Catalog, entity: &str, operation: &str) -> Result<()> {
    let operation: Operation = operation.parse().map_err(anyhow::Error::msg)?;
    let schema = SchemaCache::new().schema_for(&catalog.entities, entity, operation)?;
    let document = serde_json::to_string_pretty(&schema.to_json_schema())
        .context("Failed to render JSON Schema")?;
    println!("{}", document);
    Ok(())
}
