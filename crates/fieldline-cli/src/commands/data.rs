//! `fieldline list` and `fieldline get` command implementations.
//!
//! Both run the entity service against PostgreSQL and print the JSON
//! response.

use anyhow::{Context, Result};
use serde_json::Value;
use std::sync::Arc;

use fieldline_adapter_pg::PgStore;
use fieldline_core::{Catalog, FieldlineConfig};
use fieldline_service::{EntityService, ServiceOptions};

use super::{CallerArgs, ListArgs};

async fn service(
    config: &FieldlineConfig,
    catalog: &Catalog,
    database_url: Option<&str>,
) -> Result<EntityService<PgStore>> {
    let store = match database_url {
        Some(url) => PgStore::connect_url(url).await,
        None => PgStore::connect(&config.database).await,
    }
    .context("Failed to connect to PostgreSQL")?;

    Ok(EntityService::new(
        store,
        Arc::new(catalog.entities.clone()),
        super::applier(catalog),
    )
    .with_options(ServiceOptions::from(&config.pagination)))
}

pub async fn list(
    config: &FieldlineConfig,
    catalog: &Catalog,
    entity: &str,
    caller: &CallerArgs,
    list: &ListArgs,
    database_url: Option<&str>,
) -> Result<()> {
    let meta = catalog.entities.get(entity)?;
    let ctx = caller.context(&meta.rls_resource);
    let service = service(config, catalog, database_url).await?;

    let result = service.find_all(entity, &list.to_options()?, &ctx).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

pub async fn get(
    config: &FieldlineConfig,
    catalog: &Catalog,
    entity: &str,
    id: &str,
    caller: &CallerArgs,
    database_url: Option<&str>,
) -> Result<()> {
    let meta = catalog.entities.get(entity)?;
    let ctx = caller.context(&meta.rls_resource);
    let service = service(config, catalog, database_url).await?;

    match service.find_by_id(entity, &Value::String(id.to_string()), &ctx).await? {
        Some(row) => println!("{}", serde_json::to_string_pretty(&Value::Object(row))?),
        None => anyhow::bail!("{} {} not found", entity, id),
    }
    Ok(())
}
