//! `fieldline explain` command implementation.
//!
//! Prints the COUNT and SELECT statements a list call would run for a
//! caller, with RLS applied, without touching a database.

use anyhow::Result;
use std::sync::Arc;

use fieldline_core::{Catalog, FieldlineConfig};
use fieldline_service::{EntityService, FindAllPlan, ServiceOptions};

use super::{CallerArgs, ListArgs};

/// Build the list plan for `entity`.
pub fn plan(
    config: &FieldlineConfig,
    catalog: &Catalog,
    entity: &str,
    caller: &CallerArgs,
    list: &ListArgs,
) -> Result<FindAllPlan> {
    let meta = catalog.entities.get(entity)?;
    let ctx = caller.context(&meta.rls_resource);
    let service = EntityService::new(
        (),
        Arc::new(catalog.entities.clone()),
        super::applier(catalog),
    )
    .with_options(ServiceOptions::from(&config.pagination));
    Ok(service.plan_find_all(entity, &list.to_options()?, &ctx)?)
}

pub fn run(
    config: &FieldlineConfig,
    catalog: &Catalog,
    entity: &str,
    caller: &CallerArgs,
    list: &ListArgs,
) -> Result<()> {
    let plan = plan(config, catalog, entity, caller, list)?;
    print!("{}", plan.explain());
    if !plan.applied_filters.is_empty() {
        println!(
            "applied filters: {}",
            serde_json::Value::Object(plan.applied_filters.clone())
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller(role: &str) -> CallerArgs {
        CallerArgs {
            role: role.to_string(),
            user_id: 3,
            customer_profile_id: Some(7),
            technician_profile_id: None,
        }
    }

    #[test]
    fn test_customer_plan_carries_ownership_predicate() {
        let config = FieldlineConfig::default();
        let catalog = Catalog::builtin().unwrap();
        let list = ListArgs {
            filters: vec!["status=pending".to_string()],
            ..Default::default()
        };

        let plan = plan(&config, &catalog, "work_order", &caller("customer"), &list).unwrap();
        assert!(plan.rls.rls_applied);
        assert_eq!(
            plan.count.sql,
            "SELECT COUNT(*) AS total FROM work_orders WHERE (status = $1) AND customer_id = $2"
        );
        assert!(plan.select.sql.ends_with("LIMIT 50 OFFSET 0"));
        assert!(plan.explain().contains("$2 = 7"));
    }

    #[test]
    fn test_unknown_entity_fails() {
        let config = FieldlineConfig::default();
        let catalog = Catalog::builtin().unwrap();
        let err = plan(&config, &catalog, "payroll", &caller("admin"), &ListArgs::default())
            .unwrap_err();
        assert!(err.to_string().contains("unknown entity"));
    }
}
