//! PostgreSQL implementation of [`EntityStore`].
//!
//! Statements arrive fully composed with `$N` placeholders; this crate only
//! binds the typed parameters and decodes rows into JSON objects.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Value, json};
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::{Arguments, Column, Row as _};
use std::time::Duration;

use fieldline_core::{DatabaseConfig, FieldType};
use fieldline_query::{SqlFragment, SqlValue};
use fieldline_service::{EntityStore, Row};

fn args_add<T>(args: &mut PgArguments, v: T) -> Result<(), sqlx::Error>
where
    T: Send + Sync + 'static,
    for<'q> T: sqlx::Encode<'q, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    args.add(v).map_err(sqlx::Error::Encode)
}

/// Bind one parameter with its native PostgreSQL type.
fn bind_value(args: &mut PgArguments, value: &SqlValue) -> Result<(), sqlx::Error> {
    match value {
        SqlValue::Null(field_type) => match field_type {
            FieldType::Integer => args_add(args, Option::<i64>::None),
            FieldType::Decimal => args_add(args, Option::<BigDecimal>::None),
            FieldType::Boolean => args_add(args, Option::<bool>::None),
            FieldType::Date => args_add(args, Option::<NaiveDate>::None),
            FieldType::Timestamp => args_add(args, Option::<DateTime<Utc>>::None),
            FieldType::Json => args_add(args, Option::<sqlx::types::Json<Value>>::None),
            FieldType::String | FieldType::Text | FieldType::Email => {
                args_add(args, Option::<String>::None)
            }
        },
        SqlValue::Bool(b) => args_add(args, *b),
        SqlValue::Int(n) => args_add(args, *n),
        SqlValue::Decimal(d) => args_add(args, d.clone()),
        SqlValue::Text(s) => args_add(args, s.clone()),
        SqlValue::Date(d) => args_add(args, *d),
        SqlValue::Timestamp(t) => args_add(args, *t),
        SqlValue::Json(v) => args_add(args, sqlx::types::Json(v.clone())),
    }
}

fn arguments(statement: &SqlFragment) -> Result<PgArguments, sqlx::Error> {
    let mut args = PgArguments::default();
    for value in &statement.params {
        bind_value(&mut args, value)?;
    }
    Ok(args)
}

/// Decode a row into a JSON object, trying the column types entities use.
fn row_to_json(row: &PgRow) -> Row {
    let mut obj = Row::new();

    for col in row.columns() {
        let name = col.name();
        let value: Value = if let Ok(v) = row.try_get::<Option<i64>, _>(name) {
            json!(v)
        } else if let Ok(v) = row.try_get::<Option<i32>, _>(name) {
            json!(v)
        } else if let Ok(v) = row.try_get::<Option<i16>, _>(name) {
            json!(v)
        } else if let Ok(v) = row.try_get::<Option<BigDecimal>, _>(name) {
            // Decimal strings keep money exact.
            json!(v.map(|d| d.to_string()))
        } else if let Ok(v) = row.try_get::<Option<f64>, _>(name) {
            json!(v)
        } else if let Ok(v) = row.try_get::<Option<bool>, _>(name) {
            json!(v)
        } else if let Ok(v) = row.try_get::<Option<String>, _>(name) {
            json!(v)
        } else if let Ok(v) = row.try_get::<Option<NaiveDate>, _>(name) {
            json!(v.map(|d| d.format("%Y-%m-%d").to_string()))
        } else if let Ok(v) = row.try_get::<Option<DateTime<Utc>>, _>(name) {
            json!(v.map(|t| t.to_rfc3339()))
        } else if let Ok(v) = row.try_get::<Option<NaiveDateTime>, _>(name) {
            json!(v.map(|t| t.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
        } else if let Ok(v) = row.try_get::<Option<Value>, _>(name) {
            v.unwrap_or(Value::Null)
        } else {
            tracing::debug!(column = %name, "Unsupported column type; returning null");
            Value::Null
        };

        obj.insert(name.to_string(), value);
    }

    obj
}

/// Connection-pooled PostgreSQL store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Open a pool sized by the configuration.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .min_connections(config.pool.min_connections)
            .max_connections(config.pool.max_connections)
            .acquire_timeout(Duration::from_secs(config.pool.acquire_timeout_secs))
            .connect(&config.connection_string())
            .await?;
        tracing::info!(
            host = %config.host,
            database = %config.database,
            max_connections = config.pool.max_connections,
            "Connected to PostgreSQL"
        );
        Ok(Self { pool })
    }

    /// Open a pool from a connection URL with default sizing.
    pub async fn connect_url(url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl EntityStore for PgStore {
    async fn fetch_all(&self, statement: &SqlFragment) -> Result<Vec<Row>, sqlx::Error> {
        tracing::debug!(sql = %statement.sql, params = statement.params.len(), "fetch_all");
        let rows = sqlx::query_with(&statement.sql, arguments(statement)?)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn fetch_optional(&self, statement: &SqlFragment) -> Result<Option<Row>, sqlx::Error> {
        tracing::debug!(sql = %statement.sql, params = statement.params.len(), "fetch_optional");
        let row = sqlx::query_with(&statement.sql, arguments(statement)?)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_json))
    }

    async fn fetch_count(&self, statement: &SqlFragment) -> Result<i64, sqlx::Error> {
        tracing::debug!(sql = %statement.sql, params = statement.params.len(), "fetch_count");
        let row = sqlx::query_with(&statement.sql, arguments(statement)?)
            .fetch_one(&self.pool)
            .await?;
        row.try_get::<i64, _>(0)
    }
}
