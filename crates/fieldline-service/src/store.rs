//! Store seam between the service and the relational database.

use async_trait::async_trait;
use serde_json::{Map, Value};

use fieldline_query::SqlFragment;

/// A row as returned by the store.
pub type Row = Map<String, Value>;

/// Executes fully composed, parameterized statements.
///
/// Statements use `$1..$n` placeholders matching `params` in order.
/// Implementations must bind, never interpolate, the parameters.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Run a statement and return every row.
    async fn fetch_all(&self, statement: &SqlFragment) -> Result<Vec<Row>, sqlx::Error>;

    /// Run a statement and return the first row, if any.
    async fn fetch_optional(&self, statement: &SqlFragment) -> Result<Option<Row>, sqlx::Error>;

    /// Run a statement whose first row has a single integer column.
    async fn fetch_count(&self, statement: &SqlFragment) -> Result<i64, sqlx::Error>;

    /// Run a statement that must return a row.
    async fn fetch_one(&self, statement: &SqlFragment) -> Result<Row, sqlx::Error> {
        self.fetch_optional(statement)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }
}
