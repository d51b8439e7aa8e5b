//! Request and response shapes for the entity service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use fieldline_core::{AuditEvent, PaginationConfig};
use fieldline_query::{DEFAULT_MAX_LIMIT, PageRequest, PaginationMeta, SqlFragment};
use fieldline_rls::RlsApplication;

use crate::store::Row;

/// Service-wide limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceOptions {
    /// Page size when the caller sends none.
    pub default_limit: u32,
    /// Largest page size a caller may request.
    pub max_limit: u32,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            default_limit: 50,
            max_limit: DEFAULT_MAX_LIMIT,
        }
    }
}

impl From<&PaginationConfig> for ServiceOptions {
    fn from(config: &PaginationConfig) -> Self {
        Self {
            default_limit: config.default_limit,
            max_limit: config.max_limit,
        }
    }
}

/// List parameters as received from the caller.
///
/// `page` and `limit` stay untyped so query-string input (`"2"`) and JSON
/// numbers validate the same way.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOptions {
    #[serde(default)]
    pub page: Option<Value>,
    #[serde(default)]
    pub limit: Option<Value>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub filters: Map<String, Value>,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub sort_order: Option<String>,
}

impl ListOptions {
    pub fn page(mut self, page: i64, limit: i64) -> Self {
        self.page = Some(Value::from(page));
        self.limit = Some(Value::from(limit));
        self
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn filter(mut self, field: impl Into<String>, value: Value) -> Self {
        self.filters.insert(field.into(), value);
        self
    }

    pub fn sort(mut self, field: impl Into<String>, order: Option<&str>) -> Self {
        self.sort_by = Some(field.into());
        self.sort_order = order.map(str::to_string);
        self
    }
}

/// List response envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub data: Vec<Row>,
    pub pagination: PaginationMeta,
    /// Filters that made it past the whitelist.
    pub applied_filters: Map<String, Value>,
    pub rls_applied: bool,
    pub timestamp: DateTime<Utc>,
}

/// The statements a `find_all` call would run, without running them.
///
/// Both statements share one WHERE clause and parameter list, so the count
/// always describes the same row set the page is cut from.
#[derive(Debug, Clone)]
pub struct FindAllPlan {
    pub entity: String,
    pub table: String,
    pub page: PageRequest,
    pub count: SqlFragment,
    pub select: SqlFragment,
    pub applied_filters: Map<String, Value>,
    pub rls: RlsApplication,
}

impl FindAllPlan {
    /// Operator-facing rendering of both statements and their parameters.
    pub fn explain(&self) -> String {
        let mut out = format!(
            "entity: {} (table {})\npage: {} limit: {} offset: {}\n",
            self.entity, self.table, self.page.page, self.page.limit, self.page.offset
        );
        out.push_str(&self.rls.explain());
        out.push_str(&format!("count: {}\n", self.count.sql));
        out.push_str(&format!("select: {}\n", self.select.sql));
        for (i, v) in self.select.params.iter().enumerate() {
            out.push_str(&format!("  ${} = {}\n", i + 1, v));
        }
        out
    }
}

/// A written row together with the audit event describing the write.
///
/// The service never persists the event; the caller hands it to its audit
/// collaborator.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Mutation {
    pub row: Row,
    pub audit: AuditEvent,
}
