//! Page/limit validation and result metadata.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use fieldline_core::ValidationError;

/// Largest limit accepted when no other maximum is configured.
pub const DEFAULT_MAX_LIMIT: u32 = 100;

/// A validated page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
    pub offset: u64,
}

/// Check page and limit bounds and compute the row offset.
///
/// Fails when `page < 1`, `limit < 1` or `limit > max_limit`.
pub fn validate_params(page: i64, limit: i64, max_limit: u32) -> Result<PageRequest, ValidationError> {
    if page < 1 || page > u32::MAX as i64 {
        return Err(ValidationError::invalid_pagination(
            "page",
            format!("page must be an integer of at least 1, got {}", page),
        ));
    }
    if limit < 1 || limit > max_limit as i64 {
        return Err(ValidationError::invalid_pagination(
            "limit",
            format!("limit must be between 1 and {}, got {}", max_limit, limit),
        ));
    }
    let (page, limit) = (page as u32, limit as u32);
    Ok(PageRequest {
        page,
        limit,
        offset: (page as u64 - 1) * limit as u64,
    })
}

/// Validate untyped page/limit input (JSON numbers or numeric strings).
///
/// Absent values default to page 1 and `default_limit`.
pub fn parse_params(
    page: Option<&Value>,
    limit: Option<&Value>,
    default_limit: u32,
    max_limit: u32,
) -> Result<PageRequest, ValidationError> {
    let page = match page {
        None | Some(Value::Null) => 1,
        Some(v) => parse_integer("page", v)?,
    };
    let limit = match limit {
        None | Some(Value::Null) => default_limit as i64,
        Some(v) => parse_integer("limit", v)?,
    };
    validate_params(page, limit, max_limit)
}

fn parse_integer(param: &str, value: &Value) -> Result<i64, ValidationError> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        ValidationError::invalid_pagination(param, format!("{} must be an integer, got {}", param, value))
    })
}

/// Pagination block of the list response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

/// Build pagination metadata for a page of results.
pub fn generate_metadata(page: u32, limit: u32, total: u64) -> PaginationMeta {
    let limit_u64 = (limit as u64).max(1);
    let total_pages = if total == 0 { 0 } else { total.div_ceil(limit_u64) };
    PaginationMeta {
        page,
        limit,
        total,
        total_pages,
        has_next: (page as u64) * limit_u64 < total,
        has_prev: page > 1,
    }
}
