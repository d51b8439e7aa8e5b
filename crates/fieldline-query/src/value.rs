//! Typed SQL parameter values.
//!
//! Caller input arrives as JSON (often as strings, when it came from a query
//! string). Each value is coerced to the column's declared type before it is
//! bound, so the store never has to guess a parameter's type.

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use fieldline_core::{FieldType, ValidationError};

/// A bound SQL parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL, carrying the column type so the store can bind it typed.
    Null(FieldType),
    Bool(bool),
    Int(i64),
    Decimal(BigDecimal),
    Text(String),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Json(Value),
}

impl SqlValue {
    /// Coerce a JSON value to the declared column type.
    pub fn coerce(field: &str, field_type: FieldType, value: &Value) -> Result<Self, ValidationError> {
        if value.is_null() {
            return Ok(SqlValue::Null(field_type));
        }
        let fail = || ValidationError::invalid_type(field, &field_type.to_string());

        match field_type {
            FieldType::String | FieldType::Text | FieldType::Email => match value {
                Value::String(s) => Ok(SqlValue::Text(s.clone())),
                Value::Number(n) => Ok(SqlValue::Text(n.to_string())),
                Value::Bool(b) => Ok(SqlValue::Text(b.to_string())),
                _ => Err(fail()),
            },
            FieldType::Integer => match value {
                Value::Number(n) => n.as_i64().map(SqlValue::Int).ok_or_else(fail),
                Value::String(s) => s.trim().parse::<i64>().map(SqlValue::Int).map_err(|_| fail()),
                _ => Err(fail()),
            },
            FieldType::Decimal => match value {
                Value::Number(n) => BigDecimal::from_str(&n.to_string())
                    .map(SqlValue::Decimal)
                    .map_err(|_| fail()),
                Value::String(s) => BigDecimal::from_str(s.trim())
                    .map(SqlValue::Decimal)
                    .map_err(|_| fail()),
                _ => Err(fail()),
            },
            FieldType::Boolean => match value {
                Value::Bool(b) => Ok(SqlValue::Bool(*b)),
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" => Ok(SqlValue::Bool(true)),
                    "false" | "0" => Ok(SqlValue::Bool(false)),
                    _ => Err(fail()),
                },
                Value::Number(n) => match n.as_i64() {
                    Some(1) => Ok(SqlValue::Bool(true)),
                    Some(0) => Ok(SqlValue::Bool(false)),
                    _ => Err(fail()),
                },
                _ => Err(fail()),
            },
            FieldType::Date => match value {
                Value::String(s) => parse_date(s).map(SqlValue::Date).ok_or_else(fail),
                _ => Err(fail()),
            },
            FieldType::Timestamp => match value {
                Value::String(s) => parse_timestamp(s).map(SqlValue::Timestamp).ok_or_else(fail),
                _ => Err(fail()),
            },
            FieldType::Json => Ok(SqlValue::Json(value.clone())),
        }
    }

    /// JSON rendering, used by explain output and audit payloads.
    pub fn to_json(&self) -> Value {
        match self {
            SqlValue::Null(_) => Value::Null,
            SqlValue::Bool(b) => Value::Bool(*b),
            SqlValue::Int(i) => Value::from(*i),
            SqlValue::Decimal(d) => Value::String(d.to_string()),
            SqlValue::Text(s) => Value::String(s.clone()),
            SqlValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            SqlValue::Timestamp(t) => Value::String(t.to_rfc3339()),
            SqlValue::Json(v) => v.clone(),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null(_) => write!(f, "NULL"),
            SqlValue::Text(s) => write!(f, "'{}'", s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_timestamp(s).map(|t| t.date_naive()))
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    // A bare date means midnight UTC.
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
