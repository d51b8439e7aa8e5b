//! Parameterized SQL fragments.
//!
//! Every fragment numbers its own placeholders from `$1`. Composition
//! shifts them so the final statement uses `$1..$n` contiguously, in the
//! same order as its parameter list.

use crate::value::SqlValue;

/// A piece of SQL together with the parameters its placeholders refer to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlFragment {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl SqlFragment {
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// A fragment with no SQL; composes as a no-op.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.sql.trim().is_empty()
    }

    /// Append `other` with its placeholders shifted past ours.
    pub fn append(&mut self, joiner: &str, other: SqlFragment) {
        if other.is_empty() {
            return;
        }
        let shifted = shift_placeholders(&other.sql, self.params.len());
        if self.is_empty() {
            self.sql = shifted;
        } else {
            self.sql.push_str(joiner);
            self.sql.push_str(&shifted);
        }
        self.params.extend(other.params);
    }

    /// AND together all non-empty fragments.
    pub fn and_all(fragments: impl IntoIterator<Item = SqlFragment>) -> SqlFragment {
        let mut out = SqlFragment::empty();
        for f in fragments {
            out.append(" AND ", f);
        }
        out
    }

    /// Wrap in parentheses, unless empty.
    pub fn parenthesized(self) -> SqlFragment {
        if self.is_empty() {
            return self;
        }
        SqlFragment {
            sql: format!("({})", self.sql),
            params: self.params,
        }
    }

    /// `" WHERE <sql>"`, or an empty string for an empty fragment.
    pub fn where_sql(&self) -> String {
        if self.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.sql)
        }
    }
}

/// Add `offset` to every `$N` placeholder in `sql`.
pub fn shift_placeholders(sql: &str, offset: usize) -> String {
    if offset == 0 {
        return sql.to_string();
    }
    let mut out = String::with_capacity(sql.len() + 8);
    let mut chars = sql.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let mut digits = String::new();
        while let Some(&(_, d)) = chars.peek() {
            if d.is_ascii_digit() {
                digits.push(d);
                chars.next();
            } else {
                break;
            }
        }
        match digits.parse::<usize>() {
            Ok(n) => {
                out.push('$');
                out.push_str(&(n + offset).to_string());
            }
            Err(_) => {
                out.push('$');
                out.push_str(&digits);
            }
        }
    }
    out
}

/// Highest placeholder number used in `sql`, or 0.
pub fn max_placeholder(sql: &str) -> usize {
    let mut max = 0;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            let start = i + 1;
            let mut end = start;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
            if let Ok(n) = sql[start..end].parse::<usize>() {
                max = max.max(n);
            }
            i = end.max(i + 1);
        } else {
            i += 1;
        }
    }
    max
}
