//! # fieldline-query
//!
//! Builds parameterized SQL fragments from untrusted list parameters.
//!
//! Identifiers in the generated SQL come exclusively from entity metadata
//! whitelists; caller-supplied values are always bound as `$N` parameters.
//!
//! ```text
//! search=leak, filters={status: pending}, sortBy=title
//!   -> (title::text ILIKE $1 OR description::text ILIKE $1) AND status = $2
//!      ORDER BY title ASC, id ASC
//! ```

pub mod builder;
pub mod fragment;
pub mod pagination;
pub mod value;

pub use builder::{FilterClause, build_filter_clause, build_search_clause, build_sort_clause, escape_like};
pub use fragment::{SqlFragment, max_placeholder, shift_placeholders};
pub use pagination::{
    DEFAULT_MAX_LIMIT, PageRequest, PaginationMeta, generate_metadata, parse_params, validate_params,
};
pub use value::SqlValue;
