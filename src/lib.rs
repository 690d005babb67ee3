//! # rowlens
//!
//! Browse and query Postgres tables through a PostgREST endpoint, or
//! directly through sqlx.
//!
//! Filters are plain data ([`FilterClause`](ast::FilterClause)); the
//! [`builder`] threads them through a backend query handle and the
//! [`engine`] normalizes what comes back into a
//! [`QueryResult`](engine::QueryResult).
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use rowlens::prelude::*;
//!
//! let config = ClientConfig::discover()?;
//! let service = RowQueryService::new(shared_client(&config)?);
//!
//! let filters = vec![parse_filter("age >= 18")?, FilterClause::is_in("role", vec!["admin", "staff"])];
//! let options = QueryOptions::new().order_by("id", true).limit(10).with_count();
//!
//! let result: QueryResult = service.fetch_rows("users", &filters, &options).await;
//! // GET /rest/v1/users?select=*&age=gte.18&role=in.(admin,staff)&order=id.asc&limit=10
//! ```
//!
//! ## Operators
//!
//! | Token   | Symbol     | Meaning                  |
//! |---------|------------|--------------------------|
//! | `eq`    | `=`        | equal                    |
//! | `neq`   | `!=`, `<>` | not equal                |
//! | `gt`    | `>`        | greater than             |
//! | `gte`   | `>=`       | greater than or equal    |
//! | `lt`    | `<`        | less than                |
//! | `lte`   | `<=`       | less than or equal       |
//! | `like`  |            | pattern, case-sensitive  |
//! | `ilike` |            | pattern, case-insensitive|
//! | `is`    |            | `null`, `true`, `false`  |
//! | `in`    |            | set membership           |

pub mod ast;
pub mod auth;
pub mod backend;
pub mod builder;
pub mod client;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod parser;
pub mod schema;
pub mod transpiler;

#[cfg(test)]
mod testing;

pub mod prelude {
    pub use crate::ast::*;
    pub use crate::auth::{AuthClient, Session, User};
    pub use crate::backend::{Backend, ExecuteQuery, PgBackend, PostgrestClient};
    pub use crate::builder::{FilterableQuery, apply_filters, apply_query_options, validate_filters};
    pub use crate::client::{reset_shared_client, shared_client};
    pub use crate::config::ClientConfig;
    pub use crate::engine::{QueryResult, RowQueryService};
    pub use crate::error::*;
    pub use crate::parser::{parse_filter, parse_filters, parse_order};
    pub use crate::schema::{ColumnInfo, SchemaService, TableSchema};
    pub use crate::transpiler::ToSql;
}

/// Parse a filter expression.
///
/// # Example
///
/// ```
/// use rowlens::parse;
///
/// let clause = parse("age >= 18").unwrap();
/// assert_eq!(clause.column, "age");
/// ```
pub fn parse(input: &str) -> Result<ast::FilterClause, error::RowlensError> {
    parser::parse_filter(input)
}
