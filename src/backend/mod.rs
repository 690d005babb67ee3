//! Boundary client interface.
//!
//! The services only see these traits. [`postgrest`] implements them over
//! the PostgREST HTTP dialect, [`postgres`] renders SQL and runs it through
//! sqlx.

use async_trait::async_trait;
use serde_json::Value;

use crate::builder::FilterableQuery;
use crate::error::QueryError;

pub mod postgres;
pub mod postgrest;

pub use postgres::{PgBackend, PgQuery};
pub use postgrest::{PostgrestClient, PostgrestQuery};

/// The raw outcome of executing a handle.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawResponse {
    /// A JSON array of rows on success.
    pub data: Option<Value>,
    pub error: Option<QueryError>,
    pub count: Option<u64>,
}

impl RawResponse {
    pub fn rows(data: Value, count: Option<u64>) -> Self {
        Self {
            data: Some(data),
            error: None,
            count,
        }
    }

    pub fn failed(error: QueryError) -> Self {
        Self {
            data: None,
            error: Some(error),
            count: None,
        }
    }
}

/// Execution boundary of a query handle.
#[async_trait]
pub trait ExecuteQuery: Send + Sized {
    /// Send the query. Never fails: transport problems come back as an
    /// inline [`QueryError`].
    async fn execute(self) -> RawResponse;
}

/// A backend able to start queries against a table.
///
/// Table names may be schema-qualified (`schema.table`). Mutation handles
/// always ask for the affected rows back.
pub trait Backend: Send + Sync {
    type Query: FilterableQuery + ExecuteQuery;

    /// Start a read. `columns` is the select list (`*` or `a,b`).
    fn select(&self, table: &str, columns: &str, exact_count: bool) -> Self::Query;

    fn insert(&self, table: &str, payload: Value) -> Self::Query;

    /// Partial update; filters applied to the returned handle pick the rows.
    fn update(&self, table: &str, payload: Value) -> Self::Query;

    fn delete(&self, table: &str) -> Self::Query;
}

/// Split `schema.table` into its parts.
pub fn split_qualified(table: &str) -> (Option<&str>, &str) {
    match table.split_once('.') {
        Some((schema, name)) if !schema.is_empty() && !name.is_empty() => (Some(schema), name),
        _ => (None, table),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_qualified() {
        assert_eq!(split_qualified("pg_catalog.pg_tables"), (Some("pg_catalog"), "pg_tables"));
        assert_eq!(split_qualified("users"), (None, "users"));
        assert_eq!(split_qualified(".users"), (None, ".users"));
    }
}
