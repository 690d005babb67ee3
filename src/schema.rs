//! Schema introspection.
//!
//! Reads table names from `pg_catalog.pg_tables` and column metadata from
//! `information_schema.columns` through the same backend handles the row
//! service uses. Unlike row operations, failures here come back as `Err`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ast::Scalar;
use crate::backend::{Backend, ExecuteQuery, split_qualified};
use crate::builder::FilterableQuery;
use crate::engine::QueryResult;
use crate::error::RowlensResult;

const TABLES_VIEW: &str = "pg_catalog.pg_tables";
const COLUMNS_VIEW: &str = "information_schema.columns";

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub default_value: Option<String>,
}

/// A table and, when described, its columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    schemaname: String,
    tablename: String,
}

#[derive(Debug, Deserialize)]
struct ColumnRow {
    column_name: String,
    data_type: String,
    is_nullable: String,
    column_default: Option<String>,
    #[serde(default)]
    ordinal_position: i64,
}

/// Read-only schema lookups over a backend.
pub struct SchemaService<B> {
    backend: Arc<B>,
    schemas: Vec<String>,
}

impl<B> Clone for SchemaService<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            schemas: self.schemas.clone(),
        }
    }
}

impl<B: Backend> SchemaService<B> {
    /// Introspect the `public` namespace.
    pub fn new(backend: Arc<B>) -> Self {
        Self::with_schemas(backend, vec!["public".to_string()])
    }

    pub fn with_schemas(backend: Arc<B>, schemas: Vec<String>) -> Self {
        Self { backend, schemas }
    }

    /// All tables in the configured namespaces. Tables outside `public` are
    /// named `schema.table`.
    pub async fn list_tables(&self) -> RowlensResult<Vec<TableSchema>> {
        let namespaces: Vec<Scalar> = self.schemas.iter().map(|s| Scalar::from(s.as_str())).collect();
        let query = self
            .backend
            .select(TABLES_VIEW, "schemaname, tablename", false)
            .in_list("schemaname", &namespaces)
            .order("schemaname", true)
            .order("tablename", true);

        let rows: Vec<TableRow> = QueryResult::from_raw(query.execute().await).into_result()?;
        debug!(tables = rows.len(), "listed tables");

        Ok(rows
            .into_iter()
            .map(|row| TableSchema {
                name: if row.schemaname == "public" {
                    row.tablename
                } else {
                    format!("{}.{}", row.schemaname, row.tablename)
                },
                columns: Vec::new(),
            })
            .collect())
    }

    /// Columns of `table` in ascending ordinal position.
    pub async fn describe_table(&self, table: &str) -> RowlensResult<TableSchema> {
        let (schema, name) = split_qualified(table);
        let mut query = self
            .backend
            .select(
                COLUMNS_VIEW,
                "column_name, data_type, is_nullable, column_default, ordinal_position",
                false,
            )
            .eq("table_name", &Scalar::from(name));
        if let Some(schema) = schema {
            query = query.eq("table_schema", &Scalar::from(schema));
        }
        let query = query.order("ordinal_position", true);

        let mut rows: Vec<ColumnRow> =
            QueryResult::from_raw(query.execute().await).into_result()?;
        rows.sort_by_key(|row| row.ordinal_position);

        Ok(TableSchema {
            name: table.to_string(),
            columns: rows
                .into_iter()
                .map(|row| ColumnInfo {
                    name: row.column_name,
                    data_type: row.data_type,
                    is_nullable: row.is_nullable == "YES",
                    default_value: row.column_default,
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RawResponse;
    use crate::error::{QueryError, RowlensError};
    use crate::testing::FakeBackend;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn test_list_tables_restricts_namespaces() {
        let backend = FakeBackend::new();
        backend.respond(
            TABLES_VIEW,
            RawResponse::rows(
                json!([
                    {"schemaname": "public", "tablename": "users"},
                    {"schemaname": "sales", "tablename": "orders"}
                ]),
                None,
            ),
        );
        let service = SchemaService::with_schemas(
            Arc::new(backend.clone()),
            vec!["public".into(), "sales".into()],
        );

        let tables = service.list_tables().await.unwrap();
        let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["users", "sales.orders"]);
        assert!(tables.iter().all(|t| t.columns.is_empty()));

        let executed = backend.executed();
        assert_eq!(executed[0].verb, "select(schemaname, tablename)");
        assert_eq!(executed[0].calls[0], "schemaname in (public,sales)");
    }

    #[tokio::test]
    async fn test_describe_table_orders_by_position() {
        let backend = FakeBackend::new();
        backend.respond(
            COLUMNS_VIEW,
            RawResponse::rows(
                json!([
                    {"column_name": "email", "data_type": "text", "is_nullable": "YES",
                     "column_default": null, "ordinal_position": 2},
                    {"column_name": "id", "data_type": "bigint", "is_nullable": "NO",
                     "column_default": "nextval('users_id_seq'::regclass)", "ordinal_position": 1}
                ]),
                None,
            ),
        );
        let service = SchemaService::new(Arc::new(backend.clone()));

        let schema = service.describe_table("users").await.unwrap();
        assert_eq!(
            schema.columns,
            vec![
                ColumnInfo {
                    name: "id".into(),
                    data_type: "bigint".into(),
                    is_nullable: false,
                    default_value: Some("nextval('users_id_seq'::regclass)".into()),
                },
                ColumnInfo {
                    name: "email".into(),
                    data_type: "text".into(),
                    is_nullable: true,
                    default_value: None,
                },
            ]
        );
        assert_eq!(
            backend.executed()[0].calls,
            vec!["table_name eq users", "order ordinal_position asc"]
        );
    }

    #[tokio::test]
    async fn test_describe_qualified_table_filters_schema() {
        let backend = FakeBackend::new();
        let service = SchemaService::new(Arc::new(backend.clone()));
        let schema = service.describe_table("sales.orders").await.unwrap();
        assert_eq!(schema.name, "sales.orders");
        assert!(schema.columns.is_empty());
        assert_eq!(
            backend.executed()[0].calls,
            vec![
                "table_name eq orders",
                "table_schema eq sales",
                "order ordinal_position asc"
            ]
        );
    }

    #[tokio::test]
    async fn test_backend_error_propagates() {
        let backend = FakeBackend::new();
        backend.respond(
            TABLES_VIEW,
            RawResponse::failed(QueryError::backend("42501", "permission denied")),
        );
        let service = SchemaService::new(Arc::new(backend));
        match service.list_tables().await {
            Err(RowlensError::Query(e)) => assert_eq!(e.message, "permission denied"),
            other => panic!("expected query error, got {:?}", other),
        }
    }
}
