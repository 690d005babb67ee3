//! Direct Postgres backend.
//!
//! Runs [`SqlPlan`]s through a sqlx pool. Useful against a local database
//! where no PostgREST endpoint is running.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{debug, info};

use crate::ast::Scalar;
use crate::backend::{Backend, ExecuteQuery, RawResponse};
use crate::builder::FilterableQuery;
use crate::error::{QueryError, RowlensError, RowlensResult};
use crate::transpiler::{SqlPlan, Statement, ToSql};

/// A Postgres connection pool used as a query backend.
#[derive(Clone, Debug)]
pub struct PgBackend {
    pool: PgPool,
}

impl PgBackend {
    /// Connect using a `postgres://` URL.
    pub async fn connect(url: &str) -> RowlensResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| RowlensError::Database(e.to_string()))?;
        info!("connected to Postgres");
        Ok(Self { pool })
    }

    /// Build a backend whose connections open on first use.
    pub fn connect_lazy(url: &str) -> RowlensResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(url)
            .map_err(|e| RowlensError::Database(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn query(&self, table: &str, statement: Statement) -> PgQuery {
        PgQuery {
            pool: self.pool.clone(),
            plan: SqlPlan::new(table, statement),
        }
    }
}

impl Backend for PgBackend {
    type Query = PgQuery;

    fn select(&self, table: &str, columns: &str, exact_count: bool) -> PgQuery {
        self.query(
            table,
            Statement::Select {
                columns: columns.to_string(),
                exact_count,
            },
        )
    }

    fn insert(&self, table: &str, payload: Value) -> PgQuery {
        self.query(table, Statement::Insert { payload })
    }

    fn update(&self, table: &str, payload: Value) -> PgQuery {
        self.query(table, Statement::Update { payload })
    }

    fn delete(&self, table: &str) -> PgQuery {
        self.query(table, Statement::Delete)
    }
}

/// A not-yet-executed statement against a pool.
#[derive(Clone, Debug)]
pub struct PgQuery {
    pool: PgPool,
    plan: SqlPlan,
}

impl PgQuery {
    pub fn plan(&self) -> &SqlPlan {
        &self.plan
    }

    fn map(mut self, f: impl FnOnce(SqlPlan) -> SqlPlan) -> Self {
        self.plan = f(self.plan);
        self
    }

    fn check_payload(&self) -> Result<(), QueryError> {
        match self.plan.statement() {
            Statement::Insert { payload } if !payload.is_object() => Err(QueryError::validation(
                "insert payload must be a JSON object",
            )),
            Statement::Update { payload } => match payload.as_object() {
                Some(obj) if !obj.is_empty() => Ok(()),
                _ => Err(QueryError::validation(
                    "update payload must be a JSON object with at least one column",
                )),
            },
            _ => Ok(()),
        }
    }

    async fn run(&self) -> Result<RawResponse, sqlx::Error> {
        let sql = self.plan.to_sql();
        debug!(%sql, "executing statement");

        let mut query = sqlx::query_scalar::<_, Value>(&sql);
        if let Some(payload) = self.plan.payload() {
            query = query.bind(sqlx::types::Json(payload.clone()));
        }
        let data = query.fetch_one(&self.pool).await?;

        let count = match self.plan.count_sql() {
            Some(count_sql) => {
                let total: i64 = sqlx::query_scalar(&count_sql).fetch_one(&self.pool).await?;
                Some(total.max(0) as u64)
            }
            None => None,
        };

        Ok(RawResponse::rows(data, count))
    }
}

impl ToSql for PgQuery {
    fn to_sql(&self) -> String {
        self.plan.to_sql()
    }
}

impl FilterableQuery for PgQuery {
    fn eq(self, column: &str, value: &Scalar) -> Self {
        self.map(|p| p.eq(column, value))
    }

    fn neq(self, column: &str, value: &Scalar) -> Self {
        self.map(|p| p.neq(column, value))
    }

    fn gt(self, column: &str, value: &Scalar) -> Self {
        self.map(|p| p.gt(column, value))
    }

    fn gte(self, column: &str, value: &Scalar) -> Self {
        self.map(|p| p.gte(column, value))
    }

    fn lt(self, column: &str, value: &Scalar) -> Self {
        self.map(|p| p.lt(column, value))
    }

    fn lte(self, column: &str, value: &Scalar) -> Self {
        self.map(|p| p.lte(column, value))
    }

    fn like(self, column: &str, pattern: &Scalar) -> Self {
        self.map(|p| p.like(column, pattern))
    }

    fn ilike(self, column: &str, pattern: &Scalar) -> Self {
        self.map(|p| p.ilike(column, pattern))
    }

    fn is(self, column: &str, value: &Scalar) -> Self {
        self.map(|p| p.is(column, value))
    }

    fn in_list(self, column: &str, values: &[Scalar]) -> Self {
        self.map(|p| p.in_list(column, values))
    }

    fn order(self, column: &str, ascending: bool) -> Self {
        self.map(|p| p.order(column, ascending))
    }

    fn limit(self, n: u64) -> Self {
        self.map(|p| p.limit(n))
    }

    fn range(self, from: u64, to: u64) -> Self {
        self.map(|p| p.range(from, to))
    }
}

#[async_trait]
impl ExecuteQuery for PgQuery {
    async fn execute(self) -> RawResponse {
        if let Err(e) = self.check_payload() {
            return RawResponse::failed(e);
        }
        match self.run().await {
            Ok(response) => response,
            Err(e) => RawResponse::failed(map_sqlx_error(e)),
        }
    }
}

fn map_sqlx_error(err: sqlx::Error) -> QueryError {
    match err {
        sqlx::Error::Database(db) => {
            let code = db.code().map(|c| c.to_string()).unwrap_or_default();
            QueryError::backend(code, db.message())
        }
        sqlx::Error::ColumnDecode { source, .. } | sqlx::Error::Decode(source) => {
            QueryError::decode(source.to_string())
        }
        other => QueryError::transport(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_builder_calls_reach_plan() {
        let backend = PgBackend::connect_lazy("postgres://localhost/rowlens_test").unwrap();
        let q = backend
            .select("users", "id", false)
            .eq("active", &Scalar::Bool(true))
            .limit(3);
        assert!(q.to_sql().contains("WHERE \"active\" = 'true' LIMIT 3"));
    }

    #[tokio::test]
    async fn test_empty_update_rejected_before_sending() {
        let backend = PgBackend::connect_lazy("postgres://localhost/rowlens_test").unwrap();
        let response = backend.update("users", serde_json::json!({})).execute().await;
        let err = response.error.unwrap();
        assert_eq!(err.kind, crate::error::ErrorKind::Validation);
    }
}
