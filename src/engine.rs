//! Row query service.
//!
//! Builds a handle on a [`Backend`], threads filters and options through
//! it, executes it and normalizes the outcome into a [`QueryResult`]. None
//! of these operations return `Err`; callers check `error`.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::ast::{FilterClause, QueryOptions, Row};
use crate::backend::{Backend, ExecuteQuery, RawResponse};
use crate::builder::{apply_filters, apply_query_options, validate_filters};
use crate::error::{QueryError, RowlensResult};

/// Outcome of a row operation.
///
/// Exactly one of `data` and `error` is set. `count` is only set when a
/// count was requested.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult<T = Row> {
    pub data: Option<Vec<T>>,
    pub error: Option<QueryError>,
    pub count: Option<u64>,
}

impl<T> QueryResult<T> {
    pub fn ok(data: Vec<T>, count: Option<u64>) -> Self {
        Self {
            data: Some(data),
            error: None,
            count,
        }
    }

    pub fn err(error: QueryError) -> Self {
        Self {
            data: None,
            error: Some(error),
            count: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Normalize into a `Result`, for callers that prefer `?`.
    pub fn into_result(self) -> RowlensResult<Vec<T>> {
        match self.error {
            Some(error) => Err(error.into()),
            None => Ok(self.data.unwrap_or_default()),
        }
    }
}

impl<T: DeserializeOwned> QueryResult<T> {
    /// Decode a raw backend response into typed rows.
    pub fn from_raw(raw: RawResponse) -> Self {
        if let Some(error) = raw.error {
            return Self::err(error);
        }
        let data = match raw.data {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => {
                match items
                    .into_iter()
                    .map(serde_json::from_value)
                    .collect::<Result<Vec<T>, _>>()
                {
                    Ok(rows) => rows,
                    Err(e) => return Self::err(QueryError::decode(e.to_string())),
                }
            }
            Some(single) => match serde_json::from_value(single) {
                Ok(row) => vec![row],
                Err(e) => return Self::err(QueryError::decode(e.to_string())),
            },
        };
        Self::ok(data, raw.count)
    }
}

/// Row operations over a backend.
pub struct RowQueryService<B> {
    backend: Arc<B>,
}

impl<B> Clone for RowQueryService<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<B: Backend> RowQueryService<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Build the select handle for `fetch_rows` without executing it.
    pub fn build_select(
        &self,
        table: &str,
        filters: &[FilterClause],
        options: &QueryOptions,
    ) -> Result<B::Query, QueryError> {
        validate_filters(filters)?;
        options.validate()?;
        let query = self
            .backend
            .select(table, &options.projection(), options.count);
        let query = apply_filters(query, filters);
        Ok(apply_query_options(query, options))
    }

    /// Fetch rows matching `filters`, shaped by `options`.
    pub async fn fetch_rows<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[FilterClause],
        options: &QueryOptions,
    ) -> QueryResult<T> {
        let query = match self.build_select(table, filters, options) {
            Ok(query) => query,
            Err(e) => return QueryResult::err(e),
        };
        debug!(table, filters = filters.len(), "fetching rows");

        let mut result = QueryResult::from_raw(query.execute().await);
        if !options.count {
            result.count = None;
        }
        result
    }

    /// Insert one record and return the inserted row(s).
    pub async fn insert_row<T, P>(&self, table: &str, payload: &P) -> QueryResult<T>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        let payload = match to_payload(payload) {
            Ok(payload) => payload,
            Err(e) => return QueryResult::err(e),
        };
        debug!(table, "inserting row");
        without_count(QueryResult::from_raw(
            self.backend.insert(table, payload).execute().await,
        ))
    }

    /// Build the update handle for `update_row` without executing it.
    pub fn build_update<P>(
        &self,
        table: &str,
        payload: &P,
        filters: &[FilterClause],
    ) -> Result<B::Query, QueryError>
    where
        P: Serialize + ?Sized,
    {
        validate_filters(filters)?;
        let payload = to_payload(payload)?;
        if filters.is_empty() {
            warn!(table, "updating without filters affects every row");
        }
        Ok(apply_filters(self.backend.update(table, payload), filters))
    }

    /// Build the delete handle for `delete_rows` without executing it.
    pub fn build_delete(&self, table: &str, filters: &[FilterClause]) -> Result<B::Query, QueryError> {
        validate_filters(filters)?;
        if filters.is_empty() {
            warn!(table, "deleting without filters affects every row");
        }
        Ok(apply_filters(self.backend.delete(table), filters))
    }

    /// Apply a partial update to the rows matching `filters`.
    pub async fn update_row<T, P>(
        &self,
        table: &str,
        payload: &P,
        filters: &[FilterClause],
    ) -> QueryResult<T>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        match self.build_update(table, payload, filters) {
            Ok(query) => without_count(QueryResult::from_raw(query.execute().await)),
            Err(e) => QueryResult::err(e),
        }
    }

    /// Delete the rows matching `filters` and return them.
    pub async fn delete_rows(&self, table: &str, filters: &[FilterClause]) -> QueryResult<Row> {
        match self.build_delete(table, filters) {
            Ok(query) => without_count(QueryResult::from_raw(query.execute().await)),
            Err(e) => QueryResult::err(e),
        }
    }
}

fn to_payload<P: Serialize + ?Sized>(payload: &P) -> Result<Value, QueryError> {
    serde_json::to_value(payload).map_err(|e| QueryError::decode(format!("invalid payload: {}", e)))
}

fn without_count<T>(mut result: QueryResult<T>) -> QueryResult<T> {
    result.count = None;
    result
}
