//! Table explorer: browse tables, their columns and a page of rows.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::ast::{QueryOptions, Row};
use crate::backend::Backend;
use crate::controller::generation::RequestTracker;
use crate::engine::RowQueryService;
use crate::schema::{ColumnInfo, SchemaService, TableSchema};

/// Rows shown per table unless changed with [`TableExplorer::set_limit`].
pub const DEFAULT_PAGE_LIMIT: u64 = 25;

/// Snapshot of what the explorer shows.
#[derive(Debug, Clone, PartialEq)]
pub struct ExplorerState {
    pub tables: Vec<TableSchema>,
    pub active_table: Option<String>,
    pub loading: bool,
    pub error: Option<String>,
    /// `None` until a table has loaded.
    pub rows: Option<Vec<Row>>,
    pub columns: Vec<ColumnInfo>,
}

impl Default for ExplorerState {
    fn default() -> Self {
        Self {
            tables: Vec::new(),
            active_table: None,
            loading: true,
            error: None,
            rows: None,
            columns: Vec::new(),
        }
    }
}

pub struct TableExplorer<B> {
    rows: RowQueryService<B>,
    schema: SchemaService<B>,
    // Listing and per-table loads are superseded independently.
    tables_tracker: RequestTracker,
    table_tracker: RequestTracker,
    limit: Mutex<u64>,
    state: Mutex<ExplorerState>,
}

impl<B: Backend> TableExplorer<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self::with_schema(RowQueryService::new(Arc::clone(&backend)), SchemaService::new(backend))
    }

    pub fn with_schema(rows: RowQueryService<B>, schema: SchemaService<B>) -> Self {
        Self {
            rows,
            schema,
            tables_tracker: RequestTracker::new(),
            table_tracker: RequestTracker::new(),
            limit: Mutex::new(DEFAULT_PAGE_LIMIT),
            state: Mutex::new(ExplorerState::default()),
        }
    }

    pub fn state(&self) -> ExplorerState {
        self.state.lock().clone()
    }

    pub fn limit(&self) -> u64 {
        *self.limit.lock()
    }

    /// Change the page size used by the next [`load_table`](Self::load_table).
    pub fn set_limit(&self, limit: u64) {
        *self.limit.lock() = limit.max(1);
    }

    /// List tables and make the first one active.
    ///
    /// A table that is already active and still listed stays active.
    /// Returns `false` when a newer listing superseded this one and its
    /// response was discarded.
    pub async fn load_tables(&self) -> bool {
        let generation = self.tables_tracker.issue();
        self.begin();

        let result = self.schema.list_tables().await;
        if !self.tables_tracker.is_current(generation) {
            debug!("discarding stale table list");
            return false;
        }

        let mut state = self.state.lock();
        match result {
            Ok(tables) => {
                let keep = state
                    .active_table
                    .as_ref()
                    .is_some_and(|active| tables.iter().any(|t| &t.name == active));
                if !keep {
                    state.active_table = tables.first().map(|t| t.name.clone());
                }
                state.tables = tables;
            }
            Err(e) => state.error = Some(error_message(&e.to_string(), "Failed to load tables")),
        }
        state.loading = false;
        true
    }

    /// Load the columns and first page of rows of `table` concurrently.
    ///
    /// Returns `false` when a newer table load superseded this one.
    pub async fn load_table(&self, table: &str) -> bool {
        let generation = self.table_tracker.issue();
        self.begin();

        let options = QueryOptions::new().limit(self.limit()).order_by("id", true);
        let (described, fetched) = tokio::join!(
            self.schema.describe_table(table),
            self.rows.fetch_rows::<Row>(table, &[], &options),
        );
        if !self.table_tracker.is_current(generation) {
            debug!(table, "discarding stale table load");
            return false;
        }

        let mut state = self.state.lock();
        state.loading = false;
        match (described, fetched.error) {
            (Err(e), _) => {
                state.error = Some(error_message(&e.to_string(), "Failed to load table data"));
            }
            (Ok(_), Some(e)) => {
                state.error = Some(error_message(&e.message, "Failed to load table data"));
            }
            (Ok(schema), None) => {
                state.active_table = Some(table.to_string());
                state.columns = schema.columns;
                state.rows = fetched.data;
            }
        }
        true
    }

    fn begin(&self) {
        let mut state = self.state.lock();
        state.loading = true;
        state.error = None;
    }
}

fn error_message(message: &str, fallback: &str) -> String {
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RawResponse;
    use crate::error::QueryError;
    use crate::testing::FakeBackend;
    use serde_json::json;
    use std::time::Duration;

    fn backend_with_users() -> FakeBackend {
        let backend = FakeBackend::new();
        backend.respond(
            "pg_catalog.pg_tables",
            RawResponse::rows(
                json!([
                    {"schemaname": "public", "tablename": "users"},
                    {"schemaname": "public", "tablename": "posts"}
                ]),
                None,
            ),
        );
        backend.respond(
            "information_schema.columns",
            RawResponse::rows(
                json!([{"column_name": "id", "data_type": "bigint", "is_nullable": "NO",
                        "column_default": null, "ordinal_position": 1}]),
                None,
            ),
        );
        backend.respond("users", RawResponse::rows(json!([{"id": 1}, {"id": 2}]), None));
        backend
    }

    #[test]
    fn test_initial_state_is_loading() {
        let explorer = TableExplorer::new(Arc::new(FakeBackend::new()));
        let state = explorer.state();
        assert!(state.loading);
        assert!(state.rows.is_none());
        assert_eq!(explorer.limit(), DEFAULT_PAGE_LIMIT);
    }

    #[tokio::test]
    async fn test_load_tables_activates_first() {
        let explorer = TableExplorer::new(Arc::new(backend_with_users()));
        assert!(explorer.load_tables().await);
        let state = explorer.state();
        assert_eq!(state.tables.len(), 2);
        assert_eq!(state.active_table.as_deref(), Some("users"));
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn test_load_table_fetches_page_ordered_by_id() {
        let backend = backend_with_users();
        let explorer = TableExplorer::new(Arc::new(backend.clone()));
        explorer.set_limit(10);
        assert!(explorer.load_table("users").await);

        let state = explorer.state();
        assert_eq!(state.columns.len(), 1);
        assert_eq!(state.rows.map(|r| r.len()), Some(2));
        assert!(state.error.is_none());

        let fetch = backend
            .executed()
            .into_iter()
            .find(|q| q.table == "users")
            .unwrap();
        assert_eq!(fetch.calls, vec!["order id asc", "limit 10"]);
    }

    #[tokio::test]
    async fn test_row_error_becomes_view_error() {
        let backend = backend_with_users();
        backend.respond(
            "users",
            RawResponse::failed(QueryError::backend("42703", "column users.id does not exist")),
        );
        let explorer = TableExplorer::new(Arc::new(backend));
        explorer.load_table("users").await;
        let state = explorer.state();
        assert_eq!(state.error.as_deref(), Some("column users.id does not exist"));
        assert!(state.rows.is_none());
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn test_stale_table_load_is_discarded() {
        let backend = backend_with_users();
        backend.delay("users", Duration::from_millis(50));
        backend.respond("posts", RawResponse::rows(json!([{"id": 9}]), None));
        let explorer = TableExplorer::new(Arc::new(backend));

        let (slow, fast) = tokio::join!(explorer.load_table("users"), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            explorer.load_table("posts").await
        });
        assert!(!slow);
        assert!(fast);
        let state = explorer.state();
        assert_eq!(state.active_table.as_deref(), Some("posts"));
        assert_eq!(state.rows.map(|r| r.len()), Some(1));
    }

    #[tokio::test]
    async fn test_table_load_does_not_discard_table_list() {
        let backend = backend_with_users();
        backend.delay("pg_catalog.pg_tables", Duration::from_millis(50));
        backend.respond("posts", RawResponse::rows(json!([{"id": 9}]), None));
        let explorer = TableExplorer::new(Arc::new(backend));

        let (listed, loaded) = tokio::join!(explorer.load_tables(), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            explorer.load_table("posts").await
        });
        assert!(listed);
        assert!(loaded);
        let state = explorer.state();
        assert_eq!(state.tables.len(), 2);
        assert_eq!(state.active_table.as_deref(), Some("posts"));
        assert_eq!(state.rows.map(|r| r.len()), Some(1));
    }
}
