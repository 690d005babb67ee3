//! Ad-hoc query runner over editable filter drafts.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::ast::{FilterClause, FilterOperator, FilterValue, QueryOptions, Row, Scalar};
use crate::backend::Backend;
use crate::controller::generation::RequestTracker;
use crate::engine::RowQueryService;

pub const MISSING_TABLE_MESSAGE: &str = "Please provide a table name.";

/// A filter row being edited. `value` is the raw text typed by the user.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterDraft {
    pub id: Uuid,
    pub column: String,
    pub operator: FilterOperator,
    pub value: String,
}

impl FilterDraft {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            column: String::new(),
            operator: FilterOperator::Eq,
            value: String::new(),
        }
    }

    fn apply(&mut self, patch: DraftPatch) {
        if let Some(column) = patch.column {
            self.column = column;
        }
        if let Some(operator) = patch.operator {
            self.operator = operator;
        }
        if let Some(value) = patch.value {
            self.value = value;
        }
    }

    /// The clause this draft runs as, or `None` while it is incomplete.
    ///
    /// `in` values are split on commas. `is` values are inferred so that
    /// `null`, `true` and `false` keep their meaning; everything else is
    /// sent as text.
    pub fn to_clause(&self) -> Option<FilterClause> {
        if self.column.is_empty() || self.value.is_empty() {
            return None;
        }
        let value = match self.operator {
            FilterOperator::In => {
                FilterValue::List(self.value.split(',').map(Scalar::from).collect())
            }
            FilterOperator::Is => FilterValue::Scalar(Scalar::infer(self.value.trim())),
            _ => FilterValue::Scalar(Scalar::from(self.value.as_str())),
        };
        Some(FilterClause {
            column: self.column.clone(),
            operator: self.operator.clone(),
            value,
        })
    }
}

impl Default for FilterDraft {
    fn default() -> Self {
        Self::new()
    }
}

/// Partial edit of a [`FilterDraft`]; unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DraftPatch {
    pub column: Option<String>,
    pub operator: Option<FilterOperator>,
    pub value: Option<String>,
}

impl DraftPatch {
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn operator(mut self, operator: impl Into<FilterOperator>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunnerState {
    pub table_name: String,
    pub drafts: Vec<FilterDraft>,
    /// `None` until a query has returned.
    pub rows: Option<Vec<Row>>,
    pub loading: bool,
    pub error: Option<String>,
}

impl Default for RunnerState {
    fn default() -> Self {
        Self {
            table_name: String::new(),
            drafts: vec![FilterDraft::new()],
            rows: None,
            loading: false,
            error: None,
        }
    }
}

pub struct QueryRunner<B> {
    service: RowQueryService<B>,
    tracker: RequestTracker,
    state: Mutex<RunnerState>,
}

impl<B: Backend> QueryRunner<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self::with_service(RowQueryService::new(backend))
    }

    pub fn with_service(service: RowQueryService<B>) -> Self {
        Self {
            service,
            tracker: RequestTracker::new(),
            state: Mutex::new(RunnerState::default()),
        }
    }

    pub fn state(&self) -> RunnerState {
        self.state.lock().clone()
    }

    pub fn set_table_name(&self, name: impl Into<String>) {
        self.state.lock().table_name = name.into();
    }

    /// Append an empty draft and return its id.
    pub fn add_draft(&self) -> Uuid {
        let draft = FilterDraft::new();
        let id = draft.id;
        self.state.lock().drafts.push(draft);
        id
    }

    /// Returns `false` when no draft has this id.
    pub fn update_draft(&self, id: Uuid, patch: DraftPatch) -> bool {
        let mut state = self.state.lock();
        match state.drafts.iter_mut().find(|d| d.id == id) {
            Some(draft) => {
                draft.apply(patch);
                true
            }
            None => false,
        }
    }

    pub fn remove_draft(&self, id: Uuid) -> bool {
        let mut state = self.state.lock();
        let before = state.drafts.len();
        state.drafts.retain(|d| d.id != id);
        state.drafts.len() != before
    }

    /// Run the current table name and drafts.
    ///
    /// Returns `false` when nothing was applied: either a newer run
    /// superseded this one, or there was no table name.
    pub async fn run(&self) -> bool {
        let (table, filters) = {
            let mut state = self.state.lock();
            if state.table_name.is_empty() {
                state.error = Some(MISSING_TABLE_MESSAGE.to_string());
                return false;
            }
            state.loading = true;
            state.error = None;
            let filters: Vec<FilterClause> =
                state.drafts.iter().filter_map(FilterDraft::to_clause).collect();
            (state.table_name.clone(), filters)
        };

        let generation = self.tracker.issue();
        debug!(table = %table, filters = filters.len(), "running query");
        let result = self
            .service
            .fetch_rows::<Row>(&table, &filters, &QueryOptions::new())
            .await;
        if !self.tracker.is_current(generation) {
            debug!(table = %table, "discarding stale query result");
            return false;
        }

        let mut state = self.state.lock();
        if let Some(error) = result.error {
            state.error = Some(error.message);
        }
        state.rows = result.data;
        state.loading = false;
        true
    }
}
