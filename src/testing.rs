//! In-memory backend for unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::ast::Scalar;
use crate::backend::{Backend, ExecuteQuery, RawResponse};
use crate::builder::FilterableQuery;

#[derive(Default)]
struct Shared {
    responses: HashMap<String, RawResponse>,
    delays: HashMap<String, Duration>,
    executed: Vec<FakeQuery>,
}

/// Answers every query on a table with a canned response and records what
/// was executed.
#[derive(Clone, Default)]
pub struct FakeBackend {
    shared: Arc<Mutex<Shared>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, table: &str, response: RawResponse) -> &Self {
        self.shared.lock().responses.insert(table.to_string(), response);
        self
    }

    pub fn delay(&self, table: &str, delay: Duration) -> &Self {
        self.shared.lock().delays.insert(table.to_string(), delay);
        self
    }

    pub fn executed(&self) -> Vec<FakeQuery> {
        self.shared.lock().executed.clone()
    }

    fn start(&self, table: &str, verb: &str, payload: Option<Value>) -> FakeQuery {
        FakeQuery {
            backend: self.clone(),
            table: table.to_string(),
            verb: verb.to_string(),
            payload,
            calls: Vec::new(),
        }
    }
}

impl Backend for FakeBackend {
    type Query = FakeQuery;

    fn select(&self, table: &str, columns: &str, exact_count: bool) -> FakeQuery {
        let verb = if exact_count {
            format!("select({}) count", columns)
        } else {
            format!("select({})", columns)
        };
        self.start(table, &verb, None)
    }

    fn insert(&self, table: &str, payload: Value) -> FakeQuery {
        self.start(table, "insert", Some(payload))
    }

    fn update(&self, table: &str, payload: Value) -> FakeQuery {
        self.start(table, "update", Some(payload))
    }

    fn delete(&self, table: &str) -> FakeQuery {
        self.start(table, "delete", None)
    }
}

#[derive(Clone)]
pub struct FakeQuery {
    backend: FakeBackend,
    pub table: String,
    pub verb: String,
    pub payload: Option<Value>,
    pub calls: Vec<String>,
}

impl std::fmt::Debug for FakeQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeQuery")
            .field("table", &self.table)
            .field("verb", &self.verb)
            .field("calls", &self.calls)
            .finish()
    }
}

impl FakeQuery {
    fn push(mut self, call: String) -> Self {
        self.calls.push(call);
        self
    }

    fn filter(self, op: &str, column: &str, value: &Scalar) -> Self {
        self.push(format!("{} {} {}", column, op, value))
    }
}

impl FilterableQuery for FakeQuery {
    fn eq(self, column: &str, value: &Scalar) -> Self {
        self.filter("eq", column, value)
    }

    fn neq(self, column: &str, value: &Scalar) -> Self {
        self.filter("neq", column, value)
    }

    fn gt(self, column: &str, value: &Scalar) -> Self {
        self.filter("gt", column, value)
    }

    fn gte(self, column: &str, value: &Scalar) -> Self {
        self.filter("gte", column, value)
    }

    fn lt(self, column: &str, value: &Scalar) -> Self {
        self.filter("lt", column, value)
    }

    fn lte(self, column: &str, value: &Scalar) -> Self {
        self.filter("lte", column, value)
    }

    fn like(self, column: &str, pattern: &Scalar) -> Self {
        self.filter("like", column, pattern)
    }

    fn ilike(self, column: &str, pattern: &Scalar) -> Self {
        self.filter("ilike", column, pattern)
    }

    fn is(self, column: &str, value: &Scalar) -> Self {
        self.filter("is", column, value)
    }

    fn in_list(self, column: &str, values: &[Scalar]) -> Self {
        let items: Vec<String> = values.iter().map(ToString::to_string).collect();
        self.push(format!("{} in ({})", column, items.join(",")))
    }

    fn order(self, column: &str, ascending: bool) -> Self {
        let dir = if ascending { "asc" } else { "desc" };
        self.push(format!("order {} {}", column, dir))
    }

    fn limit(self, n: u64) -> Self {
        self.push(format!("limit {}", n))
    }

    fn range(self, from: u64, to: u64) -> Self {
        self.push(format!("range {}-{}", from, to))
    }
}

#[async_trait]
impl ExecuteQuery for FakeQuery {
    async fn execute(self) -> RawResponse {
        let delay = self.backend.shared.lock().delays.get(&self.table).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut shared = self.backend.shared.lock();
        let response = shared
            .responses
            .get(&self.table)
            .cloned()
            .unwrap_or_else(|| RawResponse::rows(Value::Array(Vec::new()), None));
        shared.executed.push(self.clone());
        response
    }
}
