//! SQL transpiler for the Postgres backend.
//!
//! A [`SqlPlan`] collects the same builder calls a PostgREST handle does and
//! renders them into one Postgres statement that yields the affected rows as
//! a single JSON array. Literals are emitted as quoted, untyped constants so
//! Postgres coerces them to the column type.

use serde_json::Value;

use crate::ast::Scalar;
use crate::backend::split_qualified;
use crate::builder::FilterableQuery;

/// Trait for converting plans to SQL.
pub trait ToSql {
    /// Convert this node to a SQL string.
    fn to_sql(&self) -> String;
}

/// Statement kind of a plan.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select { columns: String, exact_count: bool },
    Insert { payload: Value },
    Update { payload: Value },
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
struct Predicate {
    column: String,
    /// Operator and right hand side, e.g. `>= '18'`.
    tail: String,
}

/// A relation, a statement and the filters/options applied to it.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlPlan {
    schema: Option<String>,
    table: String,
    statement: Statement,
    predicates: Vec<Predicate>,
    order: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
}

const TARGET_ALIAS: &str = "_t";
const RECORD_ALIAS: &str = "_r";
const RESULT_ALIAS: &str = "_m";

impl SqlPlan {
    pub fn new(table: &str, statement: Statement) -> Self {
        let (schema, name) = split_qualified(table);
        Self {
            schema: schema.map(str::to_string),
            table: name.to_string(),
            statement,
            predicates: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    /// Whether the plan needs the payload bound as `$1`.
    pub fn payload(&self) -> Option<&Value> {
        match &self.statement {
            Statement::Insert { payload } | Statement::Update { payload } => Some(payload),
            _ => None,
        }
    }

    fn relation(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(&self.table)),
            None => quote_ident(&self.table),
        }
    }

    fn push(mut self, column: &str, tail: String) -> Self {
        self.predicates.push(Predicate {
            column: column.to_string(),
            tail,
        });
        self
    }

    fn compare(self, column: &str, op: &str, value: &Scalar) -> Self {
        let tail = format!("{} {}", op, quote_literal(value));
        self.push(column, tail)
    }

    fn where_clause(&self, qualifier: Option<&str>) -> String {
        if self.predicates.is_empty() {
            return String::new();
        }
        let prefix = qualifier.map(|q| format!("{}.", q)).unwrap_or_default();
        let conditions: Vec<String> = self
            .predicates
            .iter()
            .map(|p| format!("{}{} {}", prefix, quote_ident(&p.column), p.tail))
            .collect();
        format!(" WHERE {}", conditions.join(" AND "))
    }

    fn select_sql(&self, columns: &str) -> String {
        let mut sql = format!("SELECT {} FROM {}", select_list(columns), self.relation());
        sql.push_str(&self.where_clause(None));
        if !self.order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order.join(", "));
        }
        if let Some(n) = self.limit {
            sql.push_str(&format!(" LIMIT {}", n));
        }
        if let Some(n) = self.offset {
            sql.push_str(&format!(" OFFSET {}", n));
        }
        sql
    }

    /// `SELECT count(*)` over the filtered relation, ignoring pagination.
    pub fn count_sql(&self) -> Option<String> {
        match &self.statement {
            Statement::Select {
                exact_count: true, ..
            } => Some(format!(
                "SELECT count(*) FROM {}{}",
                self.relation(),
                self.where_clause(None)
            )),
            _ => None,
        }
    }

    fn mutation_sql(&self) -> String {
        let rel = self.relation();
        match &self.statement {
            Statement::Insert { payload } => {
                let keys = payload_keys(payload);
                if keys.is_empty() {
                    format!("INSERT INTO {} DEFAULT VALUES RETURNING *", rel)
                } else {
                    let cols = keys.join(", ");
                    format!(
                        "INSERT INTO {rel} ({cols}) SELECT {cols} FROM jsonb_populate_record(NULL::{rel}, $1) RETURNING *"
                    )
                }
            }
            Statement::Update { payload } => {
                let assignments: Vec<String> = payload_keys(payload)
                    .iter()
                    .map(|col| format!("{} = {}.{}", col, RECORD_ALIAS, col))
                    .collect();
                format!(
                    "UPDATE {rel} AS {t} SET {set} FROM jsonb_populate_record(NULL::{rel}, $1) AS {r}{w} RETURNING {t}.*",
                    t = TARGET_ALIAS,
                    r = RECORD_ALIAS,
                    set = assignments.join(", "),
                    w = self.where_clause(Some(TARGET_ALIAS)),
                )
            }
            Statement::Delete => format!(
                "DELETE FROM {} AS {}{} RETURNING {}.*",
                rel,
                TARGET_ALIAS,
                self.where_clause(Some(TARGET_ALIAS)),
                TARGET_ALIAS
            ),
            Statement::Select { columns, .. } => self.select_sql(columns),
        }
    }
}

impl ToSql for SqlPlan {
    fn to_sql(&self) -> String {
        match &self.statement {
            Statement::Select { columns, .. } => format!(
                "SELECT coalesce(json_agg({a}), '[]'::json) FROM ({inner}) AS {a}",
                a = RESULT_ALIAS,
                inner = self.select_sql(columns)
            ),
            _ => format!(
                "WITH {a} AS ({inner}) SELECT coalesce(json_agg({a}), '[]'::json) FROM {a}",
                a = RESULT_ALIAS,
                inner = self.mutation_sql()
            ),
        }
    }
}

impl FilterableQuery for SqlPlan {
    fn eq(self, column: &str, value: &Scalar) -> Self {
        self.compare(column, "=", value)
    }

    fn neq(self, column: &str, value: &Scalar) -> Self {
        self.compare(column, "<>", value)
    }

    fn gt(self, column: &str, value: &Scalar) -> Self {
        self.compare(column, ">", value)
    }

    fn gte(self, column: &str, value: &Scalar) -> Self {
        self.compare(column, ">=", value)
    }

    fn lt(self, column: &str, value: &Scalar) -> Self {
        self.compare(column, "<", value)
    }

    fn lte(self, column: &str, value: &Scalar) -> Self {
        self.compare(column, "<=", value)
    }

    fn like(self, column: &str, pattern: &Scalar) -> Self {
        self.compare(column, "LIKE", &wildcards(pattern))
    }

    fn ilike(self, column: &str, pattern: &Scalar) -> Self {
        self.compare(column, "ILIKE", &wildcards(pattern))
    }

    fn is(self, column: &str, value: &Scalar) -> Self {
        let tail = match value {
            Scalar::Null => "IS NULL".to_string(),
            Scalar::Bool(true) => "IS TRUE".to_string(),
            Scalar::Bool(false) => "IS FALSE".to_string(),
            other => format!("IS {}", quote_literal(other)),
        };
        self.push(column, tail)
    }

    fn in_list(self, column: &str, values: &[Scalar]) -> Self {
        if values.is_empty() {
            // An empty set matches nothing.
            return self.push(column, "IS NULL AND false".to_string());
        }
        let items: Vec<String> = values.iter().map(quote_literal).collect();
        let tail = format!("IN ({})", items.join(", "));
        self.push(column, tail)
    }

    fn order(mut self, column: &str, ascending: bool) -> Self {
        let dir = if ascending { "ASC" } else { "DESC" };
        self.order.push(format!("{} {}", quote_ident(column), dir));
        self
    }

    fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    fn range(mut self, from: u64, to: u64) -> Self {
        self.offset = Some(from);
        self.limit = Some(to.saturating_sub(from).saturating_add(1));
        self
    }
}

/// PostgREST accepts `*` as a LIKE wildcard; map it to `%`.
fn wildcards(pattern: &Scalar) -> Scalar {
    match pattern {
        Scalar::Text(s) => Scalar::Text(s.replace('*', "%")),
        other => other.clone(),
    }
}

fn payload_keys(payload: &Value) -> Vec<String> {
    payload
        .as_object()
        .map(|obj| obj.keys().map(|k| quote_ident(k)).collect())
        .unwrap_or_default()
}

fn select_list(columns: &str) -> String {
    let cols: Vec<String> = columns
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(|c| if c == "*" { "*".to_string() } else { quote_ident(c) })
        .collect();
    if cols.is_empty() {
        "*".to_string()
    } else {
        cols.join(", ")
    }
}

/// Quote an identifier, doubling embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a scalar as an untyped literal. `NULL` stays bare.
pub fn quote_literal(value: &Scalar) -> String {
    match value {
        Scalar::Null => "NULL".to_string(),
        other => format!("'{}'", other.to_string().replace('\'', "''")),
    }
}
