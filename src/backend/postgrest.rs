//! PostgREST adapter.
//!
//! Renders handles into the PostgREST query grammar (`column=op.value`,
//! `order=`, `limit=`, `offset=`) and sends them with reqwest.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Method;
use reqwest::header::CONTENT_RANGE;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::ast::Scalar;
use crate::backend::{Backend, ExecuteQuery, RawResponse, split_qualified};
use crate::builder::FilterableQuery;
use crate::config::ClientConfig;
use crate::error::{ErrorKind, QueryError, RowlensError, RowlensResult};

const PREFER_COUNT_EXACT: &str = "count=exact";
const PREFER_RETURN_REPRESENTATION: &str = "return=representation";

struct ClientInner {
    http: reqwest::Client,
    rest_url: String,
    api_key: String,
    access_token: RwLock<Option<String>>,
}

/// HTTP client for a PostgREST endpoint.
#[derive(Clone)]
pub struct PostgrestClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for PostgrestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgrestClient")
            .field("rest_url", &self.inner.rest_url)
            .finish_non_exhaustive()
    }
}

impl PostgrestClient {
    /// Build a client from configuration.
    ///
    /// Fails with [`RowlensError::Config`] when the URL or API key is missing
    /// or the URL is not http(s).
    pub fn new(config: &ClientConfig) -> RowlensResult<Self> {
        let url = config
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(missing_credentials)?;
        let api_key = config
            .anon_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(missing_credentials)?;

        let parsed = Url::parse(url)
            .map_err(|e| RowlensError::Config(format!("invalid backend URL '{}': {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(RowlensError::Config(format!(
                "backend URL must be http or https, got '{}'",
                parsed.scheme()
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let rest_url = format!(
            "{}{}",
            parsed.as_str().trim_end_matches('/'),
            config.rest_path.trim_end_matches('/')
        );
        info!(%rest_url, "created PostgREST client");

        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                rest_url,
                api_key: api_key.to_string(),
                access_token: RwLock::new(config.access_token.clone()),
            }),
        })
    }

    pub fn rest_url(&self) -> &str {
        &self.inner.rest_url
    }

    /// Use a user session token as the bearer instead of the anon key.
    pub fn set_access_token(&self, token: Option<String>) {
        *self.inner.access_token.write() = token;
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.access_token.read().clone()
    }

    fn query(&self, method: Method, table: &str) -> PostgrestQuery {
        let (schema, name) = split_qualified(table);
        PostgrestQuery {
            client: Arc::clone(&self.inner),
            method,
            table: name.to_string(),
            schema: schema.map(str::to_string),
            params: Vec::new(),
            prefer: Vec::new(),
            body: None,
        }
    }
}

fn missing_credentials() -> RowlensError {
    RowlensError::Config(
        "Missing backend credentials. Provide ROWLENS_URL and ROWLENS_ANON_KEY.".to_string(),
    )
}

impl Backend for PostgrestClient {
    type Query = PostgrestQuery;

    fn select(&self, table: &str, columns: &str, exact_count: bool) -> PostgrestQuery {
        let mut query = self.query(Method::GET, table);
        query.set_param("select", strip_whitespace(columns));
        if exact_count {
            query.prefer.push(PREFER_COUNT_EXACT);
        }
        query
    }

    fn insert(&self, table: &str, payload: Value) -> PostgrestQuery {
        self.query(Method::POST, table).returning(payload)
    }

    fn update(&self, table: &str, payload: Value) -> PostgrestQuery {
        self.query(Method::PATCH, table).returning(payload)
    }

    fn delete(&self, table: &str) -> PostgrestQuery {
        let mut query = self.query(Method::DELETE, table);
        query.set_param("select", "*".to_string());
        query.prefer.push(PREFER_RETURN_REPRESENTATION);
        query
    }
}

/// A not-yet-sent PostgREST request.
#[derive(Clone)]
pub struct PostgrestQuery {
    client: Arc<ClientInner>,
    method: Method,
    table: String,
    schema: Option<String>,
    params: Vec<(String, String)>,
    prefer: Vec<&'static str>,
    body: Option<Value>,
}

impl std::fmt::Debug for PostgrestQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgrestQuery")
            .field("method", &self.method)
            .field("table", &self.table)
            .field("schema", &self.schema)
            .field("params", &self.params)
            .field("prefer", &self.prefer)
            .finish()
    }
}

impl PostgrestQuery {
    fn returning(mut self, payload: Value) -> Self {
        self.set_param("select", "*".to_string());
        self.prefer.push(PREFER_RETURN_REPRESENTATION);
        self.body = Some(payload);
        self
    }

    fn set_param(&mut self, key: &str, value: String) {
        match self.params.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.params.push((key.to_string(), value)),
        }
    }

    fn filter(mut self, column: &str, op: &str, value: String) -> Self {
        self.params.push((column.to_string(), format!("{}.{}", op, value)));
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Query parameters in the order they will be sent.
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// The `Prefer` header value, if any.
    pub fn prefer(&self) -> Option<String> {
        (!self.prefer.is_empty()).then(|| self.prefer.join(","))
    }

    /// The full request URL.
    pub fn to_url(&self) -> Result<Url, url::ParseError> {
        let endpoint = format!("{}/{}", self.client.rest_url, self.table);
        if self.params.is_empty() {
            Url::parse(&endpoint)
        } else {
            Url::parse_with_params(&endpoint, &self.params)
        }
    }

    fn profile_header(&self) -> &'static str {
        if self.method == Method::GET || self.method == Method::HEAD {
            "Accept-Profile"
        } else {
            "Content-Profile"
        }
    }
}

impl FilterableQuery for PostgrestQuery {
    fn eq(self, column: &str, value: &Scalar) -> Self {
        self.filter(column, "eq", encode_scalar(value))
    }

    fn neq(self, column: &str, value: &Scalar) -> Self {
        self.filter(column, "neq", encode_scalar(value))
    }

    fn gt(self, column: &str, value: &Scalar) -> Self {
        self.filter(column, "gt", encode_scalar(value))
    }

    fn gte(self, column: &str, value: &Scalar) -> Self {
        self.filter(column, "gte", encode_scalar(value))
    }

    fn lt(self, column: &str, value: &Scalar) -> Self {
        self.filter(column, "lt", encode_scalar(value))
    }

    fn lte(self, column: &str, value: &Scalar) -> Self {
        self.filter(column, "lte", encode_scalar(value))
    }

    fn like(self, column: &str, pattern: &Scalar) -> Self {
        self.filter(column, "like", encode_scalar(pattern))
    }

    fn ilike(self, column: &str, pattern: &Scalar) -> Self {
        self.filter(column, "ilike", encode_scalar(pattern))
    }

    fn is(self, column: &str, value: &Scalar) -> Self {
        self.filter(column, "is", encode_scalar(value))
    }

    fn in_list(self, column: &str, values: &[Scalar]) -> Self {
        self.filter(column, "in", encode_list(values))
    }

    fn order(mut self, column: &str, ascending: bool) -> Self {
        let term = format!("{}.{}", column, if ascending { "asc" } else { "desc" });
        match self.params.iter_mut().find(|(k, _)| k == "order") {
            Some(slot) => {
                slot.1.push(',');
                slot.1.push_str(&term);
            }
            None => self.params.push(("order".to_string(), term)),
        }
        self
    }

    fn limit(mut self, n: u64) -> Self {
        self.set_param("limit", n.to_string());
        self
    }

    fn range(mut self, from: u64, to: u64) -> Self {
        self.set_param("offset", from.to_string());
        self.set_param("limit", to.saturating_sub(from).saturating_add(1).to_string());
        self
    }
}

#[async_trait]
impl ExecuteQuery for PostgrestQuery {
    async fn execute(self) -> RawResponse {
        let url = match self.to_url() {
            Ok(url) => url,
            Err(e) => {
                return RawResponse::failed(QueryError::transport(format!(
                    "invalid request URL: {}",
                    e
                )));
            }
        };
        debug!(method = %self.method, %url, "sending PostgREST request");

        let bearer = self
            .client
            .access_token
            .read()
            .clone()
            .unwrap_or_else(|| self.client.api_key.clone());

        let mut request = self
            .client
            .http
            .request(self.method.clone(), url)
            .header("apikey", &self.client.api_key)
            .bearer_auth(bearer);
        if let Some(schema) = &self.schema {
            request = request.header(self.profile_header(), schema);
        }
        if let Some(prefer) = self.prefer() {
            request = request.header("Prefer", prefer);
        }
        if let Some(body) = &self.body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return RawResponse::failed(QueryError::transport(e.to_string())),
        };

        let status = response.status();
        let count = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range);
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return RawResponse::failed(QueryError::transport(e.to_string())),
        };

        if !status.is_success() {
            debug!(status = status.as_u16(), "PostgREST request failed");
            return RawResponse::failed(parse_error_body(status, &body));
        }

        if body.trim().is_empty() {
            return RawResponse::rows(Value::Array(Vec::new()), count);
        }
        match serde_json::from_str::<Value>(&body) {
            Ok(data) => RawResponse::rows(data, count),
            Err(e) => RawResponse::failed(QueryError::decode(format!(
                "invalid JSON in response: {}",
                e
            ))),
        }
    }
}

/// Render a scalar as a PostgREST operand.
pub fn encode_scalar(value: &Scalar) -> String {
    value.to_string()
}

/// Render a list as `(a,b,"c,d")`, quoting items that contain reserved
/// characters.
pub fn encode_list(values: &[Scalar]) -> String {
    let items: Vec<String> = values
        .iter()
        .map(|v| match v {
            Scalar::Text(s) if needs_quoting(s) => {
                format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
            }
            other => other.to_string(),
        })
        .collect();
    format!("({})", items.join(","))
}

fn needs_quoting(s: &str) -> bool {
    s.is_empty()
        || s.trim() != s
        || s.chars().any(|c| matches!(c, ',' | '(' | ')' | '"' | '\\' | '.' | ':'))
}

/// Strip whitespace outside double quotes from a select list.
fn strip_whitespace(columns: &str) -> String {
    let mut quoted = false;
    columns
        .chars()
        .filter(|c| {
            if *c == '"' {
                quoted = !quoted;
            }
            quoted || !c.is_whitespace()
        })
        .collect()
}

/// Total from a `Content-Range` header (`0-24/3573`, `*/0`). `None` when the
/// total is `*`.
pub fn parse_content_range(header: &str) -> Option<u64> {
    header.rsplit_once('/').and_then(|(_, total)| total.parse().ok())
}

fn parse_error_body(status: reqwest::StatusCode, body: &str) -> QueryError {
    match serde_json::from_str::<QueryError>(body) {
        Ok(mut err) => {
            err.kind = ErrorKind::Backend;
            if err.code.is_none() {
                err.code = Some(status.as_u16().to_string());
            }
            err
        }
        Err(_) => {
            let message = if body.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            } else {
                body.trim().to_string()
            };
            QueryError::backend(status.as_u16().to_string(), message)
        }
    }
}
