//! Typed row queries against `/rest/v1`.
//!
//! A [`Table<Row>`] fixes the row type once; `select`, `update` and `insert`
//! return a [`Query<Vec<Row>>`] so the element type flows to the caller
//! without annotations. Filters use the PostgREST operator syntax
//! (`col=eq.v`, `col=ilike.%v%`, `order=col.desc`).

use std::fmt::Display;
use std::marker::PhantomData;

use cosdesk_core::{AppError, AppResult};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{transport_error, ApiClient};

/// `{data, error}` outcome of a query. Exactly one side is set.
#[derive(Debug)]
pub struct QueryResult<R> {
    pub data: Option<R>,
    pub error: Option<AppError>,
}

impl<R> QueryResult<R> {
    pub fn ok(data: R) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: AppError) -> Self {
        Self {
            data: None,
            error: Some(error),
        }
    }

    pub fn into_result(self) -> AppResult<R> {
        match (self.data, self.error) {
            (_, Some(error)) => Err(error),
            (Some(data), None) => Ok(data),
            (None, None) => Err(AppError::Internal(
                "query returned neither data nor error".to_string(),
            )),
        }
    }
}

/// Error body returned by the row API
#[derive(Debug, Default, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    hint: Option<String>,
}

/// A table handle with a fixed row type.
pub struct Table<Row> {
    client: ApiClient,
    name: String,
    _row: PhantomData<fn() -> Row>,
}

impl<Row> Table<Row> {
    pub(crate) fn new(client: ApiClient, name: &str) -> Self {
        Self {
            client,
            name: name.to_string(),
            _row: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn select(&self, columns: &str) -> Query<Vec<Row>> {
        Query::new(self.client.clone(), Method::GET, &self.name)
            .param("select", columns.to_string())
    }

    /// Update matching rows and return them.
    pub fn update<B: Serialize>(&self, patch: &B) -> AppResult<Query<Vec<Row>>> {
        let body = serde_json::to_value(patch)?;
        Ok(Query::new(self.client.clone(), Method::PATCH, &self.name).with_body(body))
    }

    /// Insert rows and return them as stored.
    pub fn insert<B: Serialize>(&self, rows: &[B]) -> AppResult<Query<Vec<Row>>> {
        let body = serde_json::to_value(rows)?;
        Ok(Query::new(self.client.clone(), Method::POST, &self.name).with_body(body))
    }
}

/// A pending request whose result deserializes into `R`.
pub struct Query<R> {
    client: ApiClient,
    method: Method,
    table: String,
    params: Vec<(String, String)>,
    body: Option<serde_json::Value>,
    signal: Option<CancellationToken>,
    _out: PhantomData<fn() -> R>,
}

impl<R> Query<R> {
    fn new(client: ApiClient, method: Method, table: &str) -> Self {
        Self {
            client,
            method,
            table: table.to_string(),
            params: Vec::new(),
            body: None,
            signal: None,
            _out: PhantomData,
        }
    }

    fn param(mut self, key: &str, value: String) -> Self {
        self.params.push((key.to_string(), value));
        self
    }

    fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn eq(self, column: &str, value: impl Display) -> Self {
        self.param(column, format!("eq.{}", value))
    }

    /// Case-insensitive match; the caller supplies the wildcards (`%v%`).
    pub fn ilike(self, column: &str, pattern: &str) -> Self {
        self.param(column, format!("ilike.{}", pattern))
    }

    pub fn gte(self, column: &str, value: impl Display) -> Self {
        self.param(column, format!("gte.{}", value))
    }

    pub fn lte(self, column: &str, value: impl Display) -> Self {
        self.param(column, format!("lte.{}", value))
    }

    pub fn order(self, column: &str, ascending: bool) -> Self {
        let direction = if ascending { "asc" } else { "desc" };
        self.param("order", format!("{}.{}", column, direction))
    }

    pub fn limit(self, count: usize) -> Self {
        self.param("limit", count.to_string())
    }

    /// Abandon the request when `token` fires.
    pub fn abort_signal(mut self, token: CancellationToken) -> Self {
        self.signal = Some(token);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }
}

impl<R: DeserializeOwned> Query<R> {
    /// Run the query. Never panics and never returns both data and error.
    pub async fn execute(self) -> QueryResult<R> {
        let signal = self.signal.clone();
        match signal {
            Some(token) if token.is_cancelled() => QueryResult::err(AppError::Cancelled),
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        tracing::debug!(table = %self.table, "Query cancelled");
                        QueryResult::err(AppError::Cancelled)
                    }
                    result = self.send() => result,
                }
            }
            None => self.send().await,
        }
    }

    async fn send(&self) -> QueryResult<R> {
        let url = self.client.build_url(&format!("/rest/v1/{}", self.table));
        let mut request = self
            .client
            .apply_auth(self.client.http().request(self.method.clone(), &url))
            .query(&self.params);

        if let Some(body) = &self.body {
            request = request
                .header("Prefer", "return=representation")
                .json(body);
        }

        let start = std::time::Instant::now();
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return QueryResult::err(transport_error(e)),
        };

        let status = response.status();
        tracing::debug!(
            method = %self.method,
            table = %self.table,
            status = status.as_u16(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Query completed"
        );

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return QueryResult::err(backend_error(status, &text));
        }

        match response.json::<R>().await {
            Ok(data) => QueryResult::ok(data),
            Err(e) => QueryResult::err(AppError::Internal(format!(
                "Failed to parse response as JSON: {}",
                e
            ))),
        }
    }
}

fn backend_error(status: StatusCode, body: &str) -> AppError {
    let parsed: PostgrestError = serde_json::from_str(body).unwrap_or_default();
    let message = parsed.message.unwrap_or_else(|| {
        if body.is_empty() {
            format!("request failed with status {}", status)
        } else {
            body.to_string()
        }
    });
    AppError::Backend {
        status: status.as_u16(),
        code: parsed.code,
        message,
        details: parsed.details,
        hint: parsed.hint,
    }
}
