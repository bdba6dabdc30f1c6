//! REST client for the relational store.
//!
//! The store speaks a PostgREST-style protocol: one resource per table,
//! equality filters in the query string, JSON rows in and out. Everything
//! the services need is equality-filter CRUD plus `single()`, so that is
//! all the trait exposes.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::warn;

use super::error::{TableStoreError, TableStoreResult};

const MAX_REQUEST_ATTEMPTS: u32 = 3;
const RETRY_BASE: Duration = Duration::from_secs(1);
const RETRY_CAP: Duration = Duration::from_secs(10);

/// Row-level CRUD over named tables with equality filters.
///
/// Implemented by [`RestTableClient`] and, under the `mock` feature, by
/// [`super::MockTableStore`].
pub trait TableStore: Send + Sync {
    /// Returns all rows matching every `(column, value)` filter.
    fn select(
        &self,
        table: &str,
        filters: &[(&str, &str)],
    ) -> impl std::future::Future<Output = TableStoreResult<Vec<Value>>> + Send;

    /// Returns the first matching row, if any.
    fn select_one(
        &self,
        table: &str,
        filters: &[(&str, &str)],
    ) -> impl std::future::Future<Output = TableStoreResult<Option<Value>>> + Send;

    /// Inserts one row.
    fn insert(
        &self,
        table: &str,
        row: Value,
    ) -> impl std::future::Future<Output = TableStoreResult<()>> + Send;

    /// Applies `patch` to all matching rows, returning how many changed.
    fn update(
        &self,
        table: &str,
        filters: &[(&str, &str)],
        patch: Value,
    ) -> impl std::future::Future<Output = TableStoreResult<u64>> + Send;

    /// Deletes all matching rows.
    fn delete(
        &self,
        table: &str,
        filters: &[(&str, &str)],
    ) -> impl std::future::Future<Output = TableStoreResult<()>> + Send;
}

#[derive(Clone)]
/// PostgREST-style [`TableStore`] over HTTP.
pub struct RestTableClient {
    http: reqwest::Client,
    base_url: String,
}

impl std::fmt::Debug for RestTableClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestTableClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl RestTableClient {
    /// Creates a client for `base_url`, authenticating with the anon key
    /// or, when present, the service key.
    pub fn new(
        base_url: &str,
        anon_key: &str,
        service_key: Option<&str>,
    ) -> TableStoreResult<Self> {
        let key = service_key.unwrap_or(anon_key);

        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(anon_key).map_err(|e| TableStoreError::Network {
                message: format!("invalid api key header: {e}"),
            })?,
        );
        headers.insert(
            reqwest::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {key}")).map_err(|e| {
                TableStoreError::Network {
                    message: format!("invalid authorization header: {e}"),
                }
            })?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| TableStoreError::Network {
                message: e.to_string(),
            })?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn table_url(&self, table: &str, filters: &[(&str, &str)]) -> String {
        let mut url = format!("{}/rest/v1/{table}", self.base_url);
        let mut sep = '?';
        for (column, value) in filters {
            url.push(sep);
            url.push_str(&format!("{column}=eq.{value}"));
            sep = '&';
        }
        url
    }

    async fn request(
        &self,
        method: Method,
        table: &str,
        url: &str,
        body: Option<&Value>,
        prefer: Option<&str>,
    ) -> TableStoreResult<Value> {
        let attempts = AtomicU32::new(0);
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(RETRY_BASE)
            .with_max_interval(RETRY_CAP)
            .with_max_elapsed_time(None)
            .build();

        backoff::future::retry(policy, || {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
            let method = method.clone();
            async move {
                match self.try_request(method, table, url, body, prefer).await {
                    Ok(value) => Ok(value),
                    Err(e) if !is_retryable(&e) || attempt >= MAX_REQUEST_ATTEMPTS => {
                        Err(backoff::Error::permanent(e))
                    }
                    Err(e) => {
                        warn!(table, attempt, error = %e, "relational request failed, retrying");
                        Err(backoff::Error::transient(e))
                    }
                }
            }
        })
        .await
    }

    async fn try_request(
        &self,
        method: Method,
        table: &str,
        url: &str,
        body: Option<&Value>,
        prefer: Option<&str>,
    ) -> TableStoreResult<Value> {
        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        if let Some(prefer) = prefer {
            request = request.header("Prefer", prefer);
        }

        let response = request.send().await.map_err(|e| TableStoreError::Network {
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TableStoreError::Http {
                table: table.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        let text = response.text().await.map_err(|e| TableStoreError::Network {
            message: e.to_string(),
        })?;
        if text.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

fn is_retryable(error: &TableStoreError) -> bool {
    match error {
        TableStoreError::Network { .. } => true,
        TableStoreError::Http { status, .. } => *status >= 500,
        _ => false,
    }
}

impl TableStore for RestTableClient {
    async fn select(&self, table: &str, filters: &[(&str, &str)]) -> TableStoreResult<Vec<Value>> {
        let url = self.table_url(table, filters);
        let body = self.request(Method::GET, table, &url, None, None).await?;
        match body {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            other => Ok(vec![other]),
        }
    }

    async fn select_one(
        &self,
        table: &str,
        filters: &[(&str, &str)],
    ) -> TableStoreResult<Option<Value>> {
        let mut url = self.table_url(table, filters);
        url.push_str(if url.contains('?') { "&" } else { "?" });
        url.push_str("limit=1");
        let body = self.request(Method::GET, table, &url, None, None).await?;
        match body {
            Value::Array(rows) => Ok(rows.into_iter().next()),
            Value::Null => Ok(None),
            other => Ok(Some(other)),
        }
    }

    async fn insert(&self, table: &str, row: Value) -> TableStoreResult<()> {
        let url = self.table_url(table, &[]);
        self.request(Method::POST, table, &url, Some(&row), Some("return=minimal"))
            .await?;
        Ok(())
    }

    async fn update(
        &self,
        table: &str,
        filters: &[(&str, &str)],
        patch: Value,
    ) -> TableStoreResult<u64> {
        let url = self.table_url(table, filters);
        let body = self
            .request(
                Method::PATCH,
                table,
                &url,
                Some(&patch),
                Some("return=representation"),
            )
            .await?;
        match body {
            Value::Array(rows) => Ok(rows.len() as u64),
            Value::Null => Ok(0),
            _ => Ok(1),
        }
    }

    async fn delete(&self, table: &str, filters: &[(&str, &str)]) -> TableStoreResult<()> {
        let url = self.table_url(table, filters);
        self.request(Method::DELETE, table, &url, None, Some("return=minimal"))
            .await?;
        Ok(())
    }
}
