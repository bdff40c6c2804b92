//! Distributed columnar backend over the ClickHouse HTTP interface.

use super::{AccessMode, Driver, ResultSet};
use crate::{
    dialect::Dialect,
    error::{Result, ServiceError},
    models::Payment,
};
use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

const DEFAULT_PORT: u16 = 8123;
const READ_FORMAT: &str = "JSONCompactEachRowWithNames";

#[derive(Clone)]
pub struct ClickHouseClient {
    http: Client,
    endpoint: String,
    read_only: bool,
}

impl ClickHouseClient {
    /// Accepts `host`, `host:port` or a full `http(s)://` URL.
    pub fn new(target: &str, mode: AccessMode) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|err| ServiceError::Config(format!("failed to build http client: {err}")))?;

        Ok(Self {
            http,
            endpoint: endpoint(target),
            read_only: mode == AccessMode::ReadOnly,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn settings(&self) -> Vec<(&'static str, &'static str)> {
        // Numbers must arrive as JSON numbers for in-memory sorting.
        let mut settings = vec![
            ("output_format_json_quote_64bit_integers", "0"),
            ("output_format_json_quote_decimals", "0"),
        ];
        if self.read_only {
            // readonly=2 still allows per-query settings.
            settings.push(("readonly", "2"));
        }
        settings
    }

    async fn post(&self, query: Option<&str>, body: String) -> Result<String> {
        let mut request = self.http.post(&self.endpoint).query(&self.settings());
        if let Some(query) = query {
            request = request.query(&[("query", query)]);
        }

        let response = request.body(body).send().await.map_err(ServiceError::backend)?;
        let status = response.status();
        let text = response.text().await.map_err(ServiceError::backend)?;
        if !status.is_success() {
            return Err(ServiceError::Backend(anyhow!(
                "clickhouse returned {status}: {}",
                text.trim()
            )));
        }
        Ok(text)
    }
}

fn endpoint(target: &str) -> String {
    let target = target.trim().trim_end_matches('/');
    if target.starts_with("http://") || target.starts_with("https://") {
        return target.to_string();
    }
    if target.contains(':') {
        format!("http://{target}")
    } else {
        format!("http://{target}:{DEFAULT_PORT}")
    }
}

/// Parses `JSONCompactEachRowWithNames`: a header line of column names
/// followed by one JSON array per row.
fn parse_compact_rows(body: &str) -> Result<ResultSet> {
    let mut lines = body.lines().filter(|line| !line.trim().is_empty());
    let columns: Vec<String> = match lines.next() {
        Some(header) => serde_json::from_str(header).map_err(ServiceError::backend)?,
        None => return Ok(ResultSet::default()),
    };

    let rows = lines
        .map(|line| serde_json::from_str::<Vec<Value>>(line).map_err(ServiceError::backend))
        .collect::<Result<Vec<_>>>()?;

    Ok(ResultSet::new(columns, rows))
}

pub struct ClickHouseDriver {
    client: ClickHouseClient,
    table: String,
}

impl ClickHouseDriver {
    pub fn new(client: ClickHouseClient, table: &str) -> Self {
        Self {
            client,
            table: table.to_string(),
        }
    }
}

#[async_trait]
impl Driver for ClickHouseDriver {
    fn dialect(&self) -> Dialect {
        Dialect::ClickHouse
    }

    fn table(&self) -> &str {
        &self.table
    }

    async fn execute(&self, sql: &str) -> Result<ResultSet> {
        let body = self
            .client
            .post(None, format!("{sql} FORMAT {READ_FORMAT}"))
            .await?;
        parse_compact_rows(&body)
    }

    async fn execute_statement(&self, sql: &str) -> Result<()> {
        self.client.post(None, sql.to_string()).await.map(|_| ())
    }

    async fn insert(&self, payments: &[Payment]) -> Result<u64> {
        if payments.is_empty() {
            return Ok(0);
        }
        let body = payments
            .iter()
            .map(insert_row)
            .collect::<Result<Vec<_>>>()?
            .join("\n");
        let query = format!("INSERT INTO {} FORMAT JSONEachRow", self.table);
        self.client.post(Some(&query), body).await?;
        Ok(payments.len() as u64)
    }
}

// Enum columns take their member name, so the year goes over the wire as text.
fn insert_row(payment: &Payment) -> Result<String> {
    let mut row = serde_json::to_value(payment).map_err(|err| ServiceError::Internal(err.into()))?;
    row["year"] = Value::String(payment.year.to_string());
    Ok(row.to_string())
}
