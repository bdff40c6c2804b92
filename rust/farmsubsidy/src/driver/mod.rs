//! Backend executors and the per-process connection registry.

mod clickhouse;
mod duckdb;
mod registry;

pub use self::clickhouse::ClickHouseDriver;
pub use self::duckdb::DuckDbDriver;
pub use registry::{Connection, ConnectionKey, ConnectionRegistry};

use crate::{
    dialect::Dialect,
    error::{Result, ServiceError},
    models::Payment,
    query::{OrderDirection, Query},
    schema,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{borrow::Cow, cmp::Ordering, fmt, sync::Arc};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::ReadOnly => f.write_str("read-only"),
            AccessMode::ReadWrite => f.write_str("read-write"),
        }
    }
}

/// Everything needed to acquire a driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverDescriptor {
    pub dialect: Dialect,
    pub target: String,
    pub table: String,
    pub mode: AccessMode,
}

impl DriverDescriptor {
    pub fn connection_key(&self) -> ConnectionKey {
        ConnectionKey {
            dialect: self.dialect,
            target: self.target.clone(),
            mode: self.mode,
        }
    }
}

/// Column names plus rows of JSON values, as returned by a backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Values of one column, in row order.
    pub fn column(&self, name: &str) -> Vec<Value> {
        match self.column_index(name) {
            Some(index) => self
                .rows
                .iter()
                .map(|row| row.get(index).cloned().unwrap_or(Value::Null))
                .collect(),
            None => Vec::new(),
        }
    }

    /// First cell of the first row as an unsigned count.
    pub fn scalar_u64(&self) -> Result<u64> {
        let cell = self
            .rows
            .first()
            .and_then(|row| row.first())
            .ok_or_else(|| ServiceError::backend(anyhow::anyhow!("count returned no rows")))?;
        match cell {
            Value::Number(number) => number
                .as_u64()
                .or_else(|| number.as_f64().map(|value| value as u64)),
            Value::String(text) => text.parse().ok(),
            _ => None,
        }
        .ok_or_else(|| {
            ServiceError::backend(anyhow::anyhow!("count returned a non-numeric value: {cell}"))
        })
    }

    pub fn records(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect::<Map<String, Value>>()
            })
            .collect()
    }

    /// Rows `[start, end)` of the result after a stable sort on one column,
    /// nulls first. Only the rows of the page are copied. The range is
    /// clamped to the available rows.
    pub fn page(
        &self,
        order: Option<(&str, OrderDirection)>,
        range: Option<(usize, usize)>,
    ) -> ResultSet {
        let mut indices: Vec<usize> = (0..self.rows.len()).collect();
        if let Some((column, direction)) = order {
            self.sort_indices(&mut indices, column, direction);
        }
        let (start, end) = range.unwrap_or((0, indices.len()));
        let end = end.min(indices.len());
        let start = start.min(end);
        ResultSet {
            columns: self.columns.clone(),
            rows: indices[start..end]
                .iter()
                .map(|&index| self.rows[index].clone())
                .collect(),
        }
    }

    /// A column sorts numerically only when every non-null value is a JSON
    /// number, otherwise by text like the backends sort string columns.
    fn sort_indices(&self, indices: &mut [usize], column: &str, direction: OrderDirection) {
        let Some(index) = self.column_index(column) else {
            warn!(column, "cannot sort by a column missing from the result");
            return;
        };
        let cell = |row: usize| self.rows[row].get(index).unwrap_or(&Value::Null);
        let numeric = self
            .rows
            .iter()
            .all(|row| matches!(row.get(index), None | Some(Value::Null | Value::Number(_))));

        indices.sort_by(|&a, &b| {
            let ordering = compare_cells(cell(a), cell(b), numeric);
            match direction {
                OrderDirection::Asc => ordering,
                OrderDirection::Desc => ordering.reverse(),
            }
        });
    }
}

fn compare_cells(a: &Value, b: &Value, numeric: bool) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (a, b) if numeric => number(a).total_cmp(&number(b)),
        (a, b) => text(a).cmp(&text(b)),
    }
}

fn number(value: &Value) -> f64 {
    value.as_f64().unwrap_or(f64::NAN)
}

fn text(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(text) => Cow::Borrowed(text),
        other => Cow::Owned(other.to_string()),
    }
}

/// Executes SQL text against one backend table.
#[async_trait]
pub trait Driver: Send + Sync {
    fn dialect(&self) -> Dialect;

    fn table(&self) -> &str;

    /// Runs a statement returning rows.
    async fn execute(&self, sql: &str) -> Result<ResultSet>;

    /// Runs a statement without a result set (DDL).
    async fn execute_statement(&self, sql: &str) -> Result<()>;

    /// Inserts payments and returns the number of rows written.
    async fn insert(&self, payments: &[Payment]) -> Result<u64>;

    /// An unfiltered query against this driver's table.
    fn query_template(&self) -> Query {
        Query::new(self.table(), self.dialect())
    }

    async fn query(&self, query: &Query) -> Result<ResultSet> {
        let sql = query.to_sql();
        debug!(dialect = %self.dialect(), %sql, "executing query");
        self.execute(&sql).await
    }

    /// Row count via the count-optimised SQL, never by materialising rows.
    async fn count(&self, query: &Query) -> Result<u64> {
        let sql = query.count_sql();
        debug!(dialect = %self.dialect(), %sql, "counting query");
        self.execute(&sql).await?.scalar_u64()
    }

    /// Creates the schema, dropping it first when `recreate` is set.
    async fn init(&self, recreate: bool) -> Result<()> {
        if recreate {
            for statement in schema::drop_statements(self.dialect(), self.table()) {
                self.execute_statement(&statement).await?;
            }
        }
        for statement in schema::create_statements(self.dialect(), self.table()) {
            self.execute_statement(&statement).await?;
        }
        Ok(())
    }
}

/// Acquires a driver, reusing the registry's connection for its key.
pub fn connect(
    registry: &ConnectionRegistry,
    descriptor: &DriverDescriptor,
) -> Result<Arc<dyn Driver>> {
    let driver: Arc<dyn Driver> = match registry.connect(&descriptor.connection_key())? {
        Connection::DuckDb(conn) => Arc::new(DuckDbDriver::new(conn, &descriptor.table)),
        Connection::ClickHouse(client) => {
            Arc::new(ClickHouseDriver::new(client, &descriptor.table))
        }
    };
    Ok(driver)
}
