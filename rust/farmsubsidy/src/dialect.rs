//! SQL dialects supported by the drivers.

use crate::error::ServiceError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    ClickHouse,
    DuckDb,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::ClickHouse => "clickhouse",
            Dialect::DuckDb => "duckdb",
        }
    }

    /// Renders the trailing LIMIT/OFFSET clause, including its leading space.
    pub fn limit_clause(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (Some(limit), offset) => {
                let offset = offset.unwrap_or(0);
                match self {
                    Dialect::ClickHouse => format!(" LIMIT {offset}, {limit}"),
                    Dialect::DuckDb => format!(" LIMIT {limit} OFFSET {offset}"),
                }
            }
            (None, Some(offset)) => format!(" OFFSET {offset}"),
            (None, None) => String::new(),
        }
    }

    /// Quotes a literal. ClickHouse honours backslash escapes inside string
    /// literals, DuckDB only knows doubled quotes.
    pub fn quote(&self, value: &str) -> String {
        let escaped = match self {
            Dialect::ClickHouse => value.replace('\\', "\\\\").replace('\'', "\\'"),
            Dialect::DuckDb => value.replace('\'', "''"),
        };
        format!("'{escaped}'")
    }

    /// Aggregate collecting the distinct values of `expr` into an array.
    pub fn distinct_values(&self, expr: &str) -> String {
        match self {
            Dialect::ClickHouse => format!("groupUniqArray({expr})"),
            Dialect::DuckDb => format!("list(DISTINCT {expr})"),
        }
    }

    /// Aggregate picking an arbitrary value of `expr` within a group.
    pub fn any_value(&self, expr: &str) -> String {
        match self {
            Dialect::ClickHouse => format!("any({expr})"),
            Dialect::DuckDb => format!("any_value({expr})"),
        }
    }

    pub fn count_distinct(&self, fields: &[String]) -> String {
        match (self, fields) {
            (_, [single]) => format!("count(DISTINCT {single})"),
            (Dialect::ClickHouse, fields) => format!("count(DISTINCT {})", fields.join(", ")),
            (Dialect::DuckDb, fields) => format!("count(DISTINCT ({}))", fields.join(", ")),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = ServiceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "clickhouse" => Ok(Dialect::ClickHouse),
            "duckdb" => Ok(Dialect::DuckDb),
            other => Err(ServiceError::Config(format!(
                "not a supported DB driver: `{other}`"
            ))),
        }
    }
}
