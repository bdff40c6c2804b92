//! Embedded single-node backend.

use super::{AccessMode, Driver, ResultSet};
use crate::{
    dialect::Dialect,
    error::{Result, ServiceError},
    models::Payment,
    schema::COLUMNS,
};
use ::duckdb::{params, types::Value as DuckValue, Config, Connection};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Number, Value};
use std::sync::Arc;

const IN_MEMORY: &str = ":memory:";

/// Opens a database file (or `:memory:`). In-memory databases are always
/// writable.
pub(crate) fn open_duckdb(target: &str, mode: AccessMode) -> Result<Arc<Mutex<Connection>>> {
    let connection = if target == IN_MEMORY {
        Connection::open_in_memory()
    } else {
        let access = match mode {
            AccessMode::ReadOnly => ::duckdb::AccessMode::ReadOnly,
            AccessMode::ReadWrite => ::duckdb::AccessMode::ReadWrite,
        };
        Config::default()
            .access_mode(access)
            .and_then(|config| Connection::open_with_flags(target, config))
    }
    .map_err(|err| ServiceError::Config(format!("failed to open duckdb `{target}`: {err}")))?;

    Ok(Arc::new(Mutex::new(connection)))
}

/// `duckdb::Connection` is not `Sync`, so every call locks it on a blocking
/// thread.
#[derive(Clone)]
pub struct DuckDbDriver {
    conn: Arc<Mutex<Connection>>,
    table: String,
}

impl DuckDbDriver {
    pub fn new(conn: Arc<Mutex<Connection>>, table: &str) -> Self {
        Self {
            conn,
            table: table.to_string(),
        }
    }

    async fn blocking<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> std::result::Result<T, ::duckdb::Error> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            work(&mut *guard)
        })
        .await
        .map_err(|err| ServiceError::Internal(anyhow::anyhow!("duckdb task failed: {err}")))?
        .map_err(ServiceError::backend)
    }
}

#[async_trait]
impl Driver for DuckDbDriver {
    fn dialect(&self) -> Dialect {
        Dialect::DuckDb
    }

    fn table(&self) -> &str {
        &self.table
    }

    async fn execute(&self, sql: &str) -> Result<ResultSet> {
        let sql = sql.to_string();
        self.blocking(move |conn| read_rows(conn, &sql)).await
    }

    async fn execute_statement(&self, sql: &str) -> Result<()> {
        let sql = sql.to_string();
        self.blocking(move |conn| conn.execute_batch(&sql)).await
    }

    async fn insert(&self, payments: &[Payment]) -> Result<u64> {
        let payments = payments.to_vec();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            COLUMNS.join(", "),
            vec!["?"; COLUMNS.len()].join(", ")
        );
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let mut inserted = 0u64;
            {
                let mut stmt = tx.prepare(&sql)?;
                for p in &payments {
                    inserted += stmt.execute(params![
                        p.pk,
                        p.country,
                        p.year.to_string(),
                        p.recipient_id,
                        p.recipient_name,
                        p.recipient_fingerprint,
                        p.recipient_address,
                        p.recipient_country,
                        p.recipient_url,
                        p.scheme_id,
                        p.scheme,
                        p.scheme_code,
                        p.scheme_description,
                        p.amount,
                        p.currency,
                        p.amount_original,
                        p.currency_original,
                    ])? as u64;
                }
            }
            tx.commit()?;
            Ok(inserted)
        })
        .await
    }
}

fn read_rows(conn: &Connection, sql: &str) -> std::result::Result<ResultSet, ::duckdb::Error> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;

    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::new();
        for index in 0.. {
            match row.get::<_, DuckValue>(index) {
                Ok(value) => values.push(to_json(value)),
                Err(::duckdb::Error::InvalidColumnIndex(_)) => break,
                Err(err) => return Err(err),
            }
        }
        result.push(values);
    }

    // Rows borrows the statement; names are readable once it is dropped.
    drop(rows);
    let columns = stmt.column_names();

    Ok(ResultSet::new(columns, result))
}

fn to_json(value: DuckValue) -> Value {
    match value {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(value) => Value::Bool(value),
        DuckValue::TinyInt(value) => Value::Number(Number::from(value)),
        DuckValue::SmallInt(value) => Value::Number(Number::from(value)),
        DuckValue::Int(value) => Value::Number(Number::from(value)),
        DuckValue::BigInt(value) => Value::Number(Number::from(value)),
        DuckValue::HugeInt(value) => i64::try_from(value)
            .map(|value| Value::Number(Number::from(value)))
            .unwrap_or_else(|_| Value::String(value.to_string())),
        DuckValue::UTinyInt(value) => Value::Number(Number::from(value)),
        DuckValue::USmallInt(value) => Value::Number(Number::from(value)),
        DuckValue::UInt(value) => Value::Number(Number::from(value)),
        DuckValue::UBigInt(value) => Value::Number(Number::from(value)),
        DuckValue::Float(value) => number_from_f64(value as f64),
        DuckValue::Double(value) => number_from_f64(value),
        DuckValue::Decimal(value) => value
            .to_string()
            .parse::<f64>()
            .map(number_from_f64)
            .unwrap_or_else(|_| Value::String(value.to_string())),
        DuckValue::Text(value) => Value::String(value),
        DuckValue::Enum(value) => Value::String(value),
        DuckValue::List(values) => Value::Array(values.into_iter().map(to_json).collect()),
        other => Value::String(format!("{other:?}")),
    }
}

fn number_from_f64(value: f64) -> Value {
    Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{connect, ConnectionRegistry, DriverDescriptor};
    use serde_json::json;

    fn payment(pk: &str, country: &str, year: i32, recipient: &str, amount: f64) -> Payment {
        Payment {
            pk: pk.to_string(),
            country: country.to_string(),
            year,
            recipient_id: recipient.to_string(),
            recipient_name: Some(format!("Farm {recipient}")),
            recipient_fingerprint: Some(format!("farm {recipient}")),
            recipient_address: None,
            recipient_country: country.to_string(),
            recipient_url: None,
            scheme_id: None,
            scheme: Some("Direct aids".into()),
            scheme_code: None,
            scheme_description: None,
            amount: Some(amount),
            currency: Some("EUR".into()),
            amount_original: None,
            currency_original: None,
        }
    }

    fn driver() -> Arc<dyn Driver> {
        let descriptor = DriverDescriptor {
            dialect: Dialect::DuckDb,
            target: IN_MEMORY.into(),
            table: "payments".into(),
            mode: AccessMode::ReadWrite,
        };
        connect(&ConnectionRegistry::new(), &descriptor).unwrap()
    }

    #[tokio::test]
    async fn init_insert_and_query() {
        let driver = driver();
        driver.init(false).await.unwrap();
        let inserted = driver
            .insert(&[
                payment("p1", "LU", 2019, "r1", 10.25),
                payment("p2", "LU", 2019, "r1", 5.0),
                payment("p3", "LU", 2019, "r2", 1.5),
            ])
            .await
            .unwrap();
        assert_eq!(inserted, 3);

        let query = driver
            .query_template()
            .select([
                "recipient_id",
                "count(*) as total_payments",
                "sum(amount) as amount_sum",
                "list(DISTINCT year) as years",
            ])
            .group_by(["recipient_id"])
            .order_by(["recipient_id"], crate::query::OrderDirection::Asc);
        let result = driver.query(&query).await.unwrap();

        assert_eq!(
            result.columns,
            vec!["recipient_id", "total_payments", "amount_sum", "years"]
        );
        assert_eq!(
            result.rows[0],
            vec![json!("r1"), json!(2), json!(15.25), json!(["2019"])]
        );
        assert_eq!(driver.count(&query).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn init_twice_requires_recreate() {
        let driver = driver();
        driver.init(false).await.unwrap();
        let err = driver.init(false).await.unwrap_err();
        assert!(err.to_string().contains("already exists"), "got: {err}");
        driver.init(true).await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_keys_surface_backend_errors() {
        let driver = driver();
        driver.init(false).await.unwrap();
        let err = driver
            .insert(&[
                payment("p1", "LU", 2019, "r1", 1.0),
                payment("p1", "LU", 2019, "r1", 1.0),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Backend(_)), "got: {err:?}");

        let count = driver.count(&driver.query_template()).await.unwrap();
        assert_eq!(count, 0, "a failed insert must not leave partial rows");
    }

    #[tokio::test]
    async fn empty_results_keep_their_columns() {
        let driver = driver();
        driver.init(false).await.unwrap();
        let query = driver
            .query_template()
            .select(["pk", "amount"])
            .filter([("country", "CZ")])
            .unwrap();
        let result = driver.query(&query).await.unwrap();
        assert!(result.is_empty());
        assert_eq!(result.columns, vec!["pk", "amount"]);
    }
}
