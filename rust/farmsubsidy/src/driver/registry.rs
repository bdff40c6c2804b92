use super::{clickhouse::ClickHouseClient, duckdb::open_duckdb, AccessMode};
use crate::{dialect::Dialect, error::Result};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub dialect: Dialect,
    pub target: String,
    pub mode: AccessMode,
}

/// A live backend connection, cheap to clone.
#[derive(Clone)]
pub enum Connection {
    DuckDb(Arc<Mutex<::duckdb::Connection>>),
    ClickHouse(ClickHouseClient),
}

impl Connection {
    fn open(key: &ConnectionKey) -> Result<Self> {
        match key.dialect {
            Dialect::DuckDb => Ok(Connection::DuckDb(open_duckdb(&key.target, key.mode)?)),
            Dialect::ClickHouse => Ok(Connection::ClickHouse(ClickHouseClient::new(
                &key.target,
                key.mode,
            )?)),
        }
    }

    #[cfg(test)]
    pub(crate) fn same_as(&self, other: &Connection) -> bool {
        match (self, other) {
            (Connection::DuckDb(a), Connection::DuckDb(b)) => Arc::ptr_eq(a, b),
            (Connection::ClickHouse(a), Connection::ClickHouse(b)) => a.endpoint() == b.endpoint(),
            _ => false,
        }
    }
}

#[derive(Default)]
struct Slots {
    arena: Vec<Connection>,
    index: HashMap<ConnectionKey, usize>,
}

/// One connection per `(dialect, target, mode)` for the life of the
/// registry. Construction happens under the lock so concurrent first
/// accesses share a single connection.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    slots: Arc<Mutex<Slots>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, key: &ConnectionKey) -> Result<Connection> {
        let mut slots = self.slots.lock();
        if let Some(&slot) = slots.index.get(key) {
            return Ok(slots.arena[slot].clone());
        }

        let connection = Connection::open(key)?;
        info!(dialect = %key.dialect, target = %key.target, mode = %key.mode, "opened connection");
        let slot = slots.arena.len();
        slots.arena.push(connection.clone());
        slots.index.insert(key.clone(), slot);
        Ok(connection)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
