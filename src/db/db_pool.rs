use duckdb::Connection;
use r2d2::ManageConnection;
use std::sync::Mutex;
use tracing::debug;

/// Hands out connections that all share one DuckDB database instance.
///
/// Every pooled connection is a `try_clone` of a root connection, so an
/// in-memory database is visible to the whole pool instead of each
/// connection getting its own empty one.
pub struct DuckDBConnectionManager {
    connection_string: String,
    root: Mutex<Connection>,
}

impl DuckDBConnectionManager {
    pub fn new(connection_string: String) -> Result<Self, duckdb::Error> {
        let root = if connection_string == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(&connection_string)?
        };

        Ok(Self {
            connection_string,
            root: Mutex::new(root),
        })
    }
}

impl ManageConnection for DuckDBConnectionManager {
    type Connection = Connection;
    type Error = duckdb::Error;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let root = self
            .root
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        debug!("Opening pooled connection to {}", self.connection_string);
        root.try_clone()
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.execute_batch("SELECT 1")
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}
