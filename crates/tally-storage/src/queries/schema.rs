//! Lazy, idempotent table creation.

use std::sync::atomic::{AtomicBool, Ordering};

use rusqlite::Connection;
use tally_core::errors::StorageError;

use crate::connection::sqe;

/// The two metric tables. Names are load-bearing for existing databases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Gauges,
    Counters,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Gauges => "gauges",
            Self::Counters => "counters",
        }
    }

    fn create_sql(&self) -> &'static str {
        match self {
            Self::Gauges => {
                r#"CREATE TABLE IF NOT EXISTS "gauges" (
                    "Key" TEXT NOT NULL,
                    "Value" DOUBLE PRECISION NOT NULL,
                    PRIMARY KEY ("Key")
                )"#
            }
            Self::Counters => {
                r#"CREATE TABLE IF NOT EXISTS "counters" (
                    "Key" TEXT NOT NULL,
                    "Value" BIGINT NOT NULL,
                    PRIMARY KEY ("Key")
                )"#
            }
        }
    }
}

/// Remembers which tables exist so the DDL runs once per table.
///
/// Two threads may both run the `IF NOT EXISTS` statement on first use; that is harmless.
#[derive(Debug, Default)]
pub struct SchemaGuard {
    gauges: AtomicBool,
    counters: AtomicBool,
}

impl SchemaGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `table` if this guard has not seen it yet. Must run on a writable connection.
    pub fn ensure(&self, conn: &Connection, table: Table) -> Result<(), StorageError> {
        let flag = self.flag(table);
        if flag.load(Ordering::Acquire) {
            return Ok(());
        }
        conn.execute(table.create_sql(), []).map_err(sqe)?;
        flag.store(true, Ordering::Release);
        tracing::debug!(table = table.name(), "table ready");
        Ok(())
    }

    pub fn is_ready(&self, table: Table) -> bool {
        self.flag(table).load(Ordering::Acquire)
    }

    fn flag(&self, table: Table) -> &AtomicBool {
        match table {
            Table::Gauges => &self.gauges,
            Table::Counters => &self.counters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        let guard = SchemaGuard::new();
        assert!(!guard.is_ready(Table::Gauges));
        guard.ensure(&conn, Table::Gauges).unwrap();
        guard.ensure(&conn, Table::Gauges).unwrap();
        assert!(guard.is_ready(Table::Gauges));
        assert!(!guard.is_ready(Table::Counters));

        // a second guard over an existing table still succeeds
        SchemaGuard::new().ensure(&conn, Table::Gauges).unwrap();
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'gauges'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(n, 1);
    }
}
