//! `SqlStore`: the SQLite-backed `MetricStore`.
//!
//! Wraps `DatabaseManager` (single writer + read pool) and a `SchemaGuard`.
//! Every write is a single upsert, so it is durable when the call returns.
//! Batches fold into one `PendingDelta` and commit in one transaction;
//! the same path serves the coalescing coordinator as its `FlushSink`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError};
use rusqlite::Connection;
use tally_core::constants::PING_TIMEOUT_MS;
use tally_core::errors::StorageError;
use tally_core::traits::storage::{ensure_present, MetricStore, MetricTable};
use tally_core::types::collections::{CounterMap, GaugeMap};
use tally_core::types::metric::{
    check_gauge, parse_counter, parse_gauge, Metric, MetricBatch, MetricKind, Sample,
};

use crate::batch::{FlushSink, PendingDelta};
use crate::connection::{sqe, DatabaseManager};
use crate::queries::schema::{SchemaGuard, Table};
use crate::queries::{counters, gauges};

/// Connection plus table bookkeeping, shared by the store and its sub-stores.
struct SqlBackend {
    db: DatabaseManager,
    schema: SchemaGuard,
    /// At most one ping thread exists at a time.
    ping_in_flight: AtomicBool,
}

impl SqlBackend {
    /// Run `f` on the writer after making sure `tables` exist.
    fn write<F, T>(&self, tables: &[Table], f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError>,
    {
        self.db.with_writer(|conn| {
            for table in tables {
                self.schema.ensure(conn, *table)?;
            }
            f(conn)
        })
    }

    /// Run `f` on a reader. Creating a missing table needs the writer.
    fn read<F, T>(&self, table: Table, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError>,
    {
        if !self.schema.is_ready(table) {
            self.db.with_writer(|conn| self.schema.ensure(conn, table))?;
        }
        self.db.with_reader(f)
    }

    fn write_delta(&self, delta: &PendingDelta) -> Result<(), StorageError> {
        if delta.is_empty() {
            return Ok(());
        }
        for value in delta.gauges.values() {
            check_gauge(*value)?;
        }
        let gauge_rows: Vec<(&str, f64)> =
            delta.gauges.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        let counter_rows: Vec<(&str, i64)> =
            delta.counters.iter().map(|(k, v)| (k.as_str(), *v)).collect();

        self.write(&[Table::Gauges, Table::Counters], |conn| {
            let tx = conn.unchecked_transaction().map_err(sqe)?;
            gauges::upsert_many(&tx, &gauge_rows)?;
            counters::accumulate_many(&tx, &counter_rows)?;
            tx.commit().map_err(|e| StorageError::SqliteError {
                message: format!("commit: {e}"),
            })
        })
    }
}

/// Gauge sub-store over the `gauges` table.
pub struct SqlGauges {
    backend: Arc<SqlBackend>,
}

impl MetricTable<f64> for SqlGauges {
    fn read_data(&self, keys: &[&str]) -> Result<GaugeMap, StorageError> {
        let found = self
            .backend
            .read(Table::Gauges, |conn| gauges::select(conn, keys))?;
        ensure_present(MetricKind::Gauge, keys, &found)?;
        Ok(found)
    }

    fn write_data(&self, key: &str, raw: &str) -> Result<(), StorageError> {
        self.write_value(key, parse_gauge(raw)?)
    }

    fn write_value(&self, key: &str, value: f64) -> Result<(), StorageError> {
        let value = check_gauge(value)?;
        self.backend
            .write(&[Table::Gauges], |conn| gauges::upsert(conn, key, value))
    }
}

/// Counter sub-store over the `counters` table.
pub struct SqlCounters {
    backend: Arc<SqlBackend>,
}

impl MetricTable<i64> for SqlCounters {
    fn read_data(&self, keys: &[&str]) -> Result<CounterMap, StorageError> {
        let found = self
            .backend
            .read(Table::Counters, |conn| counters::select(conn, keys))?;
        ensure_present(MetricKind::Counter, keys, &found)?;
        Ok(found)
    }

    fn write_data(&self, key: &str, raw: &str) -> Result<(), StorageError> {
        self.write_value(key, parse_counter(raw)?)
    }

    fn write_value(&self, key: &str, delta: i64) -> Result<(), StorageError> {
        self.backend
            .write(&[Table::Counters], |conn| counters::accumulate(conn, key, delta))
            .map(|_| ())
    }
}

/// The SQL-backed metric store.
pub struct SqlStore {
    backend: Arc<SqlBackend>,
    gauges: SqlGauges,
    counters: SqlCounters,
}

impl SqlStore {
    /// Open from a connection string: `:memory:` or a database file path.
    pub fn open(dsn: &str, read_pool_size: usize) -> Result<Self, StorageError> {
        let db = DatabaseManager::from_dsn(dsn, read_pool_size)?;
        tracing::info!(dsn, "sql metric store opened");
        Ok(Self::with_manager(db))
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Ok(Self::with_manager(DatabaseManager::open_in_memory()?))
    }

    fn with_manager(db: DatabaseManager) -> Self {
        let backend = Arc::new(SqlBackend {
            db,
            schema: SchemaGuard::new(),
            ping_in_flight: AtomicBool::new(false),
        });
        Self {
            gauges: SqlGauges {
                backend: Arc::clone(&backend),
            },
            counters: SqlCounters {
                backend: Arc::clone(&backend),
            },
            backend,
        }
    }

    /// Apply a folded delta in one transaction. All-or-nothing.
    pub fn write_delta(&self, delta: &PendingDelta) -> Result<(), StorageError> {
        self.backend.write_delta(delta)
    }
}

impl MetricStore for SqlStore {
    fn write_data(&self, metric: &Metric) -> Result<Metric, StorageError> {
        let update = metric.validate()?;
        match update.sample {
            Sample::Gauge(value) => {
                self.gauges.write_value(&update.id, value)?;
                Ok(Metric::gauge(update.id, value))
            }
            Sample::Counter(delta) => {
                let total = self.backend.write(&[Table::Counters], |conn| {
                    counters::accumulate(conn, &update.id, delta)
                })?;
                Ok(Metric::counter(update.id, total))
            }
        }
    }

    fn write_batch(&self, batch: &MetricBatch) -> Result<(), StorageError> {
        let updates = batch.validate()?;
        self.backend.write_delta(&PendingDelta::from_updates(&updates)?)
    }

    fn gauges(&self) -> &dyn MetricTable<f64> {
        &self.gauges
    }

    fn counters(&self) -> &dyn MetricTable<i64> {
        &self.counters
    }

    fn dump(&self) -> Result<(), StorageError> {
        Ok(())
    }

    fn load(&self) -> Result<(), StorageError> {
        Ok(())
    }

    /// `SELECT 1` on a helper thread, abandoned after `PING_TIMEOUT_MS`.
    /// While an abandoned ping is still stuck, further pings time out at once.
    fn ping(&self) -> Result<(), StorageError> {
        let timeout = || StorageError::Timeout {
            operation: "ping".to_string(),
            millis: PING_TIMEOUT_MS,
        };
        if self.backend.ping_in_flight.swap(true, Ordering::AcqRel) {
            return Err(timeout());
        }

        let (tx, rx) = bounded(1);
        let backend = Arc::clone(&self.backend);
        let spawned = thread::Builder::new()
            .name("tally-ping".to_string())
            .spawn(move || {
                let outcome = backend.db.with_reader(|conn| {
                    conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                        .map_err(sqe)
                });
                backend.ping_in_flight.store(false, Ordering::Release);
                // The caller may have given up already.
                let _ = tx.send(outcome.map(|_| ()));
            });
        if let Err(e) = spawned {
            self.backend.ping_in_flight.store(false, Ordering::Release);
            return Err(e.into());
        }

        match rx.recv_timeout(Duration::from_millis(PING_TIMEOUT_MS)) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => Err(timeout()),
            Err(RecvTimeoutError::Disconnected) => Err(StorageError::SqliteError {
                message: "ping thread exited without reporting".to_string(),
            }),
        }
    }

    fn close(&self) -> Result<(), StorageError> {
        self.backend.db.close()
    }
}

impl FlushSink for SqlStore {
    fn flush(&self, delta: &PendingDelta) -> Result<(), StorageError> {
        self.backend.write_delta(delta)
    }
}
