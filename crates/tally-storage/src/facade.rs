//! `Storage`: picks a backend from `StorageConfig` and exposes it as a `MetricStore`.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tally_core::config::StorageConfig;
use tally_core::errors::StorageError;
use tally_core::traits::storage::{MetricStore, MetricTable};
use tally_core::types::metric::{Metric, MetricBatch};

use crate::cached::CoalescingStore;
use crate::engine::SqlStore;
use crate::file::FileStore;
use crate::snapshot::SnapshotWorker;

/// Which backend a `Storage` was built with. Diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    File,
    Sql,
    /// SQL behind the write-coalescing coordinator.
    CachedSql,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::File => "file",
            Self::Sql => "sql",
            Self::CachedSql => "cached-sql",
        })
    }
}

/// The store transports talk to.
pub struct Storage {
    backend: Arc<dyn MetricStore>,
    kind: BackendKind,
    worker: Mutex<Option<SnapshotWorker>>,
    closed: AtomicBool,
}

impl Storage {
    /// Build the configured backend.
    ///
    /// A DSN selects SQL (coalesced when a cache interval is set); otherwise
    /// the file store is used. With `restore` set the backend's `load` runs
    /// once here; a failed restore is logged and the store starts empty.
    pub fn open(config: &StorageConfig) -> Result<Self, StorageError> {
        config.validate()?;

        let (backend, kind): (Arc<dyn MetricStore>, BackendKind) =
            match config.effective_database_dsn() {
                Some(dsn) => {
                    let sql = Arc::new(SqlStore::open(dsn, config.effective_read_pool_size())?);
                    match config.effective_cache_interval() {
                        Some(interval) => {
                            let cached = CoalescingStore::new(sql, interval)?;
                            (Arc::new(cached) as Arc<dyn MetricStore>, BackendKind::CachedSql)
                        }
                        None => (sql as Arc<dyn MetricStore>, BackendKind::Sql),
                    }
                }
                None => {
                    let sync_dump = config.effective_store_interval().is_zero();
                    let file = FileStore::new(config.effective_store_file(), sync_dump);
                    (Arc::new(file) as Arc<dyn MetricStore>, BackendKind::File)
                }
            };

        if config.effective_restore() {
            if let Err(e) = backend.load() {
                tracing::warn!(backend = %kind, error = %e, "restore failed, starting empty");
            }
        }

        let interval = config.effective_store_interval();
        let worker = if kind == BackendKind::File && !interval.is_zero() {
            Some(SnapshotWorker::start(Arc::clone(&backend), interval)?)
        } else {
            None
        };

        tracing::info!(backend = %kind, "storage ready");
        Ok(Self {
            backend,
            kind,
            worker: Mutex::new(worker),
            closed: AtomicBool::new(false),
        })
    }

    pub fn backend(&self) -> BackendKind {
        self.kind
    }
}

impl MetricStore for Storage {
    fn write_data(&self, metric: &Metric) -> Result<Metric, StorageError> {
        self.backend.write_data(metric)
    }

    fn write_batch(&self, batch: &MetricBatch) -> Result<(), StorageError> {
        self.backend.write_batch(batch)
    }

    fn read_data(&self, query: &Metric) -> Result<Metric, StorageError> {
        self.backend.read_data(query)
    }

    fn gauges(&self) -> &dyn MetricTable<f64> {
        self.backend.gauges()
    }

    fn counters(&self) -> &dyn MetricTable<i64> {
        self.backend.counters()
    }

    fn dump(&self) -> Result<(), StorageError> {
        self.backend.dump()
    }

    fn load(&self) -> Result<(), StorageError> {
        self.backend.load()
    }

    fn ping(&self) -> Result<(), StorageError> {
        self.backend.ping()
    }

    /// Stop the snapshot worker (final dump), then close the backend. Idempotent.
    fn close(&self) -> Result<(), StorageError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            worker.stop()?;
        }
        self.backend.close()?;
        tracing::info!(backend = %self.kind, "storage closed");
        Ok(())
    }
}
