//! `FileStore`: in-memory tables persisted as a whole-file JSON snapshot.
//!
//! The snapshot is the `{"metrics_db": [...]}` batch of every stored metric,
//! rewritten in full on each `dump`. `load` re-applies a snapshot through
//! the live write path, so counters already present **accumulate**: loading
//! `c1 = 3` into a store holding `c1 = 3` leaves `c1 = 6`.

mod tables;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tally_core::errors::StorageError;
use tally_core::traits::storage::{MetricStore, MetricTable};
use tally_core::types::metric::{Metric, MetricBatch, MetricUpdate, Sample};

use crate::batch::PendingDelta;

pub use tables::{CounterTable, GaugeTable};

pub struct FileStore {
    gauges: GaugeTable,
    counters: CounterTable,
    path: PathBuf,
    /// Dump after every successful write.
    sync_dump: bool,
    /// Serializes dumps; table locks are only held while copying.
    dump_lock: Mutex<()>,
}

impl FileStore {
    /// An empty store persisting to `path`. Nothing is read from disk here.
    pub fn new(path: impl Into<PathBuf>, sync_dump: bool) -> Self {
        Self {
            gauges: GaugeTable::new(),
            counters: CounterTable::new(),
            path: path.into(),
            sync_dump,
            dump_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_sync(&self) -> bool {
        self.sync_dump
    }

    /// Every stored metric, gauges first, each kind sorted by id.
    pub fn snapshot(&self) -> MetricBatch {
        let mut gauges: Vec<_> = self.gauges.snapshot().into_iter().collect();
        gauges.sort_by(|a, b| a.0.cmp(&b.0));
        let mut counters: Vec<_> = self.counters.snapshot().into_iter().collect();
        counters.sort_by(|a, b| a.0.cmp(&b.0));

        gauges
            .into_iter()
            .map(|(id, value)| Metric::gauge(id, value))
            .chain(counters.into_iter().map(|(id, delta)| Metric::counter(id, delta)))
            .collect()
    }

    fn apply(&self, update: &MetricUpdate) -> Result<Metric, StorageError> {
        match update.sample {
            Sample::Gauge(value) => {
                self.gauges.set(&update.id, value);
                Ok(Metric::gauge(update.id.clone(), value))
            }
            Sample::Counter(delta) => {
                let total = self.counters.add(&update.id, delta)?;
                Ok(Metric::counter(update.id.clone(), total))
            }
        }
    }

    /// Fold then apply, so a counter overflow anywhere applies nothing.
    fn apply_all(&self, updates: &[MetricUpdate]) -> Result<(), StorageError> {
        let delta = PendingDelta::from_updates(updates)?;
        self.counters.add_all(&delta.counters)?;
        self.gauges.set_all(&delta.gauges);
        Ok(())
    }

    /// Persistence failures never fail the write that triggered them.
    fn dump_after_write(&self) {
        if !self.sync_dump {
            return;
        }
        if let Err(e) = self.dump() {
            tracing::warn!(path = %self.path.display(), error = %e, "synchronous dump failed");
        }
    }
}

impl MetricStore for FileStore {
    fn write_data(&self, metric: &Metric) -> Result<Metric, StorageError> {
        let update = metric.validate()?;
        let written = self.apply(&update)?;
        self.dump_after_write();
        Ok(written)
    }

    fn write_batch(&self, batch: &MetricBatch) -> Result<(), StorageError> {
        let updates = batch.validate()?;
        self.apply_all(&updates)?;
        self.dump_after_write();
        Ok(())
    }

    fn gauges(&self) -> &dyn MetricTable<f64> {
        &self.gauges
    }

    fn counters(&self) -> &dyn MetricTable<i64> {
        &self.counters
    }

    /// Truncate and rewrite the snapshot file.
    fn dump(&self) -> Result<(), StorageError> {
        let _guard = self.dump_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let batch = self.snapshot();
        fs::write(&self.path, batch.to_json_pretty()?)?;
        tracing::debug!(path = %self.path.display(), metrics = batch.len(), "snapshot written");
        Ok(())
    }

    /// Apply the snapshot on top of the current tables. The whole file is
    /// validated first; an invalid entry or an overflowing counter applies nothing.
    fn load(&self) -> Result<(), StorageError> {
        let bytes = fs::read(&self.path)?;
        let batch = MetricBatch::from_json(&bytes)?;
        let updates = batch.validate()?;
        self.apply_all(&updates)?;
        tracing::info!(path = %self.path.display(), metrics = updates.len(), "snapshot loaded");
        Ok(())
    }

    fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }

    fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
