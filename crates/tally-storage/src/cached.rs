//! `CoalescingStore`: the SQL store behind a write-coalescing coordinator.
//!
//! Metric writes go through the coordinator and return once the flush that
//! covers them has committed. Sub-store writes bypass the coordinator and
//! hit SQL directly, like reads do.

use std::sync::Arc;
use std::time::Duration;

use tally_core::errors::StorageError;
use tally_core::traits::storage::{MetricStore, MetricTable};
use tally_core::types::metric::{Metric, MetricBatch, Sample};

use crate::batch::{Coordinator, FlushSink};
use crate::engine::SqlStore;

pub struct CoalescingStore {
    sql: Arc<SqlStore>,
    coordinator: Coordinator,
}

impl CoalescingStore {
    /// Start a coordinator flushing into `sql` every `interval`.
    pub fn new(sql: Arc<SqlStore>, interval: Duration) -> Result<Self, StorageError> {
        let sink: Arc<dyn FlushSink> = Arc::clone(&sql) as Arc<dyn FlushSink>;
        let coordinator = Coordinator::start(sink, interval)?;
        Ok(Self { sql, coordinator })
    }

    pub fn interval(&self) -> Duration {
        self.coordinator.interval()
    }
}

impl MetricStore for CoalescingStore {
    /// Blocks until the next flush. Counter writes then report the durable
    /// total, which may include other writers' deltas from the same window.
    fn write_data(&self, metric: &Metric) -> Result<Metric, StorageError> {
        let update = metric.validate()?;
        self.coordinator.submit(std::slice::from_ref(&update))?;
        match update.sample {
            Sample::Gauge(_) => Ok(update.to_metric()),
            Sample::Counter(_) => {
                let totals = self.sql.counters().read_data(&[update.id.as_str()])?;
                let total = totals.get(&update.id).copied().unwrap_or_default();
                Ok(Metric::counter(update.id, total))
            }
        }
    }

    fn write_batch(&self, batch: &MetricBatch) -> Result<(), StorageError> {
        let updates = batch.validate()?;
        if updates.is_empty() {
            return Ok(());
        }
        self.coordinator.submit(&updates)
    }

    fn gauges(&self) -> &dyn MetricTable<f64> {
        self.sql.gauges()
    }

    fn counters(&self) -> &dyn MetricTable<i64> {
        self.sql.counters()
    }

    /// Flush pending writes now instead of at the next tick.
    fn dump(&self) -> Result<(), StorageError> {
        self.coordinator.flush_now()
    }

    fn load(&self) -> Result<(), StorageError> {
        Ok(())
    }

    fn ping(&self) -> Result<(), StorageError> {
        self.sql.ping()
    }

    /// Final flush, then close the database.
    fn close(&self) -> Result<(), StorageError> {
        let stats = self.coordinator.shutdown()?;
        tracing::info!(
            cycles = stats.cycles,
            gauge_rows = stats.gauge_rows,
            counter_rows = stats.counter_rows,
            failures = stats.failures,
            "write coalescing stopped"
        );
        self.sql.close()
    }
}
