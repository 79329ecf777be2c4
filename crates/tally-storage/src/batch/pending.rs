//! Pending (not yet durable) gauge and counter values.

use tally_core::errors::StorageError;
use tally_core::types::collections::{CounterMap, GaugeMap};
use tally_core::types::metric::{checked_total, MetricUpdate, Sample};

use crate::tables::SharedTable;

/// A folded set of writes: last value per gauge, summed delta per counter.
///
/// Folding is order-insensitive for counters and last-write-wins for
/// gauges, which is all a flush window promises.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingDelta {
    pub gauges: GaugeMap,
    pub counters: CounterMap,
}

impl PendingDelta {
    /// Fold `updates` in order. Fails if a counter's summed delta leaves the i64 range.
    pub fn from_updates<'a>(
        updates: impl IntoIterator<Item = &'a MetricUpdate>,
    ) -> Result<Self, StorageError> {
        let mut delta = Self::default();
        for update in updates {
            delta.apply(update)?;
        }
        Ok(delta)
    }

    /// Fold one update. On overflow nothing changes.
    pub fn apply(&mut self, update: &MetricUpdate) -> Result<(), StorageError> {
        match update.sample {
            Sample::Gauge(v) => {
                self.gauges.insert(update.id.clone(), v);
            }
            Sample::Counter(d) => {
                let slot = self.counters.entry(update.id.clone()).or_default();
                *slot = checked_total(&update.id, *slot, d)?;
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.gauges.is_empty() && self.counters.is_empty()
    }

    /// Distinct keys across both tables.
    pub fn len(&self) -> usize {
        self.gauges.len() + self.counters.len()
    }
}

/// Thread-safe pending tables shared by all writers of one coordinator.
#[derive(Debug)]
pub struct PendingTables {
    gauges: SharedTable<f64>,
    counters: SharedTable<i64>,
}

impl Default for PendingTables {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingTables {
    pub fn new() -> Self {
        Self {
            gauges: SharedTable::new(),
            counters: SharedTable::new(),
        }
    }

    /// Merge a folded delta. Counters are merged all-or-nothing before any
    /// gauge is touched, so a failed merge leaves both tables unchanged.
    pub fn merge(&self, delta: &PendingDelta) -> Result<(), StorageError> {
        self.counters.add_all(&delta.counters)?;
        self.gauges.set_all(&delta.gauges);
        Ok(())
    }

    /// Snapshot-and-clear both tables.
    pub fn take(&self) -> PendingDelta {
        PendingDelta {
            gauges: self.gauges.take(),
            counters: self.counters.take(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.gauges.is_empty() && self.counters.is_empty()
    }
}
