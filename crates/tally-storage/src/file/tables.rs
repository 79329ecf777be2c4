//! In-memory gauge and counter tables for the file store.

use tally_core::errors::StorageError;
use tally_core::traits::storage::MetricTable;
use tally_core::types::collections::{CounterMap, GaugeMap};
use tally_core::types::metric::{check_gauge, parse_counter, parse_gauge, MetricKind};

use crate::tables::SharedTable;

/// Gauge table. Writes overwrite.
#[derive(Debug, Default)]
pub struct GaugeTable(SharedTable<f64>);

impl GaugeTable {
    pub fn new() -> Self {
        Self(SharedTable::new())
    }

    pub fn set(&self, key: &str, value: f64) {
        self.0.set(key, value);
    }

    pub fn set_all(&self, values: &GaugeMap) {
        self.0.set_all(values);
    }

    pub fn snapshot(&self) -> GaugeMap {
        self.0.snapshot()
    }
}

impl MetricTable<f64> for GaugeTable {
    fn read_data(&self, keys: &[&str]) -> Result<GaugeMap, StorageError> {
        self.0.select(MetricKind::Gauge, keys)
    }

    fn write_data(&self, key: &str, raw: &str) -> Result<(), StorageError> {
        self.set(key, parse_gauge(raw)?);
        Ok(())
    }

    fn write_value(&self, key: &str, value: f64) -> Result<(), StorageError> {
        self.set(key, check_gauge(value)?);
        Ok(())
    }
}

/// Counter table. Writes add to the stored total.
#[derive(Debug, Default)]
pub struct CounterTable(SharedTable<i64>);

impl CounterTable {
    pub fn new() -> Self {
        Self(SharedTable::new())
    }

    /// Returns the new total. An overflowing delta leaves the total unchanged.
    pub fn add(&self, key: &str, delta: i64) -> Result<i64, StorageError> {
        self.0.add(key, delta)
    }

    /// Add every delta, or none of them if any total would overflow.
    pub fn add_all(&self, deltas: &CounterMap) -> Result<(), StorageError> {
        self.0.add_all(deltas)
    }

    pub fn snapshot(&self) -> CounterMap {
        self.0.snapshot()
    }
}

impl MetricTable<i64> for CounterTable {
    fn read_data(&self, keys: &[&str]) -> Result<CounterMap, StorageError> {
        self.0.select(MetricKind::Counter, keys)
    }

    fn write_data(&self, key: &str, raw: &str) -> Result<(), StorageError> {
        self.add(key, parse_counter(raw)?)?;
        Ok(())
    }

    fn write_value(&self, key: &str, delta: i64) -> Result<(), StorageError> {
        self.add(key, delta)?;
        Ok(())
    }
}
