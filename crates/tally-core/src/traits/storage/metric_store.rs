//! `MetricStore` trait: the contract every backend and the facade expose.

use std::sync::Arc;

use crate::errors::StorageError;
use crate::types::metric::{Metric, MetricBatch, MetricKind};

use super::metric_table::MetricTable;

/// The storage contract consumed by transports.
///
/// Transports only ever see `dyn MetricStore`; backend types stay private
/// to the facade.
pub trait MetricStore: Send + Sync {
    /// Apply one metric. For counters the returned metric carries the new
    /// cumulative total in `delta`.
    fn write_data(&self, metric: &Metric) -> Result<Metric, StorageError>;

    /// Apply many metrics as a unit. Nothing is applied if any entry is invalid.
    fn write_batch(&self, batch: &MetricBatch) -> Result<(), StorageError>;

    /// Resolve the current value for `query.id` / `query.kind`.
    ///
    /// `Unsupported` for an unknown kind, `NotFound` for an absent id.
    fn read_data(&self, query: &Metric) -> Result<Metric, StorageError> {
        let kind: MetricKind = query.metric_kind()?;
        let id = query.id.as_str();
        let mut resolved = Metric::query(id, kind);
        let not_found = || StorageError::NotFound {
            kind,
            id: id.to_string(),
        };
        match kind {
            MetricKind::Gauge => {
                let found = self.gauges().read_data(&[id])?;
                resolved.value = Some(*found.get(id).ok_or_else(not_found)?);
            }
            MetricKind::Counter => {
                let found = self.counters().read_data(&[id])?;
                resolved.delta = Some(*found.get(id).ok_or_else(not_found)?);
            }
        }
        Ok(resolved)
    }

    /// Gauge sub-store.
    fn gauges(&self) -> &dyn MetricTable<f64>;

    /// Counter sub-store.
    fn counters(&self) -> &dyn MetricTable<i64>;

    /// Persist to durable storage. A no-op for backends without a separate durability step.
    fn dump(&self) -> Result<(), StorageError>;

    /// Reload from durable storage. A no-op for backends without a separate durability step.
    fn load(&self) -> Result<(), StorageError>;

    /// Liveness check, bounded by an internal timeout.
    fn ping(&self) -> Result<(), StorageError>;

    /// Release backend resources.
    fn close(&self) -> Result<(), StorageError>;
}

// ─── Arc blanket impl ───────────────────────────────────────────────

impl<T: MetricStore + ?Sized> MetricStore for Arc<T> {
    fn write_data(&self, metric: &Metric) -> Result<Metric, StorageError> {
        (**self).write_data(metric)
    }
    fn write_batch(&self, batch: &MetricBatch) -> Result<(), StorageError> {
        (**self).write_batch(batch)
    }
    fn read_data(&self, query: &Metric) -> Result<Metric, StorageError> {
        (**self).read_data(query)
    }
    fn gauges(&self) -> &dyn MetricTable<f64> {
        (**self).gauges()
    }
    fn counters(&self) -> &dyn MetricTable<i64> {
        (**self).counters()
    }
    fn dump(&self) -> Result<(), StorageError> {
        (**self).dump()
    }
    fn load(&self) -> Result<(), StorageError> {
        (**self).load()
    }
    fn ping(&self) -> Result<(), StorageError> {
        (**self).ping()
    }
    fn close(&self) -> Result<(), StorageError> {
        (**self).close()
    }
}
