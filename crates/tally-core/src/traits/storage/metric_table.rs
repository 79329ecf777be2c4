//! `MetricTable` trait: one kind-scoped table (gauges or counters).

use std::sync::Arc;

use crate::errors::StorageError;
use crate::types::collections::FxHashMap;
use crate::types::metric::MetricKind;

/// A kind-scoped view of a store.
///
/// `V` is `f64` for gauges (writes overwrite) and `i64` for counters
/// (writes add to the stored total).
pub trait MetricTable<V>: Send + Sync {
    /// Read the given keys, or every entry when `keys` is empty.
    ///
    /// Fails with `NotFound` if any requested key is absent.
    fn read_data(&self, keys: &[&str]) -> Result<FxHashMap<String, V>, StorageError>;

    /// Write a textual value, parsed for this table's kind.
    fn write_data(&self, key: &str, raw: &str) -> Result<(), StorageError>;

    /// Write an already-typed value.
    fn write_value(&self, key: &str, value: V) -> Result<(), StorageError>;
}

/// Fail with `NotFound` on the first requested key missing from `found`.
pub fn ensure_present<V>(
    kind: MetricKind,
    keys: &[&str],
    found: &FxHashMap<String, V>,
) -> Result<(), StorageError> {
    match keys.iter().find(|key| !found.contains_key(**key)) {
        Some(missing) => Err(StorageError::NotFound {
            kind,
            id: (*missing).to_string(),
        }),
        None => Ok(()),
    }
}

// ─── Arc blanket impl ───────────────────────────────────────────────

impl<V, T: MetricTable<V> + ?Sized> MetricTable<V> for Arc<T> {
    fn read_data(&self, keys: &[&str]) -> Result<FxHashMap<String, V>, StorageError> {
        (**self).read_data(keys)
    }
    fn write_data(&self, key: &str, raw: &str) -> Result<(), StorageError> {
        (**self).write_data(key, raw)
    }
    fn write_value(&self, key: &str, value: V) -> Result<(), StorageError> {
        (**self).write_value(key, value)
    }
}
