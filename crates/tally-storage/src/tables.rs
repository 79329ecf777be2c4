//! `SharedTable`: a mutex-guarded name → value map.
//!
//! Backs the file store's gauge and counter tables and the coordinator's
//! pending tables. Each table has its own lock, so gauge and counter
//! traffic never contend.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tally_core::errors::StorageError;
use tally_core::traits::storage::ensure_present;
use tally_core::types::collections::{CounterMap, FxHashMap};
use tally_core::types::metric::{checked_total, MetricKind};

#[derive(Debug, Default)]
pub struct SharedTable<V> {
    entries: Mutex<FxHashMap<String, V>>,
}

impl<V: Copy> SharedTable<V> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(FxHashMap::default()),
        }
    }

    /// Overwrite `key`.
    pub fn set(&self, key: &str, value: V) {
        self.lock().insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.lock().get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of every entry.
    pub fn snapshot(&self) -> FxHashMap<String, V> {
        self.lock().clone()
    }

    /// Overwrite every key in `values`.
    pub fn set_all(&self, values: &FxHashMap<String, V>) {
        let mut entries = self.lock();
        for (key, value) in values {
            entries.insert(key.clone(), *value);
        }
    }

    /// Move every entry out, leaving the table empty.
    pub fn take(&self) -> FxHashMap<String, V> {
        std::mem::take(&mut *self.lock())
    }

    /// The requested keys (all entries when `keys` is empty); `NotFound` on any absent key.
    pub fn select(
        &self,
        kind: MetricKind,
        keys: &[&str],
    ) -> Result<FxHashMap<String, V>, StorageError> {
        let entries = self.lock();
        if keys.is_empty() {
            return Ok(entries.clone());
        }
        let found: FxHashMap<String, V> = keys
            .iter()
            .filter_map(|key| entries.get(*key).map(|v| ((*key).to_string(), *v)))
            .collect();
        ensure_present(kind, keys, &found)?;
        Ok(found)
    }

    /// Plain maps stay consistent even if a holder panicked.
    fn lock(&self) -> MutexGuard<'_, FxHashMap<String, V>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SharedTable<i64> {
    /// Add `delta` to `key` (starting from zero). Returns the new total.
    /// On overflow the entry is left unchanged.
    pub fn add(&self, key: &str, delta: i64) -> Result<i64, StorageError> {
        let mut entries = self.lock();
        let total = checked_total(key, entries.get(key).copied().unwrap_or(0), delta)?;
        entries.insert(key.to_string(), total);
        Ok(total)
    }

    /// Add every delta, or none of them if any total would overflow.
    pub fn add_all(&self, deltas: &CounterMap) -> Result<(), StorageError> {
        let mut entries = self.lock();
        let mut totals = Vec::with_capacity(deltas.len());
        for (key, delta) in deltas {
            let current = entries.get(key).copied().unwrap_or(0);
            totals.push((key, checked_total(key, current, *delta)?));
        }
        for (key, total) in totals {
            entries.insert(key.clone(), total);
        }
        Ok(())
    }
}
