//! Non-finite gauges and counter overflow, against every backend.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use tally_core::errors::StorageError;
use tally_core::traits::storage::MetricStore;
use tally_core::types::metric::{Metric, MetricBatch, MetricKind};
use tally_storage::{CoalescingStore, FileStore, SqlStore};

fn is_validation<T: std::fmt::Debug>(result: Result<T, StorageError>) -> bool {
    matches!(result, Err(StorageError::Validation { .. }))
}

fn counter(store: &dyn MetricStore, id: &str) -> Option<i64> {
    store
        .read_data(&Metric::query(id, MetricKind::Counter))
        .ok()
        .and_then(|m| m.delta)
}

fn temp_sql() -> (TempDir, SqlStore) {
    let dir = TempDir::new().unwrap();
    let dsn = dir.path().join("metrics.db");
    let store = SqlStore::open(dsn.to_str().unwrap(), 2).unwrap();
    (dir, store)
}

// ─── File store ──────────────────────────────────────────────────────────

#[test]
fn file_store_refuses_non_finite_gauges_and_still_round_trips() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("metrics.json");
    let store = FileStore::new(&path, false);
    store.write_data(&Metric::gauge("Alloc", 1.5)).unwrap();

    assert!(is_validation(store.gauges().write_data("Alloc", "inf")));
    assert!(is_validation(store.gauges().write_data("Alloc", "NaN")));
    assert!(is_validation(store.gauges().write_value("Alloc", f64::INFINITY)));
    assert!(is_validation(store.write_data(&Metric::gauge("Alloc", f64::NAN))));

    store.dump().unwrap();
    let restored = FileStore::new(&path, false);
    restored.load().unwrap();
    let alloc = restored
        .read_data(&Metric::query("Alloc", MetricKind::Gauge))
        .unwrap();
    assert_eq!(alloc.value, Some(1.5));
}

#[test]
fn file_store_counter_overflow_keeps_the_total() {
    let dir = TempDir::new().unwrap();
    let store = FileStore::new(dir.path().join("metrics.json"), false);
    store.write_data(&Metric::counter("c", i64::MAX)).unwrap();

    assert!(is_validation(store.write_data(&Metric::counter("c", 1))));
    assert!(is_validation(store.counters().write_value("c", 1)));
    assert!(is_validation(store.counters().write_data("c", "1")));
    assert_eq!(counter(&store, "c"), Some(i64::MAX));
}

#[test]
fn file_store_overflowing_batch_applies_nothing() {
    let dir = TempDir::new().unwrap();
    let store = FileStore::new(dir.path().join("metrics.json"), false);
    store.write_data(&Metric::counter("c", i64::MAX)).unwrap();

    let batch = MetricBatch::new(vec![
        Metric::counter("other", 4),
        Metric::gauge("g", 2.0),
        Metric::counter("c", 1),
    ]);
    assert!(is_validation(store.write_batch(&batch)));
    assert_eq!(counter(&store, "other"), None);
    assert!(store.gauges().read_data(&[]).unwrap().is_empty());
    assert_eq!(counter(&store, "c"), Some(i64::MAX));
}

// ─── SQL store ───────────────────────────────────────────────────────────

#[test]
fn sql_store_refuses_non_finite_gauges() {
    let (_dir, store) = temp_sql();
    assert!(is_validation(store.write_data(&Metric::gauge("g", f64::NAN))));
    assert!(is_validation(store.gauges().write_value("g", f64::NEG_INFINITY)));
    assert!(is_validation(store.gauges().write_data("g", "-inf")));
    assert!(is_validation(
        store.write_batch(&MetricBatch::new(vec![Metric::gauge("g", f64::INFINITY)]))
    ));
    assert!(store.gauges().read_data(&[]).unwrap().is_empty());
}

#[test]
fn sql_store_counter_overflow_keeps_the_table_readable() {
    let (_dir, store) = temp_sql();
    store.write_data(&Metric::counter("c", i64::MAX)).unwrap();

    assert!(is_validation(store.write_data(&Metric::counter("c", 1))));
    assert!(is_validation(store.counters().write_value("c", 1)));

    let all = store.counters().read_data(&[]).unwrap();
    assert_eq!(all.get("c"), Some(&i64::MAX));
}

#[test]
fn sql_store_overflowing_batch_rolls_back() {
    let (_dir, store) = temp_sql();
    store.write_data(&Metric::counter("c", i64::MAX)).unwrap();

    let batch = MetricBatch::new(vec![
        Metric::counter("other", 4),
        Metric::gauge("g", 2.0),
        Metric::counter("c", 1),
    ]);
    assert!(is_validation(store.write_batch(&batch)));

    assert_eq!(counter(&store, "other"), None);
    assert!(store.gauges().read_data(&[]).unwrap().is_empty());
    assert_eq!(counter(&store, "c"), Some(i64::MAX));
}

// ─── Coalesced store ─────────────────────────────────────────────────────

#[test]
fn coalesced_store_overflow_fails_the_window_only() {
    let (_dir, sql) = temp_sql();
    let sql = Arc::new(sql);
    sql.write_data(&Metric::counter("c", i64::MAX)).unwrap();
    let store = CoalescingStore::new(Arc::clone(&sql), Duration::from_millis(10)).unwrap();

    assert!(is_validation(store.write_data(&Metric::gauge("g", f64::NAN))));
    assert!(is_validation(store.write_data(&Metric::counter("c", 1))));

    store.write_data(&Metric::counter("d", 3)).unwrap();
    assert_eq!(counter(&store, "c"), Some(i64::MAX));
    assert_eq!(counter(&store, "d"), Some(3));
    store.close().unwrap();
}

#[test]
fn coalesced_store_refuses_overflow_within_one_batch() {
    let (_dir, sql) = temp_sql();
    let store = CoalescingStore::new(Arc::new(sql), Duration::from_millis(10)).unwrap();

    let batch = MetricBatch::new(vec![
        Metric::counter("c", i64::MAX),
        Metric::counter("c", 1),
    ]);
    assert!(is_validation(store.write_batch(&batch)));
    store.dump().unwrap();
    assert!(store.counters().read_data(&[]).unwrap().is_empty());
    store.close().unwrap();
}
