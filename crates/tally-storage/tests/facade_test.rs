//! Backend selection and lifecycle through the `Storage` facade.

use std::fs;

use tempfile::TempDir;

use tally_core::config::StorageConfig;
use tally_core::errors::StorageError;
use tally_core::traits::storage::MetricStore;
use tally_core::types::metric::{Metric, MetricBatch, MetricKind};
use tally_storage::{BackendKind, Storage};

fn file_config(dir: &TempDir, interval_secs: u64) -> StorageConfig {
    StorageConfig {
        store_file: Some(dir.path().join("metrics.json")),
        store_interval_secs: Some(interval_secs),
        ..Default::default()
    }
}

#[test]
fn no_dsn_selects_file_store() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::open(&file_config(&dir, 0)).unwrap();
    assert_eq!(storage.backend(), BackendKind::File);
    storage.close().unwrap();
}

#[test]
fn blank_dsn_still_selects_file_store() {
    let dir = TempDir::new().unwrap();
    let config = StorageConfig {
        database_dsn: Some("   ".into()),
        ..file_config(&dir, 0)
    };
    assert_eq!(Storage::open(&config).unwrap().backend(), BackendKind::File);
}

#[test]
fn dsn_selects_sql_and_cache_interval_wraps_it() {
    let dir = TempDir::new().unwrap();
    let dsn = dir.path().join("metrics.db").to_str().unwrap().to_string();

    let plain = StorageConfig {
        database_dsn: Some(dsn.clone()),
        ..Default::default()
    };
    let storage = Storage::open(&plain).unwrap();
    assert_eq!(storage.backend(), BackendKind::Sql);
    storage.close().unwrap();

    let cached = StorageConfig {
        database_dsn: Some(dsn),
        cache_interval_ms: Some(10),
        ..Default::default()
    };
    let storage = Storage::open(&cached).unwrap();
    assert_eq!(storage.backend(), BackendKind::CachedSql);
    storage.write_data(&Metric::counter("c", 1)).unwrap();
    storage.close().unwrap();
}

#[test]
fn restore_loads_the_previous_snapshot() {
    let dir = TempDir::new().unwrap();
    {
        let storage = Storage::open(&file_config(&dir, 0)).unwrap();
        storage.write_data(&Metric::counter("PollCount", 3)).unwrap();
        storage.write_data(&Metric::gauge("Alloc", 5.0)).unwrap();
        storage.close().unwrap();
    }
    let storage = Storage::open(&file_config(&dir, 0)).unwrap();
    let read = storage
        .read_data(&Metric::query("PollCount", MetricKind::Counter))
        .unwrap();
    assert_eq!(read.delta, Some(3));

    let no_restore = StorageConfig {
        restore: Some(false),
        ..file_config(&dir, 0)
    };
    let fresh = Storage::open(&no_restore).unwrap();
    assert!(fresh.counters().read_data(&[]).unwrap().is_empty());
}

#[test]
fn missing_snapshot_starts_empty() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::open(&file_config(&dir, 0)).unwrap();
    assert!(storage.gauges().read_data(&[]).unwrap().is_empty());
}

#[test]
fn close_writes_final_snapshot_for_periodic_file_store() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::open(&file_config(&dir, 3600)).unwrap();
    storage
        .write_batch(&MetricBatch::new(vec![Metric::gauge("g1", 1.5)]))
        .unwrap();
    let path = dir.path().join("metrics.json");
    assert!(!path.exists());

    storage.close().unwrap();
    storage.close().unwrap();
    let batch = MetricBatch::from_json(&fs::read(&path).unwrap()).unwrap();
    assert_eq!(batch.metrics, vec![Metric::gauge("g1", 1.5)]);
}

#[test]
fn typo_in_kind_is_an_error_on_every_backend() {
    let dir = TempDir::new().unwrap();
    let configs = [
        file_config(&dir, 0),
        StorageConfig {
            database_dsn: Some(":memory:".into()),
            ..Default::default()
        },
        StorageConfig {
            database_dsn: Some(":memory:".into()),
            cache_interval_ms: Some(5),
            ..Default::default()
        },
    ];
    for config in &configs {
        let storage = Storage::open(config).unwrap();
        let query = Metric {
            id: "PollCount".into(),
            kind: "countter".into(),
            ..Default::default()
        };
        assert_eq!(
            storage.read_data(&query),
            Err(StorageError::Unsupported {
                kind: "countter".into()
            })
        );
        storage.close().unwrap();
    }
}

#[test]
fn invalid_config_is_refused() {
    let config = StorageConfig {
        read_pool_size: Some(0),
        ..Default::default()
    };
    assert!(matches!(
        Storage::open(&config),
        Err(StorageError::Config { .. })
    ));
}

#[test]
fn sql_backend_round_trip_through_facade() {
    let storage = Storage::open(&StorageConfig {
        database_dsn: Some(":memory:".into()),
        ..Default::default()
    })
    .unwrap();
    storage.write_data(&Metric::gauge("g", 1.0)).unwrap();
    storage.write_data(&Metric::gauge("g", 2.0)).unwrap();
    let read = storage.read_data(&Metric::query("g", MetricKind::Gauge)).unwrap();
    assert_eq!(read.value, Some(2.0));
    storage.dump().unwrap();
    storage.load().unwrap();
    storage.ping().unwrap();
}
