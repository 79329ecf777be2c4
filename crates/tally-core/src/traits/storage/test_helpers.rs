//! Shared contract checks for `MetricStore` implementations.
//!
//! Each backend's integration tests run `check_store_contract` against a
//! fresh, empty store so every backend is held to the same behaviour.
//! Panics on the first violated expectation.

use crate::errors::StorageError;
use crate::types::metric::{Metric, MetricBatch, MetricKind};

use super::metric_store::MetricStore;

/// Run the common contract against an empty store.
pub fn check_store_contract(store: &dyn MetricStore) {
    // counter accumulates and reports the running total
    let first = store.write_data(&Metric::counter("contract_c1", 1)).unwrap();
    assert_eq!(first.delta, Some(1));
    let second = store.write_data(&Metric::counter("contract_c1", 2)).unwrap();
    assert_eq!(second.delta, Some(3));
    let read = store
        .read_data(&Metric::query("contract_c1", MetricKind::Counter))
        .unwrap();
    assert_eq!(read.delta, Some(3));
    assert_eq!(read.value, None);

    // gauge overwrites
    store.write_data(&Metric::gauge("contract_g1", 1.0)).unwrap();
    store.write_data(&Metric::gauge("contract_g1", 2.0)).unwrap();
    let read = store
        .read_data(&Metric::query("contract_g1", MetricKind::Gauge))
        .unwrap();
    assert_eq!(read.value, Some(2.0));
    assert_eq!(read.delta, None);

    // namespaces are independent
    store.write_data(&Metric::gauge("contract_c1", 9.5)).unwrap();
    let counters = store.counters().read_data(&["contract_c1"]).unwrap();
    assert_eq!(counters.get("contract_c1"), Some(&3));
    let gauges = store.gauges().read_data(&["contract_c1"]).unwrap();
    assert_eq!(gauges.get("contract_c1"), Some(&9.5));

    // unknown ids and kinds are errors, never defaults
    assert!(matches!(
        store.read_data(&Metric::query("contract_missing", MetricKind::Gauge)),
        Err(StorageError::NotFound { .. })
    ));
    let typo = Metric {
        id: "contract_c1".into(),
        kind: "countter".into(),
        ..Default::default()
    };
    assert!(matches!(
        store.read_data(&typo),
        Err(StorageError::Unsupported { .. })
    ));
    assert!(matches!(
        store.counters().read_data(&["contract_c1", "contract_missing"]),
        Err(StorageError::NotFound { .. })
    ));

    // invalid single writes are rejected
    let mut no_value = Metric::gauge("contract_g2", 0.0);
    no_value.value = None;
    assert!(matches!(
        store.write_data(&no_value),
        Err(StorageError::Validation { .. })
    ));

    // an invalid batch applies nothing
    let bad = MetricBatch::new(vec![
        Metric::counter("contract_c1", 100),
        Metric::gauge("contract_g3", 1.0),
        Metric {
            id: "contract_bad".into(),
            kind: "histogram".into(),
            ..Default::default()
        },
    ]);
    assert!(matches!(
        store.write_batch(&bad),
        Err(StorageError::Validation { .. })
    ));
    assert_eq!(
        store.counters().read_data(&["contract_c1"]).unwrap().get("contract_c1"),
        Some(&3)
    );
    assert!(store.gauges().read_data(&["contract_g3"]).is_err());

    // a valid batch applies everything
    let good = MetricBatch::new(vec![
        Metric::counter("contract_c1", 10),
        Metric::counter("contract_c1", 5),
        Metric::gauge("contract_g3", 4.0),
        Metric::gauge("contract_g3", 8.0),
    ]);
    store.write_batch(&good).unwrap();
    assert_eq!(
        store.counters().read_data(&["contract_c1"]).unwrap().get("contract_c1"),
        Some(&18)
    );
    assert_eq!(
        store.gauges().read_data(&["contract_g3"]).unwrap().get("contract_g3"),
        Some(&8.0)
    );

    // textual and typed sub-store writes
    store.gauges().write_data("contract_g4", "12.5").unwrap();
    store.counters().write_data("contract_c2", "7").unwrap();
    store.counters().write_value("contract_c2", 3).unwrap();
    assert!(matches!(
        store.counters().write_data("contract_c2", "seven"),
        Err(StorageError::Validation { .. })
    ));
    assert_eq!(
        store.gauges().read_data(&["contract_g4"]).unwrap().get("contract_g4"),
        Some(&12.5)
    );
    assert_eq!(
        store.counters().read_data(&["contract_c2"]).unwrap().get("contract_c2"),
        Some(&10)
    );

    // empty key list returns everything
    let all_gauges = store.gauges().read_data(&[]).unwrap();
    assert_eq!(all_gauges.len(), 4);
    let all_counters = store.counters().read_data(&[]).unwrap();
    assert_eq!(all_counters.len(), 2);

    store.ping().unwrap();
}
