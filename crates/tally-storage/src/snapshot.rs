//! `SnapshotWorker`: periodic `dump` of a store on a dedicated thread.
//!
//! Used with the file store when its snapshot interval is non-zero.
//! Stopping the worker runs one last dump, so a clean shutdown never loses
//! writes made since the previous tick.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tally_core::errors::StorageError;
use tally_core::traits::storage::MetricStore;

pub struct SnapshotWorker {
    stop: Sender<()>,
    handle: Option<JoinHandle<usize>>,
}

impl SnapshotWorker {
    pub fn start(store: Arc<dyn MetricStore>, interval: Duration) -> Result<Self, StorageError> {
        if interval.is_zero() {
            return Err(StorageError::Config {
                message: "snapshot interval must be non-zero".to_string(),
            });
        }
        let (tx, rx) = bounded(1);
        let handle = thread::Builder::new()
            .name("tally-snapshot".to_string())
            .spawn(move || snapshot_loop(store.as_ref(), &rx, interval))?;
        tracing::info!(interval_secs = interval.as_secs(), "snapshot worker started");
        Ok(Self {
            stop: tx,
            handle: Some(handle),
        })
    }

    /// Stop the thread after a final dump. Returns the number of dumps attempted.
    pub fn stop(mut self) -> Result<usize, StorageError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<usize, StorageError> {
        let _ = self.stop.try_send(());
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| StorageError::Io {
                message: "snapshot thread panicked".to_string(),
            }),
            None => Ok(0),
        }
    }
}

impl Drop for SnapshotWorker {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

fn snapshot_loop(store: &dyn MetricStore, stop: &Receiver<()>, interval: Duration) -> usize {
    let mut dumps = 0;
    loop {
        let last = match stop.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => false,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        };
        dumps += 1;
        if let Err(e) = store.dump() {
            tracing::warn!(error = %e, "periodic snapshot failed");
        }
        if last {
            break;
        }
    }
    tracing::info!(dumps, "snapshot worker stopped");
    dumps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::FileStore;
    use tally_core::types::metric::{Metric, MetricBatch};

    #[test]
    fn stop_writes_a_final_snapshot() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("metrics.json");
        let store = Arc::new(FileStore::new(&path, false));
        let worker = SnapshotWorker::start(store.clone(), Duration::from_secs(3600)).unwrap();

        store.write_data(&Metric::gauge("g1", 5.0)).unwrap();
        assert!(!path.exists());
        assert_eq!(worker.stop().unwrap(), 1);

        let batch = MetricBatch::from_json(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(batch.metrics, vec![Metric::gauge("g1", 5.0)]);
    }

    #[test]
    fn ticks_dump_periodically() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("metrics.json");
        let store = Arc::new(FileStore::new(&path, false));
        store.write_data(&Metric::counter("c", 1)).unwrap();
        let worker = SnapshotWorker::start(store, Duration::from_millis(10)).unwrap();
        thread::sleep(Duration::from_millis(100));
        assert!(path.exists());
        assert!(worker.stop().unwrap() >= 2);
    }
}
