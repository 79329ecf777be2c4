//! Dedicated flush thread that coalesces writes into one transaction per interval.
//!
//! Writers pass the gate, register, apply their updates to the pending
//! tables, deregister, then block until the flush covering their window
//! completes. The flush thread wakes every interval (or on request),
//! closes the gate, waits for registered writers to drain, swaps in a
//! fresh `FlushCycle`, writes the pending snapshot through its
//! `FlushSink`, publishes the outcome on the old cycle and reopens the gate.
//!
//! A write joins the first window whose gate closes after its apply
//! finished; no window is flushed twice, and no writer returns before
//! its window's flush does.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tally_core::errors::StorageError;
use tally_core::types::metric::MetricUpdate;

use super::cycle::FlushCycle;
use super::pending::{PendingDelta, PendingTables};

const CONTROL_BOUND: usize = 64;

/// Destination of a coalesced flush. Must apply the delta atomically.
pub trait FlushSink: Send + Sync + 'static {
    fn flush(&self, delta: &PendingDelta) -> Result<(), StorageError>;
}

/// A command sent to the flush thread.
#[derive(Debug)]
pub enum FlushCommand {
    /// Flush the current window now instead of waiting for the timer.
    Flush,
    /// Run one final flush and stop.
    Shutdown,
}

/// Statistics from the flush thread.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FlushStats {
    /// Windows closed, including empty ones.
    pub cycles: usize,
    /// Windows that reached the sink.
    pub flushes: usize,
    pub failures: usize,
    pub gauge_rows: usize,
    pub counter_rows: usize,
}

struct Gate {
    open: bool,
    /// Set by the final cycle; writers are refused from then on.
    closed: bool,
    in_flight: usize,
    cycle: Arc<FlushCycle>,
}

struct Shared {
    gate: Mutex<Gate>,
    gate_changed: Condvar,
    pending: PendingTables,
}

impl Shared {
    fn lock_gate(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_gate<'a>(&self, guard: MutexGuard<'a, Gate>) -> MutexGuard<'a, Gate> {
        self.gate_changed
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// A writer between passing the gate and finishing its apply.
/// Dropping it deregisters.
struct Registration<'a> {
    shared: &'a Shared,
    cycle: Arc<FlushCycle>,
}

impl<'a> Registration<'a> {
    fn enter(shared: &'a Shared) -> Result<Self, StorageError> {
        let mut gate = shared.lock_gate();
        while !gate.open && !gate.closed {
            gate = shared.wait_gate(gate);
        }
        if gate.closed {
            return Err(StorageError::Closed);
        }
        gate.in_flight += 1;
        Ok(Self {
            shared,
            cycle: Arc::clone(&gate.cycle),
        })
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        let mut gate = self.shared.lock_gate();
        gate.in_flight -= 1;
        if gate.in_flight == 0 {
            self.shared.gate_changed.notify_all();
        }
    }
}

/// Owns the pending tables and the flush thread for one store.
pub struct Coordinator {
    shared: Arc<Shared>,
    control: Sender<FlushCommand>,
    handle: Mutex<Option<JoinHandle<FlushStats>>>,
    interval: Duration,
}

impl Coordinator {
    /// Start the flush thread. `interval` must be non-zero.
    pub fn start(sink: Arc<dyn FlushSink>, interval: Duration) -> Result<Self, StorageError> {
        if interval.is_zero() {
            return Err(StorageError::Config {
                message: "coalescing interval must be non-zero".to_string(),
            });
        }
        let (tx, rx) = bounded(CONTROL_BOUND);
        let shared = Arc::new(Shared {
            gate: Mutex::new(Gate {
                open: true,
                closed: false,
                in_flight: 0,
                cycle: Arc::new(FlushCycle::new(1)),
            }),
            gate_changed: Condvar::new(),
            pending: PendingTables::new(),
        });

        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("tally-flush".to_string())
            .spawn(move || flush_loop(&worker, sink.as_ref(), &rx, interval))?;

        tracing::info!(interval_ms = interval.as_millis() as u64, "write coalescing enabled");
        Ok(Self {
            shared,
            control: tx,
            handle: Mutex::new(Some(handle)),
            interval,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Add validated updates to the pending tables and **block** until the
    /// flush covering them completes. Returns that flush's outcome.
    ///
    /// Updates whose counters would overflow the pending totals are
    /// refused before anything is queued.
    pub fn submit(&self, updates: &[MetricUpdate]) -> Result<(), StorageError> {
        let delta = PendingDelta::from_updates(updates)?;
        let cycle = {
            let registration = Registration::enter(&self.shared)?;
            self.shared.pending.merge(&delta)?;
            Arc::clone(&registration.cycle)
        };
        cycle.wait()
    }

    /// Flush the current window now and **block** until it is durable.
    pub fn flush_now(&self) -> Result<(), StorageError> {
        let cycle = Arc::clone(&Registration::enter(&self.shared)?.cycle);
        // A full channel means flushes are already queued; ours is covered by them.
        let _ = self.control.try_send(FlushCommand::Flush);
        cycle.wait()
    }

    /// Stop the flush thread after one final flush. Idempotent.
    pub fn shutdown(&self) -> Result<FlushStats, StorageError> {
        let _ = self.control.send(FlushCommand::Shutdown);
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match handle {
            Some(handle) => handle.join().map_err(|_| StorageError::Io {
                message: "flush thread panicked".to_string(),
            }),
            None => Ok(FlushStats::default()),
        }
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        // The thread still runs its final flush; nobody waits for it here.
        let _ = self.control.send(FlushCommand::Shutdown);
    }
}

fn flush_loop(
    shared: &Shared,
    sink: &dyn FlushSink,
    control: &Receiver<FlushCommand>,
    interval: Duration,
) -> FlushStats {
    tracing::info!("flush worker started");
    let mut stats = FlushStats::default();

    loop {
        match control.recv_timeout(interval) {
            Ok(FlushCommand::Flush) | Err(RecvTimeoutError::Timeout) => {
                run_cycle(shared, sink, &mut stats, false);
            }
            Ok(FlushCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                run_cycle(shared, sink, &mut stats, true);
                break;
            }
        }
    }

    tracing::info!(
        cycles = stats.cycles,
        flushes = stats.flushes,
        failures = stats.failures,
        "flush worker stopped"
    );
    stats
}

fn run_cycle(shared: &Shared, sink: &dyn FlushSink, stats: &mut FlushStats, last: bool) {
    let cycle = {
        let mut gate = shared.lock_gate();
        gate.open = false;
        if last {
            gate.closed = true;
        }
        while gate.in_flight > 0 {
            gate = shared.wait_gate(gate);
        }
        let next = Arc::new(FlushCycle::new(gate.cycle.generation() + 1));
        std::mem::replace(&mut gate.cycle, next)
    };

    let delta = shared.pending.take();
    stats.cycles += 1;
    let outcome = if delta.is_empty() {
        Ok(())
    } else {
        stats.flushes += 1;
        let outcome = flush_guarded(sink, &delta);
        match &outcome {
            Ok(()) => {
                stats.gauge_rows += delta.gauges.len();
                stats.counter_rows += delta.counters.len();
                tracing::debug!(
                    generation = cycle.generation(),
                    gauges = delta.gauges.len(),
                    counters = delta.counters.len(),
                    "flushed pending writes"
                );
            }
            Err(e) => {
                // The window is dropped; its writers get the error and may resend.
                stats.failures += 1;
                tracing::warn!(
                    generation = cycle.generation(),
                    error = %e,
                    "coalesced flush failed"
                );
            }
        }
        outcome
    };
    cycle.complete(outcome);

    let mut gate = shared.lock_gate();
    if !gate.closed {
        gate.open = true;
    }
    drop(gate);
    shared.gate_changed.notify_all();
}

/// A panicking sink fails its window instead of taking the flush thread down
/// with the gate closed.
fn flush_guarded(sink: &dyn FlushSink, delta: &PendingDelta) -> Result<(), StorageError> {
    panic::catch_unwind(AssertUnwindSafe(|| sink.flush(delta))).unwrap_or_else(|_| {
        Err(StorageError::Io {
            message: "flush sink panicked".to_string(),
        })
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use tally_core::types::metric::Metric;

    /// Records every delta it receives; can be told to fail.
    #[derive(Default)]
    struct RecordingSink {
        seen: Mutex<Vec<PendingDelta>>,
        fail: AtomicBool,
    }

    impl FlushSink for RecordingSink {
        fn flush(&self, delta: &PendingDelta) -> Result<(), StorageError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StorageError::SqliteError {
                    message: "disk I/O error".into(),
                });
            }
            self.seen.lock().unwrap().push(delta.clone());
            Ok(())
        }
    }

    fn updates(metrics: &[Metric]) -> Vec<MetricUpdate> {
        metrics.iter().map(|m| m.validate().unwrap()).collect()
    }

    #[test]
    fn submit_blocks_until_flushed() {
        let sink = Arc::new(RecordingSink::default());
        let coordinator =
            Coordinator::start(sink.clone(), Duration::from_millis(20)).unwrap();

        coordinator
            .submit(&updates(&[Metric::counter("c", 2), Metric::gauge("g", 1.5)]))
            .unwrap();

        let seen = sink.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].counters.get("c"), Some(&2));
        assert_eq!(seen[0].gauges.get("g"), Some(&1.5));
        drop(seen);
        coordinator.shutdown().unwrap();
    }

    #[test]
    fn flush_failure_reaches_the_writer() {
        let sink = Arc::new(RecordingSink::default());
        sink.fail.store(true, Ordering::SeqCst);
        let coordinator =
            Coordinator::start(sink.clone(), Duration::from_millis(10)).unwrap();

        let err = coordinator
            .submit(&updates(&[Metric::counter("c", 1)]))
            .unwrap_err();
        assert!(err.is_backend());

        sink.fail.store(false, Ordering::SeqCst);
        coordinator
            .submit(&updates(&[Metric::counter("c", 1)]))
            .unwrap();
        let stats = coordinator.shutdown().unwrap();
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.counter_rows, 1);
    }

    /// Panics on its first flush only.
    #[derive(Default)]
    struct PanicOnceSink {
        panicked: AtomicBool,
    }

    impl FlushSink for PanicOnceSink {
        fn flush(&self, _delta: &PendingDelta) -> Result<(), StorageError> {
            if !self.panicked.swap(true, Ordering::SeqCst) {
                panic!("sink exploded");
            }
            Ok(())
        }
    }

    #[test]
    fn panicking_sink_fails_the_window_and_keeps_the_worker() {
        let sink = Arc::new(PanicOnceSink::default());
        let coordinator = Coordinator::start(sink, Duration::from_millis(10)).unwrap();

        let err = coordinator
            .submit(&updates(&[Metric::counter("c", 1)]))
            .unwrap_err();
        assert!(matches!(err, StorageError::Io { .. }));

        coordinator
            .submit(&updates(&[Metric::counter("c", 1)]))
            .unwrap();
        let stats = coordinator.shutdown().unwrap();
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.counter_rows, 1);
    }

    #[test]
    fn overflowing_submit_is_refused_before_queueing() {
        let sink = Arc::new(RecordingSink::default());
        let coordinator =
            Coordinator::start(sink.clone(), Duration::from_millis(10)).unwrap();

        let err = coordinator
            .submit(&updates(&[
                Metric::gauge("g", 1.0),
                Metric::counter("c", i64::MAX),
                Metric::counter("c", 1),
            ]))
            .unwrap_err();
        assert!(matches!(err, StorageError::Validation { .. }));

        coordinator.flush_now().unwrap();
        assert!(sink.seen.lock().unwrap().is_empty());
        coordinator.shutdown().unwrap();
    }

    #[test]
    fn flush_now_does_not_wait_for_the_timer() {
        let sink = Arc::new(RecordingSink::default());
        let coordinator = Coordinator::start(sink.clone(), Duration::from_secs(3600)).unwrap();
        let started = std::time::Instant::now();
        coordinator.flush_now().unwrap();
        assert!(started.elapsed() < Duration::from_secs(60));
        coordinator.shutdown().unwrap();
    }

    #[test]
    fn writers_after_shutdown_are_refused() {
        let sink = Arc::new(RecordingSink::default());
        let coordinator = Coordinator::start(sink, Duration::from_millis(10)).unwrap();
        coordinator.shutdown().unwrap();
        assert_eq!(
            coordinator.submit(&updates(&[Metric::counter("c", 1)])),
            Err(StorageError::Closed)
        );
        // second shutdown is a no-op
        assert_eq!(coordinator.shutdown().unwrap(), FlushStats::default());
    }

    #[test]
    fn zero_interval_is_rejected() {
        let sink = Arc::new(RecordingSink::default());
        assert!(matches!(
            Coordinator::start(sink, Duration::ZERO),
            Err(StorageError::Config { .. })
        ));
    }
}
