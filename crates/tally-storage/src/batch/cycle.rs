//! One flush window's completion token.
//!
//! A writer keeps the `Arc<FlushCycle>` it joined; the flush task publishes
//! the outcome on exactly that cycle. Cycles are never reused, so a late
//! waker can only ever see its own window's result.

use std::sync::{Condvar, Mutex, PoisonError};

use tally_core::errors::StorageError;

#[derive(Debug)]
pub(crate) struct FlushCycle {
    generation: u64,
    outcome: Mutex<Option<Result<(), StorageError>>>,
    done: Condvar,
}

impl FlushCycle {
    pub(crate) fn new(generation: u64) -> Self {
        Self {
            generation,
            outcome: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Publish the outcome and release every waiter.
    pub(crate) fn complete(&self, outcome: Result<(), StorageError>) {
        let mut slot = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(outcome);
        self.done.notify_all();
    }

    /// Block until `complete` has run, then return its outcome.
    pub(crate) fn wait(&self) -> Result<(), StorageError> {
        let mut slot = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
            slot = self.done.wait(slot).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn every_waiter_sees_the_same_outcome() {
        let cycle = Arc::new(FlushCycle::new(1));
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let cycle = Arc::clone(&cycle);
                thread::spawn(move || cycle.wait())
            })
            .collect();
        cycle.complete(Err(StorageError::Closed));
        for w in waiters {
            assert_eq!(w.join().unwrap(), Err(StorageError::Closed));
        }
    }

    #[test]
    fn wait_after_complete_returns_immediately() {
        let cycle = FlushCycle::new(7);
        cycle.complete(Ok(()));
        assert_eq!(cycle.wait(), Ok(()));
        assert_eq!(cycle.generation(), 7);
    }
}
