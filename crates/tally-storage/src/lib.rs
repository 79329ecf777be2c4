//! # tally-storage
//!
//! Storage engine for the Tally metrics backend.
//! SQLite store with atomic upserts, JSON snapshot file store,
//! write-coalescing coordinator, and the facade that picks one of them.

pub mod batch;
pub mod cached;
pub mod connection;
pub mod engine;
pub mod facade;
pub mod file;
pub mod queries;
pub mod snapshot;
pub mod tables;

pub use batch::{Coordinator, FlushSink, FlushStats, PendingDelta};
pub use cached::CoalescingStore;
pub use connection::DatabaseManager;
pub use engine::SqlStore;
pub use facade::{BackendKind, Storage};
pub use file::FileStore;
pub use snapshot::SnapshotWorker;
