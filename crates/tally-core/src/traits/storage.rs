//! Storage trait module: re-exports all storage contract traits.
//!
//! These traits define the contract between transports and the storage
//! backends. The SQLite and snapshot-file implementations live in
//! `tally-storage`. All traits are object-safe, `Send + Sync`, and have
//! blanket `Arc<T>` impls.

pub mod metric_store;
pub mod metric_table;
pub mod test_helpers;

pub use metric_store::MetricStore;
pub use metric_table::{ensure_present, MetricTable};
