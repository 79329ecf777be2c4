//! # tally-core
//!
//! Foundation crate for the Tally metrics backend.
//! Defines the metric model, the storage contract traits, errors, config,
//! tracing bootstrap and constants. Every other crate in the workspace depends on this.

pub mod config;
pub mod constants;
pub mod errors;
pub mod tracing;
pub mod traits;
pub mod types;

// Re-export the most commonly used types at the crate root.
pub use config::{StorageConfig, TallyConfig};
pub use errors::error_code::TallyErrorCode;
pub use errors::StorageError;
pub use traits::storage::{MetricStore, MetricTable};
pub use types::collections::{CounterMap, FxHashMap, GaugeMap};
pub use types::metric::{Metric, MetricBatch, MetricKind, MetricUpdate, Sample};
