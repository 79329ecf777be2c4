//! Hash map aliases used across the workspace.

pub use rustc_hash::{FxHashMap, FxHashSet};

/// Gauge name → last written value.
pub type GaugeMap = FxHashMap<String, f64>;

/// Counter name → accumulated total (or pending delta).
pub type CounterMap = FxHashMap<String, i64>;
