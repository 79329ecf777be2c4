//! Workspace-wide constants.

/// Wire tag for gauge metrics.
pub const GAUGE_TYPE: &str = "gauge";

/// Wire tag for counter metrics.
pub const COUNTER_TYPE: &str = "counter";

/// Default location of the JSON snapshot written by the file-backed store.
pub const DEFAULT_STORE_FILE: &str = "/tmp/metrics-db.json";

/// Default snapshot interval in seconds. 0 means dump after every write.
pub const DEFAULT_STORE_INTERVAL_SECS: u64 = 300;

/// Default number of read connections kept by the SQLite store.
pub const DEFAULT_READ_POOL_SIZE: usize = 4;

/// Upper bound for a liveness check, independent of any caller deadline.
pub const PING_TIMEOUT_MS: u64 = 250;

/// In-process SQLite database DSN.
pub const IN_MEMORY_DSN: &str = ":memory:";

/// Environment variable holding the tracing filter directives.
pub const LOG_ENV_VAR: &str = "TALLY_LOG";
