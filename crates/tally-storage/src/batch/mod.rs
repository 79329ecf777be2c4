//! Write coalescing: pending tables, flush cycles and the coordinator
//! that flushes them into the SQL store on a timer.

pub mod coordinator;
mod cycle;
pub mod pending;

pub use coordinator::{Coordinator, FlushCommand, FlushSink, FlushStats};
pub use pending::{PendingDelta, PendingTables};
