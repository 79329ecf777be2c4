//! SQL for the `gauges` and `counters` tables.
//!
//! Every function takes `&Connection`. A `rusqlite::Transaction` derefs to
//! a connection, so the same functions run standalone or inside a batch
//! transaction.

pub mod counters;
pub mod gauges;
pub mod schema;

/// Rows per multi-row statement; keeps bound parameters well under SQLite's limit.
pub const CHUNK_ROWS: usize = 500;

/// `(?1,?2),(?3,?4),...` for `rows` two-column rows.
pub(crate) fn values_clause(rows: usize) -> String {
    (0..rows)
        .map(|i| format!("(?{},?{})", i * 2 + 1, i * 2 + 2))
        .collect::<Vec<_>>()
        .join(",")
}

/// `?1,?2,...,?n`
pub(crate) fn placeholders(n: usize) -> String {
    (1..=n)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(",")
}
