//! counters table queries. Writes add to the stored value inside the statement,
//! so concurrent writers never lose an increment.
//!
//! SQLite promotes an overflowing integer sum to REAL. The upsert only
//! updates while the sum stays an integer, so an overflowing write changes
//! no row and is reported as a validation error.

use rusqlite::types::ToSql;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tally_core::errors::StorageError;
use tally_core::types::collections::CounterMap;

use super::{placeholders, values_clause, CHUNK_ROWS};
use crate::connection::sqe;

const UPSERT_TAIL: &str = r#"ON CONFLICT ("Key") DO UPDATE SET "Value" = "counters"."Value" + excluded."Value" WHERE typeof("counters"."Value" + excluded."Value") = 'integer'"#;

fn overflow(key: &str, delta: i64) -> StorageError {
    StorageError::validation(format!("counter {key} overflows when adding {delta}"))
}

/// Add `delta` to one counter, creating it at `delta`. Returns the new total.
/// An overflowing delta leaves the stored total unchanged.
pub fn accumulate(conn: &Connection, key: &str, delta: i64) -> Result<i64, StorageError> {
    let sql = format!(
        r#"INSERT INTO "counters" ("Key", "Value") VALUES (?1, ?2) {UPSERT_TAIL} RETURNING "Value""#
    );
    conn.prepare_cached(&sql)
        .map_err(sqe)?
        .query_row(params![key, delta], |row| row.get(0))
        .optional()
        .map_err(sqe)?
        .ok_or_else(|| overflow(key, delta))
}

/// Add many deltas with multi-row statements. Returns rows written.
///
/// Keys must be distinct. If any total would overflow this fails after
/// writing part of the rows, so run it inside a transaction.
pub fn accumulate_many(conn: &Connection, rows: &[(&str, i64)]) -> Result<usize, StorageError> {
    let mut count = 0;
    for chunk in rows.chunks(CHUNK_ROWS) {
        let sql = format!(
            r#"INSERT INTO "counters" ("Key", "Value") VALUES {} {UPSERT_TAIL}"#,
            values_clause(chunk.len())
        );
        let mut bound: Vec<&dyn ToSql> = Vec::with_capacity(chunk.len() * 2);
        for (key, delta) in chunk {
            bound.push(key);
            bound.push(delta);
        }
        let changed = conn
            .prepare_cached(&sql)
            .map_err(sqe)?
            .execute(bound.as_slice())
            .map_err(sqe)?;
        if changed < chunk.len() {
            return Err(StorageError::validation(format!(
                "{} of {} counters in batch would overflow",
                chunk.len() - changed,
                chunk.len()
            )));
        }
        count += chunk.len();
    }
    Ok(count)
}

/// Select the given keys, or the whole table when `keys` is empty.
/// Absent keys are simply missing from the result.
pub fn select(conn: &Connection, keys: &[&str]) -> Result<CounterMap, StorageError> {
    let mut result = CounterMap::default();
    if keys.is_empty() {
        let mut stmt = conn
            .prepare_cached(r#"SELECT "Key", "Value" FROM "counters""#)
            .map_err(sqe)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(sqe)?;
        for row in rows {
            let (key, value) = row.map_err(sqe)?;
            result.insert(key, value);
        }
        return Ok(result);
    }

    for chunk in keys.chunks(CHUNK_ROWS * 2) {
        let sql = format!(
            r#"SELECT "Key", "Value" FROM "counters" WHERE "Key" IN ({})"#,
            placeholders(chunk.len())
        );
        let mut stmt = conn.prepare_cached(&sql).map_err(sqe)?;
        let rows = stmt
            .query_map(params_from_iter(chunk.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(sqe)?;
        for row in rows {
            let (key, value) = row.map_err(sqe)?;
            result.insert(key, value);
        }
    }
    Ok(result)
}
