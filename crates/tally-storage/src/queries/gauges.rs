//! gauges table queries. Writes overwrite.

use rusqlite::types::ToSql;
use rusqlite::{params, params_from_iter, Connection};
use tally_core::errors::StorageError;
use tally_core::types::collections::GaugeMap;

use super::{placeholders, values_clause, CHUNK_ROWS};
use crate::connection::sqe;

const UPSERT_TAIL: &str = r#"ON CONFLICT ("Key") DO UPDATE SET "Value" = excluded."Value""#;

/// Insert or overwrite one gauge.
pub fn upsert(conn: &Connection, key: &str, value: f64) -> Result<(), StorageError> {
    let sql = format!(r#"INSERT INTO "gauges" ("Key", "Value") VALUES (?1, ?2) {UPSERT_TAIL}"#);
    conn.prepare_cached(&sql)
        .map_err(sqe)?
        .execute(params![key, value])
        .map_err(sqe)?;
    Ok(())
}

/// Insert or overwrite many gauges with multi-row statements. Returns rows written.
pub fn upsert_many(conn: &Connection, rows: &[(&str, f64)]) -> Result<usize, StorageError> {
    let mut count = 0;
    for chunk in rows.chunks(CHUNK_ROWS) {
        let sql = format!(
            r#"INSERT INTO "gauges" ("Key", "Value") VALUES {} {UPSERT_TAIL}"#,
            values_clause(chunk.len())
        );
        let mut bound: Vec<&dyn ToSql> = Vec::with_capacity(chunk.len() * 2);
        for (key, value) in chunk {
            bound.push(key);
            bound.push(value);
        }
        conn.prepare_cached(&sql)
            .map_err(sqe)?
            .execute(bound.as_slice())
            .map_err(sqe)?;
        count += chunk.len();
    }
    Ok(count)
}

/// Select the given keys, or the whole table when `keys` is empty.
/// Absent keys are simply missing from the result.
pub fn select(conn: &Connection, keys: &[&str]) -> Result<GaugeMap, StorageError> {
    let mut result = GaugeMap::default();
    if keys.is_empty() {
        let mut stmt = conn
            .prepare_cached(r#"SELECT "Key", "Value" FROM "gauges""#)
            .map_err(sqe)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)))
            .map_err(sqe)?;
        for row in rows {
            let (key, value) = row.map_err(sqe)?;
            result.insert(key, value);
        }
        return Ok(result);
    }

    for chunk in keys.chunks(CHUNK_ROWS * 2) {
        let sql = format!(
            r#"SELECT "Key", "Value" FROM "gauges" WHERE "Key" IN ({})"#,
            placeholders(chunk.len())
        );
        let mut stmt = conn.prepare_cached(&sql).map_err(sqe)?;
        let rows = stmt
            .query_map(params_from_iter(chunk.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })
            .map_err(sqe)?;
        for row in rows {
            let (key, value) = row.map_err(sqe)?;
            result.insert(key, value);
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::schema::{SchemaGuard, Table};

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        SchemaGuard::new().ensure(&conn, Table::Gauges).unwrap();
        conn
    }

    #[test]
    fn upsert_overwrites() {
        let conn = conn();
        upsert(&conn, "g1", 1.0).unwrap();
        upsert(&conn, "g1", 2.0).unwrap();
        assert_eq!(select(&conn, &["g1"]).unwrap().get("g1"), Some(&2.0));
    }

    #[test]
    fn upsert_many_spans_chunks() {
        let conn = conn();
        let names: Vec<String> = (0..CHUNK_ROWS * 2 + 7).map(|i| format!("g{i}")).collect();
        let rows: Vec<(&str, f64)> = names.iter().map(|n| (n.as_str(), 0.5)).collect();
        assert_eq!(upsert_many(&conn, &rows).unwrap(), rows.len());
        assert_eq!(select(&conn, &[]).unwrap().len(), rows.len());
    }

    #[test]
    fn select_skips_absent_keys() {
        let conn = conn();
        upsert(&conn, "present", 3.0).unwrap();
        let found = select(&conn, &["present", "absent"]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found.get("present"), Some(&3.0));
    }
}
