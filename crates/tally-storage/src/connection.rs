//! `DatabaseManager`: one serialized write connection plus a read pool.
//!
//! File-backed databases run in WAL mode so readers never block the writer.
//! In-memory databases have no read pool: every `:memory:` connection is a
//! separate database, so reads go through the write connection.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use tally_core::constants::IN_MEMORY_DSN;
use tally_core::errors::StorageError;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct DatabaseManager {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    next_reader: AtomicUsize,
    path: Option<PathBuf>,
    closed: AtomicBool,
}

impl DatabaseManager {
    /// Open (creating if needed) a file-backed database with `read_pool_size` readers.
    pub fn open(path: &Path, read_pool_size: usize) -> Result<Self, StorageError> {
        let writer = Connection::open(path).map_err(sqe)?;
        apply_pragmas(&writer)?;
        writer
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(sqe)?;

        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_NO_MUTEX
            | OpenFlags::SQLITE_OPEN_URI;
        let mut readers = Vec::with_capacity(read_pool_size);
        for _ in 0..read_pool_size {
            let conn = Connection::open_with_flags(path, flags).map_err(sqe)?;
            conn.busy_timeout(BUSY_TIMEOUT).map_err(sqe)?;
            readers.push(Mutex::new(conn));
        }

        tracing::debug!(path = %path.display(), readers = read_pool_size, "opened sqlite database");
        Ok(Self {
            writer: Mutex::new(writer),
            readers,
            next_reader: AtomicUsize::new(0),
            path: Some(path.to_path_buf()),
            closed: AtomicBool::new(false),
        })
    }

    /// Open an in-process database (for testing).
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let writer = Connection::open_in_memory().map_err(sqe)?;
        apply_pragmas(&writer)?;
        Ok(Self {
            writer: Mutex::new(writer),
            readers: Vec::new(),
            next_reader: AtomicUsize::new(0),
            path: None,
            closed: AtomicBool::new(false),
        })
    }

    /// Open from a connection string: `:memory:` or a database file path.
    pub fn from_dsn(dsn: &str, read_pool_size: usize) -> Result<Self, StorageError> {
        if dsn == IN_MEMORY_DSN {
            Self::open_in_memory()
        } else {
            Self::open(Path::new(dsn), read_pool_size)
        }
    }

    /// Database file path (None for in-memory).
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Run `f` on the write connection. Writes are serialized.
    pub fn with_writer<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError>,
    {
        self.check_open()?;
        let conn = lock(&self.writer);
        f(&conn)
    }

    /// Run `f` on a pooled read connection (round-robin).
    pub fn with_reader<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError>,
    {
        self.check_open()?;
        if self.readers.is_empty() {
            return f(&lock(&self.writer));
        }
        let idx = self.next_reader.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let conn = lock(&self.readers[idx]);
        f(&conn)
    }

    /// Checkpoint the WAL and refuse further work. Idempotent.
    pub fn close(&self) -> Result<(), StorageError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if self.path.is_some() {
            let conn = lock(&self.writer);
            conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
                .map_err(sqe)?;
        }
        tracing::debug!("sqlite database closed");
        Ok(())
    }

    fn check_open(&self) -> Result<(), StorageError> {
        if self.is_closed() {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }
}

fn apply_pragmas(conn: &Connection) -> Result<(), StorageError> {
    conn.busy_timeout(BUSY_TIMEOUT).map_err(sqe)?;
    conn.pragma_update(None, "synchronous", "NORMAL").map_err(sqe)?;
    Ok(())
}

/// Connections hold no invariants a panicking holder could break.
fn lock(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─── Helper: StorageError from rusqlite ─────────────────────────────────────

pub(crate) fn sqe(e: impl std::fmt::Display) -> StorageError {
    StorageError::SqliteError {
        message: e.to_string(),
    }
}
