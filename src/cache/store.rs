//! SQLite backing store.
//!
//! The store owns one writer connection and a small pool of read-only
//! connections. Writes and reads are ordered by the guard in
//! [`crate::cache::OriginCache`]; the pool only exists so readers holding
//! the guard in shared mode do not serialize on a single connection.
//!
//! SQLite's own tracing and profiling callbacks are never installed; the
//! only record of executed statements comes from [`Tracer`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use rusqlite::{ffi, params, Connection, ErrorCode, OpenFlags};

use super::context::Budget;
use super::error::{CacheError, CacheResult};
use super::trace::Tracer;
use crate::config::CacheConfig;

/// Name of the backing file inside the cache directory.
pub const DATABASE_FILE_NAME: &str = "origin_cache.db";

/// Number of SQLite VM steps between deadline checks.
const PROGRESS_OPS: std::os::raw::c_int = 1000;

/// A busy wait that ends this close to the deadline counts as a timeout;
/// SQLite's busy timeout has millisecond granularity.
const BUSY_GRACE: Duration = Duration::from_millis(50);

/// Structured classification of SQLite failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// A schema object being created is already present.
    AlreadyExists,
    /// A UNIQUE or PRIMARY KEY constraint rejected the write.
    UniqueViolation,
    /// Some other constraint rejected the write.
    Constraint,
    /// The statement was interrupted by the progress handler.
    Interrupted,
    /// The database was busy or locked past the busy timeout.
    Busy,
    /// The file is not a SQLite database or is corrupt.
    NotADatabase,
    /// A single-row query found nothing.
    NoRows,
    /// Anything else.
    Other,
}

/// Classify an error by its SQLite result code.
#[must_use]
pub fn classify(err: &rusqlite::Error) -> StoreErrorKind {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => match e.code {
            ErrorCode::ConstraintViolation
                if e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                StoreErrorKind::UniqueViolation
            }
            ErrorCode::ConstraintViolation => StoreErrorKind::Constraint,
            ErrorCode::OperationInterrupted => StoreErrorKind::Interrupted,
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => StoreErrorKind::Busy,
            ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt => StoreErrorKind::NotADatabase,
            _ => StoreErrorKind::Other,
        },
        rusqlite::Error::QueryReturnedNoRows => StoreErrorKind::NoRows,
        _ => StoreErrorKind::Other,
    }
}

/// Classify the failure of a `CREATE` statement for schema object `name`.
///
/// SQLite reports an existing object with the generic error code, so the
/// condition is recognised by looking the object up in `sqlite_master`.
pub fn classify_create(
    conn: &Connection,
    err: &rusqlite::Error,
    object_type: &str,
    name: &str,
) -> StoreErrorKind {
    let kind = classify(err);
    if kind != StoreErrorKind::Other {
        return kind;
    }
    match schema_object_exists(conn, object_type, name) {
        Ok(true) => StoreErrorKind::AlreadyExists,
        _ => kind,
    }
}

fn schema_object_exists(conn: &Connection, object_type: &str, name: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = ?1 AND name = ?2)",
        params![object_type, name],
        |row| row.get(0),
    )
}

/// Convert an error from a repository statement into a [`CacheError`].
#[must_use]
pub fn map_error(err: rusqlite::Error, budget: &Budget) -> CacheError {
    match classify(&err) {
        StoreErrorKind::Interrupted => budget.interrupted(),
        StoreErrorKind::Busy if budget.remaining() < BUSY_GRACE => budget.timeout(),
        StoreErrorKind::UniqueViolation | StoreErrorKind::Constraint => {
            CacheError::ConstraintViolation(err)
        }
        _ => CacheError::StoreUnavailable(err),
    }
}

/// Handle to the backing file.
pub struct Store {
    path: PathBuf,
    writer: Mutex<Connection>,
    readers: Mutex<Vec<Connection>>,
    max_idle_readers: usize,
    busy_timeout: Duration,
    tracer: Tracer,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("idle_readers", &self.readers.lock().len())
            .field("tracer", &self.tracer)
            .finish()
    }
}

impl Store {
    /// Open or create the backing file in `dir`.
    pub fn open(dir: &Path, config: &CacheConfig, tracer: Tracer) -> CacheResult<Self> {
        fs::create_dir_all(dir).map_err(|source| CacheError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let path = dir.join(DATABASE_FILE_NAME);
        let busy_timeout = config.busy_timeout();

        let writer = match open_writer(&path, busy_timeout) {
            Ok(conn) => conn,
            Err(e) if config.recreate_if_corrupt && classify(&e) == StoreErrorKind::NotADatabase => {
                log::warn!(
                    "Cache database {} is unusable ({}), recreating it",
                    path.display(),
                    e
                );
                remove_database_files(&path)?;
                open_writer(&path, busy_timeout).map_err(|source| {
                    log::error!("Failed to recreate cache database {}: {}", path.display(), source);
                    CacheError::OpenFailed {
                        path: path.clone(),
                        source,
                    }
                })?
            }
            Err(source) => {
                log::error!("Failed to open cache database {}: {}", path.display(), source);
                return Err(CacheError::OpenFailed { path, source });
            }
        };

        log::debug!("Opened cache database {}", path.display());

        Ok(Self {
            path,
            writer: Mutex::new(writer),
            readers: Mutex::new(Vec::new()),
            max_idle_readers: config.max_idle_readers,
            busy_timeout,
            tracer,
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The statement tracer.
    #[must_use]
    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    /// The writer connection.
    pub(crate) fn writer(&self) -> MutexGuard<'_, Connection> {
        self.writer.lock()
    }

    /// Run `f` on a read-only connection from the pool, opening one if
    /// the pool is empty. The connection goes back to the pool afterwards
    /// unless the pool is already full.
    pub(crate) fn with_reader<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> CacheResult<T>,
    ) -> CacheResult<T> {
        let pooled = self.readers.lock().pop();
        let mut conn = match pooled {
            Some(conn) => conn,
            None => open_reader(&self.path, self.busy_timeout)
                .map_err(CacheError::StoreUnavailable)?,
        };

        let result = f(&mut conn);

        let mut idle = self.readers.lock();
        if idle.len() < self.max_idle_readers {
            idle.push(conn);
        }
        result
    }

    /// Run `f` on `conn` with the budget's deadline enforced.
    ///
    /// The busy timeout is capped at the time remaining and a progress
    /// handler interrupts the running statement once the deadline passes
    /// or the cancellation flag is set.
    pub(crate) fn with_budget<T>(
        &self,
        conn: &mut Connection,
        budget: &Budget,
        f: impl FnOnce(&mut Connection) -> CacheResult<T>,
    ) -> CacheResult<T> {
        budget.check()?;
        conn.busy_timeout(budget.remaining().min(self.busy_timeout))
            .map_err(CacheError::StoreUnavailable)?;
        conn.progress_handler(PROGRESS_OPS, Some(budget.interrupter()));
        let result = f(conn);
        conn.progress_handler(0, None::<fn() -> bool>);
        result
    }

    /// Close every connection, releasing the file.
    pub fn close(self) -> CacheResult<()> {
        for conn in self.readers.into_inner() {
            conn.close().map_err(|(_, e)| CacheError::StoreUnavailable(e))?;
        }
        self.writer
            .into_inner()
            .close()
            .map_err(|(_, e)| CacheError::StoreUnavailable(e))?;
        log::debug!("Closed cache database {}", self.path.display());
        Ok(())
    }
}

fn open_writer(path: &Path, busy_timeout: Duration) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(busy_timeout)?;
    // Fails with SQLITE_NOTADB on a file that is not a database.
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))?;
    Ok(conn)
}

fn open_reader(path: &Path, busy_timeout: Duration) -> rusqlite::Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(busy_timeout)?;
    Ok(conn)
}

fn remove_database_files(path: &Path) -> CacheResult<()> {
    let mut candidates = vec![path.to_path_buf()];
    for suffix in ["-wal", "-shm"] {
        let mut name = path.as_os_str().to_owned();
        name.push(suffix);
        candidates.push(PathBuf::from(name));
    }

    for file in candidates {
        match fs::remove_file(&file) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(CacheError::Io { path: file, source }),
        }
    }
    Ok(())
}
