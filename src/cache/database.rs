//! SQLite-backed origin cache.
//!
//! [`OriginCache`] owns the backing [`Store`] and a read/write guard held
//! for the whole of every call: lookups take it shared, mutations take it
//! exclusively. Each call runs under a [`Budget`] derived from the
//! caller's [`OpContext`] and the cache's default timeouts.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use rusqlite::types::{ToSql, Value};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior};

use super::context::{Budget, OpContext};
use super::entry::{dir_key, split_path, Entry};
use super::error::{CacheError, CacheResult, DataError};
use super::schema::ensure_schema;
use super::store::{classify, map_error, Store, StoreErrorKind};
use super::trace::{Tracer, TraceSink};
use crate::config::CacheConfig;

const UPSERT_SQL: &str = "INSERT INTO item_list \
     (parent_path, name, type, size, state, sha1, created_at, updated_at, info) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, ?8) \
     ON CONFLICT (parent_path, name) DO UPDATE SET \
     updated_at = MAX(excluded.updated_at, item_list.updated_at + 1), \
     sha1 = excluded.sha1, \
     size = excluded.size, \
     info = excluded.info";

const DELETE_SQL: &str = "DELETE FROM item_list WHERE parent_path = ?1 AND name = ?2";

const DELETE_ALL_SQL: &str = "DELETE FROM item_list";

const RENAME_SQL: &str = "UPDATE item_list SET parent_path = ?1, name = ?2 \
     WHERE parent_path = ?3 AND name = ?4";

const GET_SQL: &str = "SELECT parent_path, name, type, size, state, sha1, created_at, updated_at, info \
     FROM item_list WHERE parent_path = ?1 AND name = ?2";

const BATCH_SQL: &str = "SELECT rowid, parent_path, name, type, size, state, sha1, created_at, updated_at, info \
     FROM item_list WHERE rowid > ?1 ORDER BY rowid LIMIT ?2";

const LIST_DIR_SQL: &str = "SELECT parent_path, name, type, size, state, sha1, created_at, updated_at, info \
     FROM item_list WHERE parent_path = ?1 ORDER BY name";

const COUNT_SQL: &str = "SELECT count(*) FROM item_list";

/// A partial column update for [`OriginCache::modify`].
///
/// Keys are column names and are passed through to SQL unchecked, so an
/// unknown column fails in the store rather than here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields(BTreeMap<String, Value>);

impl Fields {
    /// An empty update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`Fields::insert`].
    #[must_use]
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    /// Set `column` to `value`, replacing any previous value.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(column.into(), value.into());
    }

    /// Whether `column` is part of the update.
    #[must_use]
    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    /// Number of columns updated.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the update is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(column, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl FromIterator<(String, Value)> for Fields {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Persistent cache of entry metadata observed from the origin.
pub struct OriginCache {
    store: Store,
    guard: RwLock<()>,
    op_timeout: Duration,
    scan_timeout: Duration,
    batch_size: usize,
}

impl std::fmt::Debug for OriginCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OriginCache")
            .field("store", &self.store)
            .field("op_timeout", &self.op_timeout)
            .field("scan_timeout", &self.scan_timeout)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl OriginCache {
    /// Open or create the cache in `dir`, tracing according to `config`.
    pub fn open(dir: &Path, config: &CacheConfig) -> CacheResult<Self> {
        let tracer = if config.trace {
            Tracer::log()
        } else {
            Tracer::disabled()
        };
        Self::open_with_tracer(dir, config, tracer)
    }

    /// Open or create the cache in `dir`, sending trace records to `sink`.
    pub fn open_with_sink(
        dir: &Path,
        config: &CacheConfig,
        sink: std::sync::Arc<dyn TraceSink>,
    ) -> CacheResult<Self> {
        Self::open_with_tracer(dir, config, Tracer::new(sink))
    }

    fn open_with_tracer(dir: &Path, config: &CacheConfig, tracer: Tracer) -> CacheResult<Self> {
        let store = Store::open(dir, config, tracer)?;
        {
            let conn = store.writer();
            ensure_schema(&conn, store.tracer())?;
        }

        Ok(Self {
            store,
            guard: RwLock::new(()),
            op_timeout: config.op_timeout(),
            scan_timeout: config.scan_timeout(),
            batch_size: config.batch_size.max(1),
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Release the backing file.
    pub fn close(self) -> CacheResult<()> {
        self.store.close()
    }

    fn tracer(&self) -> &Tracer {
        self.store.tracer()
    }

    fn shared(&self, budget: &Budget) -> CacheResult<RwLockReadGuard<'_, ()>> {
        budget.check()?;
        self.guard
            .try_read_for(budget.remaining())
            .ok_or_else(|| budget.timeout())
    }

    fn exclusive(&self, budget: &Budget) -> CacheResult<RwLockWriteGuard<'_, ()>> {
        budget.check()?;
        self.guard
            .try_write_for(budget.remaining())
            .ok_or_else(|| budget.timeout())
    }

    /// Run `f` on the writer connection while holding the guard exclusively.
    fn write<T>(
        &self,
        budget: &Budget,
        f: impl FnOnce(&mut Connection) -> CacheResult<T>,
    ) -> CacheResult<T> {
        let _guard = self.exclusive(budget)?;
        let mut conn = self.store.writer();
        self.store.with_budget(&mut conn, budget, f)
    }

    /// Run `f` on a pooled reader while holding the guard in shared mode.
    fn read<T>(
        &self,
        budget: &Budget,
        f: impl FnOnce(&mut Connection) -> CacheResult<T>,
    ) -> CacheResult<T> {
        let _guard = self.shared(budget)?;
        self.store
            .with_reader(|conn| self.store.with_budget(conn, budget, f))
    }

    /// Insert `entry`, or refresh an existing entry at the same path.
    ///
    /// On conflict only `updated_at`, `sha1`, `size` and `info` change.
    /// For objects the info payload is decoded before anything is written
    /// and its size and fingerprint are stored as the entry's size and
    /// content hash.
    pub fn upsert(&self, ctx: &OpContext, entry: &Entry) -> CacheResult<()> {
        let budget = ctx.bounded(self.op_timeout);

        let (size, content_hash, info) = match entry.decode_info() {
            Ok(Some(decoded)) => (decoded.size, decoded.fingerprint, entry.info.clone()),
            Ok(None) => (entry.size, entry.content_hash.clone(), None),
            Err(e) => {
                log::error!("Unmarshal info of item={} error = {}", entry.path(), e);
                return Err(e.into());
            }
        };
        let now = chrono::Utc::now().timestamp();

        self.write(&budget, |conn| {
            let args: [&dyn ToSql; 8] = [
                &entry.parent_path,
                &entry.name,
                &entry.entry_type,
                &size,
                &entry.state,
                &content_hash,
                &now,
                &info,
            ];
            self.tracer()
                .run(UPSERT_SQL, &args, || conn.execute(UPSERT_SQL, &args[..]))
                .map_err(|e| map_error(e, &budget))
        })
        .inspect_err(|e| log::error!("Create item={} error = {}", entry.path(), e))?;

        Ok(())
    }

    /// Delete the entry at `path`. Deleting a missing path is not an error.
    pub fn delete(&self, ctx: &OpContext, path: &str) -> CacheResult<()> {
        let budget = ctx.bounded(self.op_timeout);
        let (parent, name) = split_path(path);

        self.write(&budget, |conn| {
            let args: [&dyn ToSql; 2] = [&parent, &name];
            self.tracer()
                .run(DELETE_SQL, &args, || conn.execute(DELETE_SQL, &args[..]))
                .map_err(|e| map_error(e, &budget))
        })
        .inspect_err(|e| log::error!("Delete item={} error = {}", path, e))?;

        Ok(())
    }

    /// Apply a partial column update to the entry at `path`.
    ///
    /// `updated_at` is refreshed unless `fields` sets it explicitly. An
    /// empty update writes nothing.
    pub fn modify(&self, ctx: &OpContext, path: &str, fields: &Fields) -> CacheResult<()> {
        if fields.is_empty() {
            return Ok(());
        }

        let budget = ctx.bounded(self.op_timeout);
        let (parent, name) = split_path(path);
        let now = Value::Integer(chrono::Utc::now().timestamp());

        let mut assignments = Vec::with_capacity(fields.len() + 1);
        let mut values: Vec<&Value> = Vec::with_capacity(fields.len() + 1);
        for (column, value) in fields.iter() {
            values.push(value);
            assignments.push(format!("{} = ?{}", quote_ident(column), values.len()));
        }
        if !fields.contains("updated_at") {
            values.push(&now);
            assignments.push(format!("updated_at = MAX(?{}, updated_at + 1)", values.len()));
        }
        let sql = format!(
            "UPDATE item_list SET {} WHERE parent_path = ?{} AND name = ?{}",
            assignments.join(", "),
            values.len() + 1,
            values.len() + 2
        );

        let mut args: Vec<&dyn ToSql> = values.iter().map(|v| *v as &dyn ToSql).collect();
        args.push(&parent);
        args.push(&name);

        self.write(&budget, |conn| {
            self.tracer()
                .run(&sql, &args, || conn.execute(&sql, args.as_slice()))
                .map_err(|e| map_error(e, &budget))
        })
        .inspect_err(|e| log::error!("Update item={} error = {}", path, e))?;

        Ok(())
    }

    /// Move the entry at `old_path` to `new_path`.
    ///
    /// If an entry already exists at `new_path` it is discarded and the
    /// move is retried, both steps in one transaction. `updated_at` is
    /// left as it was.
    pub fn rename(&self, ctx: &OpContext, old_path: &str, new_path: &str) -> CacheResult<()> {
        let budget = ctx.bounded(self.op_timeout);
        let (old_parent, old_name) = split_path(old_path);
        let (new_parent, new_name) = split_path(new_path);
        let rename_args: [&dyn ToSql; 4] = [&new_parent, &new_name, &old_parent, &old_name];
        let delete_args: [&dyn ToSql; 2] = [&new_parent, &new_name];

        self.write(&budget, |conn| {
            let direct = self
                .tracer()
                .run(RENAME_SQL, &rename_args, || conn.execute(RENAME_SQL, &rename_args[..]));

            match direct {
                Ok(_) => Ok(()),
                Err(e) if classify(&e) == StoreErrorKind::UniqueViolation => {
                    log::debug!(
                        "Rename {} => {} hit an existing entry, replacing it",
                        old_path,
                        new_path
                    );
                    let tx = conn
                        .transaction_with_behavior(TransactionBehavior::Immediate)
                        .map_err(|e| map_error(e, &budget))?;
                    self.tracer()
                        .run(DELETE_SQL, &delete_args, || tx.execute(DELETE_SQL, &delete_args[..]))
                        .map_err(|e| map_error(e, &budget))?;
                    self.tracer()
                        .run(RENAME_SQL, &rename_args, || tx.execute(RENAME_SQL, &rename_args[..]))
                        .map_err(|e| map_error(e, &budget))?;
                    tx.commit().map_err(|e| map_error(e, &budget))
                }
                Err(e) => Err(map_error(e, &budget)),
            }
        })
        .inspect_err(|e| log::error!("Update item {} => {} error = {}", old_path, new_path, e))
    }

    /// The entry at `path`, or [`CacheError::NotFound`].
    pub fn get(&self, ctx: &OpContext, path: &str) -> CacheResult<Entry> {
        let budget = ctx.bounded(self.op_timeout);
        let (parent, name) = split_path(path);

        let found = self
            .read(&budget, |conn| {
                let args: [&dyn ToSql; 2] = [&parent, &name];
                self.tracer()
                    .run(GET_SQL, &args, || {
                        conn.query_row(GET_SQL, &args[..], |row| entry_from_row(row, 0))
                            .optional()
                    })
                    .map_err(|e| map_row_error(e, &budget))
            })
            .inspect_err(|e| log::error!("Get item={} error = {}", path, e))?;

        found.ok_or_else(|| CacheError::NotFound(path.to_string()))
    }

    /// Every entry, in insertion order.
    ///
    /// Rows are fetched in batches inside one read transaction, so the
    /// result is the same as one unbounded read.
    pub fn get_all(&self, ctx: &OpContext) -> CacheResult<Vec<Entry>> {
        let budget = ctx.bounded(self.scan_timeout);
        let batch_size = i64::try_from(self.batch_size).unwrap_or(i64::MAX);

        self.read(&budget, |conn| {
            let tx = conn.transaction().map_err(|e| map_error(e, &budget))?;
            let mut all = Vec::new();
            let mut last_rowid = 0i64;

            loop {
                let args: [&dyn ToSql; 2] = [&last_rowid, &batch_size];
                let batch: Vec<(i64, Entry)> = self
                    .tracer()
                    .run(BATCH_SQL, &args, || {
                        let mut stmt = tx.prepare_cached(BATCH_SQL)?;
                        let rows = stmt.query_map(&args[..], |row| {
                            Ok((row.get::<_, i64>(0)?, entry_from_row(row, 1)?))
                        })?;
                        rows.collect()
                    })
                    .map_err(|e| map_row_error(e, &budget))?;

                let fetched = batch.len();
                if let Some((rowid, _)) = batch.last() {
                    last_rowid = *rowid;
                }
                all.extend(batch.into_iter().map(|(_, entry)| entry));
                if fetched < self.batch_size {
                    break;
                }
            }

            tx.commit().map_err(|e| map_error(e, &budget))?;
            Ok(all)
        })
        .inspect_err(|e| log::error!("Get all items error = {}", e))
    }

    /// Entries whose parent is `dir`, ordered by name.
    pub fn list_dir(&self, ctx: &OpContext, dir: &str) -> CacheResult<Vec<Entry>> {
        let budget = ctx.bounded(self.scan_timeout);
        let parent = dir_key(dir);

        self.read(&budget, |conn| {
            let args: [&dyn ToSql; 1] = [&parent];
            self.tracer()
                .run(LIST_DIR_SQL, &args, || {
                    let mut stmt = conn.prepare_cached(LIST_DIR_SQL)?;
                    let rows = stmt.query_map(&args[..], |row| entry_from_row(row, 0))?;
                    rows.collect()
                })
                .map_err(|e| map_row_error(e, &budget))
        })
        .inspect_err(|e| log::error!("List dir={} error = {}", dir, e))
    }

    /// Number of entries.
    pub fn count(&self, ctx: &OpContext) -> CacheResult<u64> {
        let budget = ctx.bounded(self.scan_timeout);

        let count = self.read(&budget, |conn| {
            self.tracer()
                .run(COUNT_SQL, &[], || {
                    conn.query_row(COUNT_SQL, [], |row| row.get::<_, i64>(0)).map(Some)
                })
                .map_err(|e| map_error(e, &budget))
        })
        .inspect_err(|e| log::error!("Count items error = {}", e))?;

        Ok(count.map_or(0, |n| u64::try_from(n).unwrap_or(0)))
    }

    /// Remove every entry. Runs under the single-row budget.
    pub fn delete_all(&self, ctx: &OpContext) -> CacheResult<()> {
        let budget = ctx.bounded(self.op_timeout);

        self.write(&budget, |conn| {
            self.tracer()
                .run(DELETE_ALL_SQL, &[], || conn.execute(DELETE_ALL_SQL, []))
                .map_err(|e| map_error(e, &budget))
        })
        .inspect_err(|e| log::error!("Delete all items error = {}", e))?;

        Ok(())
    }
}

fn entry_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Entry> {
    Ok(Entry {
        parent_path: row.get(offset)?,
        name: row.get(offset + 1)?,
        entry_type: row.get(offset + 2)?,
        size: row.get(offset + 3)?,
        state: row.get(offset + 4)?,
        content_hash: row.get(offset + 5)?,
        created_at: row.get(offset + 6)?,
        updated_at: row.get(offset + 7)?,
        info: row.get(offset + 8)?,
    })
}

/// Like [`map_error`], but surfaces a bad `type` column as a data error.
fn map_row_error(err: rusqlite::Error, budget: &Budget) -> CacheError {
    if let rusqlite::Error::FromSqlConversionFailure(_, _, source) = &err {
        if let Some(DataError::InvalidEntryType(raw)) = source.downcast_ref::<DataError>() {
            return DataError::InvalidEntryType(*raw).into();
        }
    }
    map_error(err, budget)
}

fn quote_ident(column: &str) -> String {
    format!("\"{}\"", column.replace('"', "\"\""))
}
