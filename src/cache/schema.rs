//! Entry table and its unique index.

use rusqlite::Connection;

use super::error::{CacheError, CacheResult};
use super::store::{classify_create, StoreErrorKind};
use super::trace::Tracer;

/// Name of the entry table.
pub const TABLE_NAME: &str = "item_list";

/// Name of the unique index over `(parent_path, name)`.
pub const UNIQUE_INDEX_NAME: &str = "idx_u_item";

const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS item_list (
    parent_path TEXT    NOT NULL DEFAULT '',
    name        TEXT    NOT NULL DEFAULT '',
    type        INTEGER NOT NULL DEFAULT 0,
    size        INTEGER NOT NULL DEFAULT 0,
    state       INTEGER NOT NULL DEFAULT 0,
    sha1        TEXT    NOT NULL DEFAULT '',
    created_at  INTEGER NOT NULL DEFAULT 0,
    updated_at  INTEGER NOT NULL DEFAULT 0,
    info        BLOB    NULL
)";

const CREATE_INDEX_SQL: &str = "CREATE UNIQUE INDEX idx_u_item ON item_list (parent_path, name)";

/// Create the entry table and its unique index if they are missing.
///
/// Either statement failing because its object already exists counts as
/// success; any other failure is a [`CacheError::Schema`].
pub fn ensure_schema(conn: &Connection, tracer: &Tracer) -> CacheResult<()> {
    create(conn, tracer, CREATE_TABLE_SQL, "table", TABLE_NAME)?;
    create(conn, tracer, CREATE_INDEX_SQL, "index", UNIQUE_INDEX_NAME)?;
    Ok(())
}

fn create(
    conn: &Connection,
    tracer: &Tracer,
    sql: &str,
    object_type: &str,
    name: &str,
) -> CacheResult<()> {
    match tracer.run(sql, &[], || conn.execute(sql, [])) {
        Ok(_) => Ok(()),
        Err(e) => match classify_create(conn, &e, object_type, name) {
            StoreErrorKind::AlreadyExists => {
                log::debug!("{} {} already exists", object_type, name);
                Ok(())
            }
            _ => {
                log::error!("Create {} {} error = {}", object_type, name, e);
                Err(CacheError::Schema(e))
            }
        },
    }
}
