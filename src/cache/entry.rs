//! Cache entry definitions.

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use super::error::{CacheResult, DataError};
use super::ranges::Ranges;

/// Separator used when splitting a path into its lookup key.
pub const PATH_SEPARATOR: char = '/';

/// Kind of filesystem entry.
///
/// Stored as an integer: directories are `0`, objects (files) are `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    /// A directory.
    Directory,
    /// A regular object (file).
    Object,
}

impl EntryType {
    /// Integer value written to the `type` column.
    #[must_use]
    pub fn as_i64(self) -> i64 {
        match self {
            EntryType::Directory => 0,
            EntryType::Object => 1,
        }
    }

    /// Parse the integer value read from the `type` column.
    pub fn from_i64(value: i64) -> Result<Self, DataError> {
        match value {
            0 => Ok(EntryType::Directory),
            1 => Ok(EntryType::Object),
            other => Err(DataError::InvalidEntryType(other)),
        }
    }
}

impl ToSql for EntryType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_i64()))
    }
}

impl FromSql for EntryType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = i64::column_result(value)?;
        EntryType::from_i64(raw).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryType::Directory => write!(f, "dir"),
            EntryType::Object => write!(f, "object"),
        }
    }
}

/// Per-object payload stored in the `info` column.
///
/// Field names follow the JSON layout used by the host program's
/// content cache so both sides read the same blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Info {
    /// Last time the object was modified.
    #[serde(rename = "ModTime")]
    pub mod_time: DateTime<Utc>,
    /// Last time the object was accessed.
    #[serde(rename = "ATime")]
    pub atime: DateTime<Utc>,
    /// Size of the object; authoritative over [`Entry::size`].
    #[serde(rename = "Size")]
    pub size: i64,
    /// Which parts of the object are present locally.
    #[serde(rename = "Rs")]
    pub ranges: Ranges,
    /// Identity of the remote content.
    #[serde(rename = "Fingerprint")]
    pub fingerprint: String,
    /// Set when the local copy was modified relative to the origin.
    #[serde(rename = "Dirty")]
    pub dirty: bool,
}

impl Default for Info {
    fn default() -> Self {
        Self {
            mod_time: DateTime::<Utc>::UNIX_EPOCH,
            atime: DateTime::<Utc>::UNIX_EPOCH,
            size: 0,
            ranges: Ranges::new(),
            fingerprint: String::new(),
            dirty: false,
        }
    }
}

impl Info {
    /// Create an info payload for an object of `size` bytes.
    #[must_use]
    pub fn new(size: i64, fingerprint: impl Into<String>, mod_time: DateTime<Utc>) -> Self {
        Self {
            mod_time,
            atime: mod_time,
            size,
            ranges: Ranges::new(),
            fingerprint: fingerprint.into(),
            dirty: false,
        }
    }

    /// Decode an info blob.
    pub fn decode(bytes: &[u8]) -> Result<Self, DataError> {
        serde_json::from_slice(bytes).map_err(DataError::InvalidPayload)
    }

    /// Encode to the blob stored in the `info` column.
    pub fn encode(&self) -> Result<Vec<u8>, DataError> {
        serde_json::to_vec(self).map_err(DataError::InvalidPayload)
    }
}

/// One cached record describing a path's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Directory containing the entry, trailing separator retained.
    pub parent_path: String,
    /// Leaf name.
    pub name: String,
    /// Entry kind.
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    /// Byte size.
    pub size: i64,
    /// Caller-defined status code.
    pub state: i32,
    /// Content fingerprint, objects only. Stored in the `sha1` column.
    #[serde(rename = "sha1")]
    pub content_hash: String,
    /// Unix seconds of the first insert.
    pub created_at: i64,
    /// Unix seconds of the last successful update.
    pub updated_at: i64,
    /// Serialized [`Info`], objects only.
    pub info: Option<Vec<u8>>,
}

impl Entry {
    /// Build an object entry for `path` from its info payload.
    pub fn object(path: &str, info: &Info) -> CacheResult<Self> {
        let (parent_path, name) = split_path(path);
        Ok(Self {
            parent_path: parent_path.to_string(),
            name: name.to_string(),
            entry_type: EntryType::Object,
            size: info.size,
            state: 0,
            content_hash: info.fingerprint.clone(),
            created_at: 0,
            updated_at: 0,
            info: Some(info.encode()?),
        })
    }

    /// Build a directory entry for `path`.
    #[must_use]
    pub fn directory(path: &str) -> Self {
        let (parent_path, name) = split_path(path);
        Self {
            parent_path: parent_path.to_string(),
            name: name.to_string(),
            entry_type: EntryType::Directory,
            size: 0,
            state: 0,
            content_hash: String::new(),
            created_at: 0,
            updated_at: 0,
            info: None,
        }
    }

    /// Set the caller-defined state code.
    #[must_use]
    pub fn with_state(mut self, state: i32) -> Self {
        self.state = state;
        self
    }

    /// Full path of the entry, the inverse of [`split_path`].
    #[must_use]
    pub fn path(&self) -> String {
        format!("{}{}", self.parent_path, self.name)
    }

    /// Whether this entry is an object.
    #[must_use]
    pub fn is_object(&self) -> bool {
        self.entry_type == EntryType::Object
    }

    /// Decode the info payload.
    ///
    /// Returns `Ok(None)` for directories. An object without a payload is
    /// treated as an empty JSON document and therefore fails to decode.
    pub fn decode_info(&self) -> Result<Option<Info>, DataError> {
        if !self.is_object() {
            return Ok(None);
        }
        let bytes = self.info.as_deref().unwrap_or_default();
        Info::decode(bytes).map(Some)
    }
}

/// Split a path into `(parent_path, name)` at the last separator.
///
/// Everything up to and including the final `/` is the parent; the rest
/// is the name. A path without a separator has an empty parent.
///
/// ```
/// use origin_cache::cache::split_path;
///
/// assert_eq!(split_path("/a/b.txt"), ("/a/", "b.txt"));
/// assert_eq!(split_path("b.txt"), ("", "b.txt"));
/// assert_eq!(split_path("/a/"), ("/a/", ""));
/// ```
#[must_use]
pub fn split_path(path: &str) -> (&str, &str) {
    match path.rfind(PATH_SEPARATOR) {
        Some(idx) => path.split_at(idx + PATH_SEPARATOR.len_utf8()),
        None => ("", path),
    }
}

/// Normalise a directory path so it matches stored `parent_path` values.
#[must_use]
pub fn dir_key(dir: &str) -> String {
    if dir.is_empty() || dir.ends_with(PATH_SEPARATOR) {
        dir.to_string()
    } else {
        format!("{dir}{PATH_SEPARATOR}")
    }
}
