//! Output formatting for the command-line tool.
//!
//! Entries print either as aligned text lines or as JSON. The JSON form
//! decodes the info payload instead of dumping its raw bytes.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "path": "/a/b.txt",
//!   "type": "object",
//!   "size": 4096,
//!   "state": 0,
//!   "sha1": "4096,2024-01-02 03:04:05 +0000 UTC",
//!   "created_at": 1704164645,
//!   "updated_at": 1704164645,
//!   "info": { "ModTime": "...", "Size": 4096, "Rs": [], ... }
//! }
//! ```

use std::io::Write;

use bytesize::ByteSize;
use chrono::DateTime;
use serde::Serialize;

use crate::cache::{Entry, EntryType, Info};

/// An entry in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonEntry {
    /// Full path
    pub path: String,
    /// "directory" or "object"
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    /// Size in bytes
    pub size: i64,
    /// Caller-defined state code
    pub state: i32,
    /// Content fingerprint
    pub sha1: String,
    /// Unix seconds of the first insert
    pub created_at: i64,
    /// Unix seconds of the last update
    pub updated_at: i64,
    /// Decoded info payload; absent for directories or undecodable blobs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<Info>,
}

impl From<&Entry> for JsonEntry {
    fn from(entry: &Entry) -> Self {
        let info = match entry.decode_info() {
            Ok(info) => info,
            Err(e) => {
                log::warn!("Undecodable info for {}: {}", entry.path(), e);
                None
            }
        };
        Self {
            path: entry.path(),
            entry_type: entry.entry_type,
            size: entry.size,
            state: entry.state,
            sha1: entry.content_hash.clone(),
            created_at: entry.created_at,
            updated_at: entry.updated_at,
            info,
        }
    }
}

/// Totals over a set of entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    /// Path of the backing file
    pub database: String,
    /// Number of entries
    pub entries: u64,
    /// Number of object entries
    pub objects: u64,
    /// Number of directory entries
    pub directories: u64,
    /// Sum of object sizes in bytes
    pub total_size: u64,
}

impl Stats {
    /// Tally `entries`.
    #[must_use]
    pub fn from_entries(database: impl Into<String>, entries: &[Entry]) -> Self {
        let mut stats = Self {
            database: database.into(),
            ..Self::default()
        };
        for entry in entries {
            stats.entries += 1;
            match entry.entry_type {
                EntryType::Object => {
                    stats.objects += 1;
                    stats.total_size += u64::try_from(entry.size).unwrap_or(0);
                }
                EntryType::Directory => stats.directories += 1,
            }
        }
        stats
    }

    /// Multi-line human-readable summary.
    #[must_use]
    pub fn to_text(&self) -> String {
        format!(
            "Database:    {}\nEntries:     {}\nObjects:     {}\nDirectories: {}\nTotal size:  {}",
            self.database,
            self.entries,
            self.objects,
            self.directories,
            ByteSize::b(self.total_size)
        )
    }
}

/// One aligned text line for `entry`: kind, size, last update and path.
#[must_use]
pub fn entry_line(entry: &Entry) -> String {
    let size = match entry.entry_type {
        EntryType::Object => ByteSize::b(u64::try_from(entry.size).unwrap_or(0)).to_string(),
        EntryType::Directory => "-".to_string(),
    };
    format!(
        "{:<6} {:>10} {} {}",
        entry.entry_type.to_string(),
        size,
        format_timestamp(entry.updated_at),
        entry.path()
    )
}

/// Detailed multi-line view of a single entry.
#[must_use]
pub fn entry_details(entry: &Entry) -> String {
    let mut out = format!(
        "Path:     {}\nType:     {}\nSize:     {} ({} bytes)\nState:    {}\nSHA1:     {}\nCreated:  {}\nUpdated:  {}",
        entry.path(),
        entry.entry_type,
        ByteSize::b(u64::try_from(entry.size).unwrap_or(0)),
        entry.size,
        entry.state,
        entry.content_hash,
        format_timestamp(entry.created_at),
        format_timestamp(entry.updated_at),
    );
    if let Ok(Some(info)) = entry.decode_info() {
        out.push_str(&format!(
            "\nModified: {}\nPresent:  {} of {} bytes\nDirty:    {}",
            info.mod_time.format("%Y-%m-%d %H:%M:%S"),
            info.ranges.covered_bytes(),
            info.size,
            info.dirty
        ));
    }
    out
}

/// Format unix seconds as UTC date and time.
#[must_use]
pub fn format_timestamp(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| secs.to_string())
}

/// Write `value` as pretty-printed JSON followed by a newline.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn write_json<W: Write, T: Serialize + ?Sized>(writer: &mut W, value: &T) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *writer, value)?;
    writeln!(writer)?;
    Ok(())
}
