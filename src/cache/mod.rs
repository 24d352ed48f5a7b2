//! Origin metadata cache.
//!
//! This module keeps a persistent record of every file and directory seen
//! on the origin, keyed by `(parent_path, name)`, so the filesystem layer
//! can answer stat-like questions without asking the origin again.
//!
//! # Architecture
//!
//! * [`store`]: the SQLite file, its connections and error classification.
//! * [`schema`]: idempotent creation of the entry table and unique index.
//! * [`database`]: [`OriginCache`], the repository operations and the
//!   read/write guard around them.
//! * [`trace`]: timing and logging of every executed statement.
//! * [`context`]: per-call deadlines and cancellation.
//! * [`entry`]: the [`Entry`] row and its [`Info`] payload.
//! * [`ranges`]: byte ranges of an object present locally.
//! * [`global`]: the process-wide instance.
//!
//! # Example
//!
//! ```no_run
//! use origin_cache::cache::{Entry, Info, OpContext, OriginCache};
//! use origin_cache::config::CacheConfig;
//! use std::path::Path;
//!
//! let cache = OriginCache::open(Path::new("/var/cache/origin"), &CacheConfig::default())?;
//! let ctx = OpContext::background();
//!
//! let info = Info::new(10, "f1", chrono::Utc::now());
//! cache.upsert(&ctx, &Entry::object("/a/b.txt", &info)?)?;
//! cache.rename(&ctx, "/a/b.txt", "/a/c.txt")?;
//! assert_eq!(cache.get(&ctx, "/a/c.txt")?.size, 10);
//! # Ok::<(), origin_cache::cache::CacheError>(())
//! ```

pub mod context;
pub mod database;
pub mod entry;
pub mod error;
pub mod global;
pub mod ranges;
pub mod schema;
pub mod store;
pub mod trace;

pub use context::{OpContext, DEFAULT_OP_TIMEOUT, DEFAULT_SCAN_TIMEOUT};
pub use database::{Fields, OriginCache};
pub use entry::{dir_key, split_path, Entry, EntryType, Info};
pub use error::{CacheError, CacheResult, DataError};
pub use global::{global, CacheCell};
pub use ranges::{Range, Ranges};
pub use store::{StoreErrorKind, DATABASE_FILE_NAME};
pub use trace::{LogSink, MemorySink, TraceRecord, TraceSink, Tracer};
