//! Command-line interface definitions for origin-cache.
//!
//! The tool inspects and maintains an origin cache directory from a shell.
//! Global options select the cache directory, config file, verbosity and
//! output format; subcommands map onto the repository operations.
//!
//! # Example
//!
//! ```bash
//! # List the root of the cache
//! origin-cache --dir /var/cache/origin list /
//!
//! # Show one entry as JSON
//! origin-cache --json get /photos/2024/a.jpg
//!
//! # Mark an entry dirty
//! origin-cache set /photos/2024/a.jpg state=2
//! ```

use clap::{Args, Parser, Subcommand};
use rusqlite::types::Value;
use std::path::PathBuf;

/// Inspect and maintain an origin metadata cache.
#[derive(Debug, Parser)]
#[command(name = "origin-cache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Cache directory (overrides the config file and environment)
    #[arg(long, value_name = "DIR", global = true, env = "ORIGIN_CACHE_DIR")]
    pub dir: Option<PathBuf>,

    /// Configuration file to load instead of the default location
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Report errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Log every executed statement
    #[arg(long, global = true)]
    pub trace_sql: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List the entries of a directory
    List(ListArgs),
    /// Show a single entry
    Get(PathArgs),
    /// Record an object or directory
    Put(PutArgs),
    /// Remove a single entry
    Rm(PathArgs),
    /// Move an entry, replacing any entry at the destination
    Mv(MvArgs),
    /// Update columns of an entry
    Set(SetArgs),
    /// Remove every entry
    Clear(ClearArgs),
    /// Show entry counts and total size
    Stats,
}

/// Arguments for the list subcommand.
#[derive(Debug, Args)]
pub struct ListArgs {
    /// Directory to list; the whole cache if omitted
    #[arg(value_name = "DIR")]
    pub path: Option<String>,
}

/// A single cache path.
#[derive(Debug, Args)]
pub struct PathArgs {
    /// Path of the entry, e.g. /a/b.txt
    #[arg(value_name = "PATH")]
    pub path: String,
}

/// Arguments for the put subcommand.
#[derive(Debug, Args)]
pub struct PutArgs {
    /// Path of the entry
    #[arg(value_name = "PATH")]
    pub path: String,

    /// Record a directory instead of an object
    #[arg(long, conflicts_with_all = ["size", "fingerprint"])]
    pub directory: bool,

    /// Object size in bytes
    #[arg(long, value_name = "BYTES", default_value = "0")]
    pub size: i64,

    /// Identity of the remote content
    #[arg(long, value_name = "FINGERPRINT", default_value = "")]
    pub fingerprint: String,

    /// Caller-defined state code
    #[arg(long, value_name = "N", default_value = "0")]
    pub state: i32,
}

/// Arguments for the mv subcommand.
#[derive(Debug, Args)]
pub struct MvArgs {
    /// Current path
    #[arg(value_name = "OLD")]
    pub old: String,

    /// New path
    #[arg(value_name = "NEW")]
    pub new: String,
}

/// Arguments for the set subcommand.
#[derive(Debug, Args)]
pub struct SetArgs {
    /// Path of the entry
    #[arg(value_name = "PATH")]
    pub path: String,

    /// Column assignments; integers are stored as integers, anything else as text
    #[arg(value_name = "COLUMN=VALUE", required = true, value_parser = parse_assignment)]
    pub assignments: Vec<(String, Value)>,
}

/// Arguments for the clear subcommand.
#[derive(Debug, Args)]
pub struct ClearArgs {
    /// Confirm removal of every entry
    #[arg(short = 'y', long)]
    pub yes: bool,
}

/// Parse a `COLUMN=VALUE` assignment.
///
/// # Examples
///
/// ```
/// use origin_cache::cli::parse_assignment;
/// use rusqlite::types::Value;
///
/// assert_eq!(
///     parse_assignment("state=2").unwrap(),
///     ("state".to_string(), Value::Integer(2))
/// );
/// assert_eq!(
///     parse_assignment("sha1=abc").unwrap(),
///     ("sha1".to_string(), Value::Text("abc".into()))
/// );
/// ```
///
/// # Errors
///
/// Returns an error if there is no `=` or the column name is empty.
pub fn parse_assignment(s: &str) -> Result<(String, Value), String> {
    let (column, value) = s
        .split_once('=')
        .ok_or_else(|| format!("Expected COLUMN=VALUE, got '{s}'"))?;
    let column = column.trim();
    if column.is_empty() {
        return Err("Column name cannot be empty".to_string());
    }

    let value = match value.parse::<i64>() {
        Ok(n) => Value::Integer(n),
        Err(_) => Value::Text(value.to_string()),
    };
    Ok((column.to_string(), value))
}
