//! origin-cache - persistent metadata cache for origin-backed filesystems
//!
//! Records the files and directories seen on a remote origin in a local
//! SQLite database so a filesystem layer can answer lookups, listings and
//! renames without a round trip. The [`cache`] module is the library; the
//! rest supports the `origin-cache` command-line tool.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod output;

use std::io::{self, Write};

use anyhow::{Context, Result};
use chrono::Utc;

use crate::cache::{Entry, Fields, Info, OpContext, OriginCache};
use crate::cli::{Cli, Commands};
use crate::config::CacheConfig;
use crate::error::ExitCode;
use crate::output::{entry_details, entry_line, write_json, JsonEntry, Stats};

/// Run the command described by `cli`.
///
/// Loads configuration, applies command-line overrides, opens the cache
/// and executes one subcommand. Results go to stdout; progress messages
/// go to the log.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the cache cannot be
/// opened or the operation fails. A missing entry surfaces as
/// [`cache::CacheError::NotFound`] inside the returned error.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    let mut config = match &cli.config {
        Some(path) => CacheConfig::load_from(Some(path))?,
        None => CacheConfig::load()?,
    };
    if let Some(dir) = cli.dir {
        config.dir = Some(dir);
    }
    if cli.trace_sql {
        config.trace = true;
    }

    let dir = config.cache_dir()?;
    log::debug!("Using cache directory {}", dir.display());
    let cache = OriginCache::open(&dir, &config)
        .with_context(|| format!("Failed to open cache in {}", dir.display()))?;

    let ctx = OpContext::background();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Commands::List(args) => {
            let entries = match &args.path {
                Some(dir) => cache.list_dir(&ctx, dir),
                None => cache.get_all(&ctx),
            }
            .context("Failed to list entries")?;

            if cli.json {
                let json: Vec<JsonEntry> = entries.iter().map(JsonEntry::from).collect();
                write_json(&mut out, &json)?;
            } else if entries.is_empty() {
                log::info!("No entries");
            } else {
                for entry in &entries {
                    writeln!(out, "{}", entry_line(entry))?;
                }
            }
        }
        Commands::Get(args) => {
            let entry = cache
                .get(&ctx, &args.path)
                .with_context(|| format!("Failed to get {}", args.path))?;
            if cli.json {
                write_json(&mut out, &JsonEntry::from(&entry))?;
            } else {
                writeln!(out, "{}", entry_details(&entry))?;
            }
        }
        Commands::Put(args) => {
            let entry = if args.directory {
                Entry::directory(&args.path)
            } else {
                let info = Info::new(args.size, args.fingerprint, Utc::now());
                Entry::object(&args.path, &info)?
            };
            cache
                .upsert(&ctx, &entry.with_state(args.state))
                .with_context(|| format!("Failed to record {}", args.path))?;
            log::info!("Recorded {}", args.path);
        }
        Commands::Rm(args) => {
            cache
                .delete(&ctx, &args.path)
                .with_context(|| format!("Failed to remove {}", args.path))?;
            log::info!("Removed {}", args.path);
        }
        Commands::Mv(args) => {
            cache
                .rename(&ctx, &args.old, &args.new)
                .with_context(|| format!("Failed to move {} to {}", args.old, args.new))?;
            log::info!("Moved {} to {}", args.old, args.new);
        }
        Commands::Set(args) => {
            let fields: Fields = args.assignments.into_iter().collect();
            cache
                .modify(&ctx, &args.path, &fields)
                .with_context(|| format!("Failed to update {}", args.path))?;
            log::info!("Updated {} column(s) of {}", fields.len(), args.path);
        }
        Commands::Clear(args) => {
            if !args.yes {
                anyhow::bail!(
                    "Refusing to clear {} without --yes",
                    cache.path().display()
                );
            }
            cache.delete_all(&ctx).context("Failed to clear cache")?;
            log::info!("Cleared {}", cache.path().display());
        }
        Commands::Stats => {
            let entries = cache.get_all(&ctx).context("Failed to read entries")?;
            let stats = Stats::from_entries(cache.path().display().to_string(), &entries);
            if cli.json {
                write_json(&mut out, &stats)?;
            } else {
                writeln!(out, "{}", stats.to_text())?;
            }
        }
    }

    out.flush()?;
    cache.close()?;
    Ok(ExitCode::Success)
}
