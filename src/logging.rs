//! Logging setup for the origin-cache tool.
//!
//! The library logs through the `log` facade; the binary installs
//! `env_logger`. Levels are chosen by, in priority order:
//!
//! 1. `RUST_LOG` environment variable (if set)
//! 2. CLI flags: `--quiet` (error only) or `--verbose` (debug/trace)
//! 3. Default: info level
//!
//! Statement trace records are logged at debug level on
//! [`TRACE_TARGET`](crate::cache::trace::TRACE_TARGET). `--trace-sql`
//! enables that target without turning on debug output everywhere else.
//!
//! # Example
//!
//! ```rust,no_run
//! use origin_cache::logging::init_logging;
//!
//! // Info level, plus statement traces
//! init_logging(0, false, true);
//! ```

use env_logger::Builder;
use log::LevelFilter;
use std::env;
use std::io::Write;

use crate::cache::trace::TRACE_TARGET;

/// Initialize the logging subsystem from CLI flags.
///
/// Call once, before any logging. `env_logger` can only be installed
/// once per process, so a second call panics.
///
/// # Arguments
///
/// * `verbose` - Verbosity count from CLI (0=normal, 1=debug, 2+=trace)
/// * `quiet` - If true, only show errors (overridden by RUST_LOG)
/// * `trace_sql` - If true, log every executed statement
pub fn init_logging(verbose: u8, quiet: bool, trace_sql: bool) {
    let use_env = env::var("RUST_LOG").is_ok();
    let level = determine_level(verbose, quiet);

    let mut builder = Builder::new();
    if use_env {
        builder.parse_default_env();
    } else {
        builder.filter_level(level);
        builder.filter_module(TRACE_TARGET, trace_level(level, trace_sql));
    }

    configure_format(&mut builder, verbose);
    builder.init();

    if use_env {
        log::debug!(
            "Logging initialized from RUST_LOG environment variable: {:?}",
            env::var("RUST_LOG").ok()
        );
    } else {
        log::debug!("Logging initialized at level: {:?}", level);
    }
}

/// Determine the log level from CLI flags.
fn determine_level(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

/// Level for the statement trace target.
fn trace_level(level: LevelFilter, trace_sql: bool) -> LevelFilter {
    if trace_sql {
        level.max(LevelFilter::Debug)
    } else {
        level.min(LevelFilter::Info)
    }
}

/// Debug builds add a timestamp and, when verbose, the module path.
fn configure_format(builder: &mut Builder, verbose: u8) {
    #[cfg(debug_assertions)]
    {
        builder.format(move |buf, record| {
            let timestamp = buf.timestamp_seconds();
            let level = record.level();
            let level_style = buf.default_level_style(level);

            if verbose >= 1 {
                writeln!(
                    buf,
                    "{} {level_style}{:<5}{level_style:#} [{}] {}",
                    timestamp,
                    level,
                    record.module_path().unwrap_or("unknown"),
                    record.args()
                )
            } else {
                writeln!(
                    buf,
                    "{} {level_style}{:<5}{level_style:#} {}",
                    timestamp,
                    level,
                    record.args()
                )
            }
        });
    }

    #[cfg(not(debug_assertions))]
    {
        let _ = verbose;
        builder.format(|buf, record| {
            let level = record.level();
            let level_style = buf.default_level_style(level);
            writeln!(
                buf,
                "{level_style}{:<5}{level_style:#} {}",
                level,
                record.args()
            )
        });
    }
}
