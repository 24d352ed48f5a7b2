//! Statement tracing.
//!
//! Every statement the cache issues goes through [`Tracer::run`], which
//! notes a start time before the call and, afterwards, hands a
//! [`TraceRecord`] to the configured [`TraceSink`]. Tracing is purely
//! observational: the wrapped result is returned untouched whatever the
//! sink does with the record.

use std::panic::Location;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use serde::Serialize;

/// Log target used by [`LogSink`].
pub const TRACE_TARGET: &str = "origin_cache::trace";

/// One traced statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceRecord {
    /// Unix seconds when the statement finished.
    pub timestamp: i64,
    /// `file:line` of the code that issued the statement.
    pub stack: String,
    /// Statement text with bound values substituted.
    pub sql: String,
    /// Rows changed, or rows returned for queries.
    pub rows_affected: i64,
    /// Wall time spent in the statement.
    pub cost_seconds: f64,
    /// Error text if the statement failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_str: Option<String>,
}

/// Destination for trace records.
pub trait TraceSink: Send + Sync {
    /// Receive one record. Must not panic.
    fn record(&self, record: &TraceRecord);
}

/// Writes each record as JSON at debug level on [`TRACE_TARGET`].
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl TraceSink for LogSink {
    fn record(&self, record: &TraceRecord) {
        if !log::log_enabled!(target: TRACE_TARGET, log::Level::Debug) {
            return;
        }
        match serde_json::to_string(record) {
            Ok(json) => log::debug!(target: TRACE_TARGET, "db trace: {}", json),
            Err(_) => log::debug!(target: TRACE_TARGET, "db trace: {:?}", record),
        }
    }
}

/// Keeps records in memory; handy for inspecting what a call executed.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<TraceRecord>>,
}

impl MemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    #[must_use]
    pub fn records(&self) -> Vec<TraceRecord> {
        self.records.lock().clone()
    }

    /// Drop all recorded entries.
    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl TraceSink for MemorySink {
    fn record(&self, record: &TraceRecord) {
        self.records.lock().push(record.clone());
    }
}

/// Number of rows a statement touched, as reported in a trace record.
pub trait RowCount {
    /// Rows affected or returned.
    fn row_count(&self) -> i64;
}

impl RowCount for usize {
    fn row_count(&self) -> i64 {
        i64::try_from(*self).unwrap_or(i64::MAX)
    }
}

impl RowCount for () {
    fn row_count(&self) -> i64 {
        0
    }
}

impl<T> RowCount for Vec<T> {
    fn row_count(&self) -> i64 {
        self.len().row_count()
    }
}

impl<T> RowCount for Option<T> {
    fn row_count(&self) -> i64 {
        i64::from(self.is_some())
    }
}

/// Wraps statements with timing and hands the result to a sink.
#[derive(Clone, Default)]
pub struct Tracer {
    sink: Option<Arc<dyn TraceSink>>,
}

impl std::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracer")
            .field("enabled", &self.sink.is_some())
            .finish()
    }
}

impl Tracer {
    /// A tracer sending records to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn TraceSink>) -> Self {
        Self { sink: Some(sink) }
    }

    /// A tracer logging through [`LogSink`].
    #[must_use]
    pub fn log() -> Self {
        Self::new(Arc::new(LogSink))
    }

    /// A tracer that records nothing.
    #[must_use]
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    /// Whether records are produced.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Run `op`, which executes `sql` bound to `params`, and trace it.
    #[track_caller]
    pub fn run<T, F>(&self, sql: &str, params: &[&dyn ToSql], op: F) -> rusqlite::Result<T>
    where
        T: RowCount,
        F: FnOnce() -> rusqlite::Result<T>,
    {
        let caller = Location::caller();
        let started = self.before();
        let result = op();
        self.after(started, caller, sql, params, &result);
        result
    }

    fn before(&self) -> Option<Instant> {
        self.sink.as_ref().map(|_| Instant::now())
    }

    fn after<T: RowCount>(
        &self,
        started: Option<Instant>,
        caller: &Location<'_>,
        sql: &str,
        params: &[&dyn ToSql],
        result: &rusqlite::Result<T>,
    ) {
        let (Some(sink), Some(started)) = (self.sink.as_ref(), started) else {
            return;
        };

        let (rows_affected, error_str) = match result {
            Ok(value) => (value.row_count(), None),
            Err(e) => (0, Some(e.to_string())),
        };

        let record = TraceRecord {
            timestamp: chrono::Utc::now().timestamp(),
            stack: format!("{}:{}", caller.file(), caller.line()),
            sql: explain(sql, params),
            rows_affected,
            cost_seconds: started.elapsed().as_secs_f64(),
            error_str,
        };
        sink.record(&record);
    }
}

/// Substitute `?` / `?N` placeholders with rendered parameter values.
#[must_use]
pub fn explain(sql: &str, params: &[&dyn ToSql]) -> String {
    let mut out = String::with_capacity(sql.len() + 16 * params.len());
    let mut chars = sql.chars().peekable();
    let mut next_positional = 0usize;

    while let Some(c) = chars.next() {
        if c != '?' {
            out.push(c);
            continue;
        }

        let mut digits = String::new();
        while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
            digits.push(d);
            chars.next();
        }

        let index = if digits.is_empty() {
            next_positional += 1;
            next_positional
        } else {
            digits.parse::<usize>().unwrap_or(0)
        };

        match index.checked_sub(1).and_then(|i| params.get(i)) {
            Some(value) => out.push_str(&render(*value)),
            None => {
                out.push('?');
                out.push_str(&digits);
            }
        }
    }
    out
}

fn render(value: &dyn ToSql) -> String {
    match value.to_sql() {
        Ok(ToSqlOutput::Borrowed(v)) => render_ref(v),
        Ok(ToSqlOutput::Owned(v)) => render_ref(ValueRef::from(&v)),
        _ => "?".to_string(),
    }
}

fn render_ref(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => format!("'{}'", String::from_utf8_lossy(t).replace('\'', "''")),
        ValueRef::Blob(b) => format!("<blob {} bytes>", b.len()),
    }
}
