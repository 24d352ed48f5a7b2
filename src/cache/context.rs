//! Per-operation deadlines and cancellation.
//!
//! Every repository call takes an [`OpContext`]. The repository combines
//! it with its own default budget into a [`Budget`]: the effective
//! deadline is whichever comes first, so a caller can shorten an
//! operation but never lengthen it past the default.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::error::{CacheError, CacheResult};

/// Default budget for single-row operations.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(3);

/// Default budget for full-table scans.
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(60);

/// Caller-supplied deadline and cancellation flag.
///
/// The cancellation flag is a plain `AtomicBool` so the same flag a
/// shutdown handler sets can be handed to every in-flight operation.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    deadline: Option<Instant>,
    cancel: Option<Arc<AtomicBool>>,
}

impl OpContext {
    /// A context with no deadline of its own; only the default budgets apply.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// A context expiring `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// A context expiring at `deadline`.
    #[must_use]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancel: None,
        }
    }

    /// Attach a cancellation flag.
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// The caller's deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the cancellation flag is set.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Combine with a default budget, keeping the earlier deadline.
    #[must_use]
    pub fn bounded(&self, budget: Duration) -> Budget {
        let started = Instant::now();
        let own = started + budget;
        let deadline = match self.deadline {
            Some(caller) if caller < own => caller,
            _ => own,
        };
        Budget {
            started,
            deadline,
            cancel: self.cancel.clone(),
        }
    }
}

/// The effective deadline of one repository call.
#[derive(Debug, Clone)]
pub struct Budget {
    started: Instant,
    deadline: Instant,
    cancel: Option<Arc<AtomicBool>>,
}

impl Budget {
    /// Time left before the deadline, zero once it has passed.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// The total time this call was allowed.
    #[must_use]
    pub fn limit(&self) -> Duration {
        self.deadline.saturating_duration_since(self.started)
    }

    /// Whether the deadline has passed.
    #[must_use]
    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Fail if the call was cancelled or ran out of time.
    pub fn check(&self) -> CacheResult<()> {
        if self.cancelled() {
            return Err(CacheError::Cancelled);
        }
        if self.expired() {
            return Err(self.timeout());
        }
        Ok(())
    }

    /// The error reported when this budget is exhausted.
    #[must_use]
    pub fn timeout(&self) -> CacheError {
        CacheError::Timeout(self.limit())
    }

    /// Error for a statement SQLite interrupted on this budget's behalf.
    #[must_use]
    pub fn interrupted(&self) -> CacheError {
        if self.cancelled() {
            CacheError::Cancelled
        } else {
            self.timeout()
        }
    }

    /// A progress-handler callback returning `true` once the statement
    /// should be interrupted.
    pub fn interrupter(&self) -> impl FnMut() -> bool + Send + std::panic::RefUnwindSafe + 'static {
        let deadline = self.deadline;
        let cancel = self.cancel.clone();
        move || {
            Instant::now() >= deadline
                || cancel
                    .as_ref()
                    .is_some_and(|flag| flag.load(Ordering::SeqCst))
        }
    }
}
