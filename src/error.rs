//! Engine error taxonomy and the first-failure latch shared by worker threads.
//!
//! Walker and output-tracker failures travel as plain [`anyhow::Error`]s and
//! are handed back to the caller untouched, so callers can `downcast_ref` to
//! their own error types. [`SchedulerError`] covers the failures the engine
//! raises itself: protocol violations, configuration mistakes and task
//! bookkeeping.

use std::any::Any;
use std::sync::{Arc, Mutex, PoisonError};
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::{debug, error};

/// Failures raised by the scheduling engine itself.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A shard produced a record positioned before the record preceding it.
    #[error("record at {position} arrived after a record at {previous}; shard records must be position-ordered")]
    OutOfOrder { previous: String, position: String },

    /// A span list was not ascending and disjoint.
    #[error("span #{index} {span} does not strictly follow the span before it")]
    UnsortedSpans { index: usize, span: String },

    /// A span whose start lies past its end.
    #[error("span #{index} {span} starts after it ends")]
    InvertedSpan { index: usize, span: String },

    /// Interval aggregation was requested with more than one worker thread.
    #[error("walker aggregates results by interval, which cannot run with {threads} threads; use a single thread")]
    IntervalReduceInParallel { threads: usize },

    /// The walker aggregates by interval but no interval list was supplied.
    #[error("walker aggregates results by interval but no intervals were supplied")]
    MissingIntervals,

    /// Interval aggregation met a window with no span.
    #[error("interval aggregation requires every window to carry a span, got an unfiltered window")]
    NoIntervalForWindow,

    /// A window span lies outside every remaining interval.
    #[error("window {span} is not covered by any remaining interval")]
    UncoveredWindow { span: String },

    /// The scheduler was configured with impossible values.
    #[error("invalid scheduler configuration: {0}")]
    InvalidConfig(String),

    /// Walker code panicked on a worker thread.
    #[error("worker panicked: {0}")]
    WorkerPanicked(String),

    /// The task feeding an [`AsyncResult`](crate::async_result::AsyncResult) went away without completing it.
    #[error("task was dropped before producing a result")]
    TaskAbandoned,

    /// Stand-in carried by task results after the real failure was latched.
    #[error("an earlier task failed; the first failure is held by the error tracker")]
    FailureLatched,

    /// No execution engine exists for the requesting worker.
    #[error("no execution engine is assigned to worker {0}")]
    EngineUnavailable(usize),

    /// Entries were added to a reduce tree after it was completed.
    #[error("reduce tree is already complete")]
    TreeComplete,
}

/// Render a caught panic payload as text.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Latches the first failure observed by any worker.
///
/// Once a failure is recorded it never changes; later failures are logged and
/// discarded. Cloning shares the latch.
#[derive(Clone, Default)]
pub struct ErrorTracker {
    inner: Arc<ErrorTrackerInner>,
}

#[derive(Default)]
struct ErrorTrackerInner {
    pending: AtomicBool,
    error: Mutex<Option<anyhow::Error>>,
}

impl ErrorTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure. Only the first one is kept.
    pub fn notify(&self, err: anyhow::Error) {
        let mut slot = self.inner.error.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() && !self.inner.pending.load(Ordering::Acquire) {
            error!(error = %err, "task failed; aborting further scheduling");
            *slot = Some(err);
            self.inner.pending.store(true, Ordering::Release);
        } else {
            debug!(error = %err, "dropping failure after the first");
        }
    }

    /// Has any failure been recorded?
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// Return the latched failure, if any, as an `Err`.
    ///
    /// # Errors
    ///
    /// The first failure recorded through [`notify`](Self::notify).
    pub fn check(&self) -> anyhow::Result<()> {
        if !self.has_error() {
            return Ok(());
        }
        match self.take() {
            Some(err) => Err(err),
            None => Err(SchedulerError::FailureLatched.into()),
        }
    }

    /// Swap a failure seen on a task result for the latched original, if one
    /// exists. Failures that never went through the latch pass unchanged.
    #[must_use]
    pub fn resolve(&self, err: anyhow::Error) -> anyhow::Error {
        self.take().unwrap_or(err)
    }

    fn take(&self) -> Option<anyhow::Error> {
        self.inner
            .error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}
