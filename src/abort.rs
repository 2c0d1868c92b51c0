//! Cooperative cancellation.
//!
//! Schedulers poll an [`AbortSignal`] before starting each shard. Work already
//! in flight always finishes; an abort only stops new shards from being
//! started, and the run reports the result folded over the shards processed
//! so far.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

/// Asked before each new unit of work whether to stop.
pub trait AbortSignal: Send + Sync {
    fn should_abort(&self) -> bool;
}

/// Never requests a stop.
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverAbort;

impl AbortSignal for NeverAbort {
    fn should_abort(&self) -> bool {
        false
    }
}

impl<F> AbortSignal for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn should_abort(&self) -> bool {
        self()
    }
}

/// A shared flag that any holder can raise.
///
/// ```
/// use shardwalk::abort::{AbortFlag, AbortSignal};
///
/// let flag = AbortFlag::new();
/// let handle = flag.clone();
/// assert!(!flag.should_abort());
/// handle.raise();
/// assert!(flag.should_abort());
/// ```
#[derive(Clone, Debug, Default)]
pub struct AbortFlag {
    raised: Arc<AtomicBool>,
}

impl AbortFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }
}

impl AbortSignal for AbortFlag {
    fn should_abort(&self) -> bool {
        self.is_raised()
    }
}

/// Stops scheduling once a run has lasted longer than `limit`.
#[derive(Debug)]
pub struct RuntimeLimit {
    started: Instant,
    limit: Duration,
    reported: AtomicBool,
}

impl RuntimeLimit {
    /// Start the clock now.
    #[must_use]
    pub fn new(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit,
            reported: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn limit(&self) -> Duration {
        self.limit
    }
}

impl AbortSignal for RuntimeLimit {
    fn should_abort(&self) -> bool {
        let elapsed = self.started.elapsed();
        if elapsed <= self.limit {
            return false;
        }
        if !self.reported.swap(true, Ordering::AcqRel) {
            info!(
                elapsed_ms = elapsed.as_millis() as u64,
                limit_ms = self.limit.as_millis() as u64,
                "runtime exceeded the requested maximum; stopping after in-flight work"
            );
        }
        true
    }
}

/// Everything that can stop a run before its input is exhausted.
pub(crate) struct StopCheck<'a> {
    signal: &'a dyn AbortSignal,
    limit: Option<RuntimeLimit>,
}

impl<'a> StopCheck<'a> {
    pub(crate) fn new(signal: &'a dyn AbortSignal, runtime_limit: Option<Duration>) -> Self {
        Self {
            signal,
            limit: runtime_limit.map(RuntimeLimit::new),
        }
    }

    pub(crate) fn should_stop(&self) -> bool {
        self.signal.should_abort() || self.limit.as_ref().is_some_and(RuntimeLimit::should_abort)
    }
}
