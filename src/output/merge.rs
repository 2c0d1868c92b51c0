use anyhow::Result;
use std::collections::VecDeque;
use std::time::Instant;
use tracing::{debug, warn};

use crate::async_result::AsyncResult;
use crate::error::ErrorTracker;
use crate::metrics::SchedulerMetrics;
use crate::output::{OutputMerge, OutputTracker};

/// Bounded FIFO of output merges that are not yet applied.
///
/// Descriptors are applied strictly in push order: a finished shard waits
/// behind any unfinished shard submitted before it. The queue never holds more
/// than `bound` descriptors as long as callers go through
/// [`make_room`](Self::make_room) before each [`push`](Self::push).
pub struct MergeQueue<S> {
    pending: VecDeque<AsyncResult<OutputMerge<S>>>,
    bound: usize,
}

impl<S> MergeQueue<S> {
    /// A queue holding at most `bound` descriptors (at least one).
    #[must_use]
    pub fn new(bound: usize) -> Self {
        let bound = bound.max(1);
        Self {
            pending: VecDeque::with_capacity(bound),
            bound,
        }
    }

    #[must_use]
    pub fn bound(&self) -> usize {
        self.bound
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.pending.len() >= self.bound
    }

    /// Queue the future output of the next shard.
    pub fn push(&mut self, merge: AsyncResult<OutputMerge<S>>, metrics: &SchedulerMetrics) {
        debug_assert!(!self.is_full());
        self.pending.push_back(merge);
        metrics.observe_pending_merges(self.pending.len());
    }

    /// Apply every descriptor at the front whose shard has finished. Never blocks.
    ///
    /// # Errors
    ///
    /// The failure of a shard whose output was due, or a tracker merge failure.
    pub fn merge_ready<T>(&mut self, tracker: &T, errors: &ErrorTracker, metrics: &SchedulerMetrics) -> Result<usize>
    where
        T: OutputTracker<Staged = S> + ?Sized,
    {
        let started = Instant::now();
        let mut merged = 0;
        while self.pending.front().is_some_and(AsyncResult::is_done) {
            self.merge_front(tracker, errors)?;
            merged += 1;
        }
        if merged > 0 {
            metrics.record_output_merge(merged, started.elapsed());
        }
        Ok(merged)
    }

    /// Make sure one more descriptor fits, blocking on the oldest shard if the
    /// queue is full.
    ///
    /// # Errors
    ///
    /// As for [`merge_ready`](Self::merge_ready).
    pub fn make_room<T>(&mut self, tracker: &T, errors: &ErrorTracker, metrics: &SchedulerMetrics) -> Result<()>
    where
        T: OutputTracker<Staged = S> + ?Sized,
    {
        if !self.is_full() {
            return Ok(());
        }
        self.merge_ready(tracker, errors, metrics)?;
        while self.is_full() {
            warn!(pending = self.pending.len(), bound = self.bound, "output merge queue full; waiting for the oldest shard");
            let started = Instant::now();
            self.merge_front(tracker, errors)?;
            metrics.record_output_merge(1, started.elapsed());
        }
        Ok(())
    }

    /// Apply everything still queued, waiting for unfinished shards in order.
    ///
    /// # Errors
    ///
    /// As for [`merge_ready`](Self::merge_ready).
    pub fn drain<T>(&mut self, tracker: &T, errors: &ErrorTracker, metrics: &SchedulerMetrics) -> Result<usize>
    where
        T: OutputTracker<Staged = S> + ?Sized,
    {
        let started = Instant::now();
        let mut merged = 0;
        while !self.pending.is_empty() {
            self.merge_front(tracker, errors)?;
            merged += 1;
        }
        if merged > 0 {
            metrics.record_output_merge(merged, started.elapsed());
        }
        Ok(merged)
    }

    fn merge_front<T>(&mut self, tracker: &T, errors: &ErrorTracker) -> Result<()>
    where
        T: OutputTracker<Staged = S> + ?Sized,
    {
        let Some(next) = self.pending.pop_front() else {
            return Ok(());
        };
        let merge = next.wait().map_err(|e| errors.resolve(e))?;
        debug!(shard = merge.shard, "merging staged output");
        tracker.merge(merge.staged)
    }
}
