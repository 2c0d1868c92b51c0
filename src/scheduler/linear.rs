use anyhow::{bail, Result};
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::abort::{AbortSignal, NeverAbort, StopCheck};
use crate::accumulator::Accumulator;
use crate::engine::EnginePool;
use crate::error::SchedulerError;
use crate::interval::{PosOf, Span, validate_spans};
use crate::metrics::SchedulerMetrics;
use crate::output::OutputTracker;
use crate::shard::Shard;
use crate::walker::{Reduced, Walker};

/// Runs every shard on the calling thread, threading one accumulator through
/// all of them.
pub struct LinearScheduler {
    abort: Arc<dyn AbortSignal>,
    runtime_limit: Option<Duration>,
    metrics: SchedulerMetrics,
}

impl LinearScheduler {
    #[must_use]
    pub fn new(metrics: SchedulerMetrics) -> Self {
        Self {
            abort: Arc::new(NeverAbort),
            runtime_limit: None,
            metrics,
        }
    }

    #[must_use]
    pub fn with_abort(mut self, abort: Arc<dyn AbortSignal>) -> Self {
        self.abort = abort;
        self
    }

    #[must_use]
    pub fn with_runtime_limit(mut self, limit: Option<Duration>) -> Self {
        self.runtime_limit = limit;
        self
    }

    /// Fold `walker` over every shard, in order, into one result.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::MissingIntervals`] if the walker aggregates by
    /// interval; otherwise the first failure of any shard, the walker's
    /// completion hook or the tracker.
    pub fn execute<W, I, S, T>(&self, walker: &W, shards: I, tracker: &T) -> Result<Reduced<W::Result, PosOf<W::Record>>>
    where
        W: Walker,
        I: IntoIterator<Item = S>,
        S: Shard<Record = W::Record>,
        T: OutputTracker + ?Sized,
    {
        if walker.reduce_by_interval() {
            bail!(SchedulerError::MissingIntervals);
        }
        self.drive(walker, shards, tracker, Accumulator::standard(walker))
    }

    /// Fold `walker` over every shard keeping one result per interval.
    ///
    /// `intervals` must be ascending and disjoint, and every span of every
    /// shard must fall inside one of them.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvertedSpan`] or [`SchedulerError::UnsortedSpans`]
    /// for a bad interval list,
    /// [`SchedulerError::NoIntervalForWindow`] or
    /// [`SchedulerError::UncoveredWindow`] for shards that do not line up with
    /// the intervals, and the first failure of any shard.
    pub fn execute_by_interval<W, I, S, T>(
        &self,
        walker: &W,
        intervals: Vec<Span<PosOf<W::Record>>>,
        shards: I,
        tracker: &T,
    ) -> Result<Reduced<W::Result, PosOf<W::Record>>>
    where
        W: Walker,
        I: IntoIterator<Item = S>,
        S: Shard<Record = W::Record>,
        T: OutputTracker + ?Sized,
    {
        validate_spans(&intervals)?;
        self.drive(walker, shards, tracker, Accumulator::by_interval(walker, intervals))
    }

    fn drive<W, I, S, T>(
        &self,
        walker: &W,
        shards: I,
        tracker: &T,
        accumulator: Accumulator<'_, W>,
    ) -> Result<Reduced<W::Result, PosOf<W::Record>>>
    where
        W: Walker,
        I: IntoIterator<Item = S>,
        S: Shard<Record = W::Record>,
        T: OutputTracker + ?Sized,
    {
        let engines = EnginePool::new(1);
        self.metrics.record_start();
        info!(mode = "linear", "starting traversal");

        let outcome = self.traverse_all(walker, shards, tracker, accumulator, &engines);

        engines.shutdown(&self.metrics);
        self.metrics.record_end();
        match &outcome {
            Ok(_) => info!(
                mode = "linear",
                shards = self.metrics.snapshot().shards_traversed,
                "traversal finished"
            ),
            Err(err) => {
                debug!(error = %err, "linear traversal failed");
                if let Err(close_err) = tracker.close() {
                    debug!(error = %close_err, "closing output after failure also failed");
                }
            }
        }
        outcome
    }

    fn traverse_all<W, I, S, T>(
        &self,
        walker: &W,
        shards: I,
        tracker: &T,
        mut accumulator: Accumulator<'_, W>,
        engines: &EnginePool,
    ) -> Result<Reduced<W::Result, PosOf<W::Record>>>
    where
        W: Walker,
        I: IntoIterator<Item = S>,
        S: Shard<Record = W::Record>,
        T: OutputTracker + ?Sized,
    {
        let stop = StopCheck::new(&*self.abort, self.runtime_limit);
        let mut out = tracker.direct()?;
        for (index, shard) in shards.into_iter().enumerate() {
            if stop.should_stop() {
                info!(shards_processed = index, "abort requested; reporting the shards processed so far");
                break;
            }
            if walker.is_done() {
                info!(shards_processed = index, "walker is done; skipping remaining shards");
                break;
            }
            let started = Instant::now();
            let mut engine = engines.borrow(0)?;
            engine.traverse(walker, &shard, &mut accumulator, &mut *out)?;
            drop(engine);
            self.metrics.record_shard(started.elapsed());
            debug!(shard = index, location = %shard.describe(), "shard traversed");
        }

        let reduced = accumulator.finish(&mut *out)?;
        out.flush()?;
        drop(out);
        tracker.close()?;
        Ok(reduced)
    }
}
