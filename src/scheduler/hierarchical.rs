use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::abort::{AbortSignal, NeverAbort, StopCheck};
use crate::async_result::{promise, AsyncResult};
use crate::engine::EnginePool;
use crate::error::{ErrorTracker, SchedulerError};
use crate::interval::PosOf;
use crate::metrics::SchedulerMetrics;
use crate::output::{MergeQueue, OutputTracker};
use crate::reduce_tree::ReduceTree;
use crate::scheduler::tasks::{ReduceQueue, ShardTask, TaskContext, TreeReduceTask, WorkerSlots};
use crate::shard::Shard;
use crate::walker::{Reduced, TreeReducible};

/// Traverses shards on a fixed worker pool and combines their results through
/// a reduce tree.
///
/// The scheduling loop runs on the calling thread. Each pass it:
///
/// 1. stops on the first latched failure
/// 2. merges every staged output whose turn has come
/// 3. submits a ready tree reduce if one exists, otherwise the next shard
///
/// No more tasks are in flight than there are workers, and a tree reduce is
/// only submitted once both of its inputs are resolved, so workers never wait
/// on each other.
pub struct HierarchicalScheduler {
    threads: usize,
    max_outstanding_merges: usize,
    abort: Arc<dyn AbortSignal>,
    runtime_limit: Option<Duration>,
    metrics: SchedulerMetrics,
}

impl HierarchicalScheduler {
    /// # Errors
    ///
    /// [`SchedulerError::InvalidConfig`] for zero threads or a zero merge bound.
    pub fn new(threads: usize, max_outstanding_merges: usize, metrics: SchedulerMetrics) -> Result<Self> {
        if threads == 0 {
            return Err(SchedulerError::InvalidConfig("thread count must be at least 1".into()).into());
        }
        if max_outstanding_merges == 0 {
            return Err(SchedulerError::InvalidConfig("max_outstanding_merges must be at least 1".into()).into());
        }
        Ok(Self {
            threads,
            max_outstanding_merges,
            abort: Arc::new(NeverAbort),
            runtime_limit: None,
            metrics,
        })
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

    #[must_use]
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Traverse every shard in parallel and combine the results in shard order.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::IntervalReduceInParallel`] for a walker that
    /// aggregates by interval. Otherwise the first failure raised by any
    /// shard, tree reduce, output merge, the walker's completion hook or the
    /// tracker. Once a failure is seen no
    /// further work is submitted; work already running is allowed to finish.
    pub fn execute<W, I, S, T>(&self, walker: &W, shards: I, tracker: &T) -> Result<Reduced<W::Result, PosOf<W::Record>>>
    where
        W: TreeReducible,
        I: IntoIterator<Item = S>,
        S: Shard<Record = W::Record>,
        T: OutputTracker,
    {
        if walker.reduce_by_interval() {
            bail!(SchedulerError::IntervalReduceInParallel { threads: self.threads });
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .thread_name(|i| format!("shardwalk-worker-{i}"))
            .build()?;
        let engines = EnginePool::new(self.threads);
        let errors = ErrorTracker::new();

        self.metrics.record_start();
        info!(mode = "hierarchical", threads = self.threads, "starting traversal");

        let outcome = self.traverse_all(&pool, walker, shards, tracker, &engines, &errors);

        engines.shutdown(&self.metrics);
        self.metrics.record_end();
        match &outcome {
            Ok(_) => {
                let snapshot = self.metrics.snapshot();
                info!(
                    mode = "hierarchical",
                    shards = snapshot.shards_traversed,
                    tree_reduces = snapshot.tree_reduces,
                    "traversal finished"
                );
            }
            Err(err) => {
                debug!(error = %err, "hierarchical traversal failed");
                if let Err(close_err) = tracker.close() {
                    debug!(error = %close_err, "closing output after failure also failed");
                }
            }
        }
        outcome
    }

    fn traverse_all<W, I, S, T>(
        &self,
        pool: &rayon::ThreadPool,
        walker: &W,
        shards: I,
        tracker: &T,
        engines: &EnginePool,
        errors: &ErrorTracker,
    ) -> Result<Reduced<W::Result, PosOf<W::Record>>>
    where
        W: TreeReducible,
        I: IntoIterator<Item = S>,
        S: Shard<Record = W::Record>,
        T: OutputTracker,
    {
        let ctx = TaskContext {
            walker,
            tracker,
            engines,
            errors,
            metrics: &self.metrics,
        };
        let slots = WorkerSlots::new(self.threads);
        let mut merges = MergeQueue::new(self.max_outstanding_merges);

        // Every task spawned in the scope has finished by the time it returns.
        let root = pool.in_place_scope_fifo(|scope| {
            self.schedule(scope, ctx, &slots, shards, &mut merges)
        })?;
        errors.check()?;

        merges.drain(tracker, errors, &self.metrics)?;
        let value = match root {
            Some(root) => root.wait().map_err(|e| errors.resolve(e))?,
            None => {
                debug!("no shards were traversed; reporting the walker's initial value");
                walker.init()
            }
        };
        errors.check()?;

        let reduced = Reduced::Whole(value);
        let mut out = tracker.direct()?;
        walker.on_finish(&reduced, &mut *out)?;
        out.flush()?;
        drop(out);
        tracker.close()?;
        Ok(reduced)
    }

    fn schedule<'scope, 'r: 'scope, W, I, S, T>(
        &self,
        scope: &rayon::ScopeFifo<'scope>,
        ctx: TaskContext<'r, W, T>,
        slots: &'r WorkerSlots,
        shards: I,
        merges: &mut MergeQueue<T::Staged>,
    ) -> Result<Option<AsyncResult<W::Result>>>
    where
        W: TreeReducible,
        I: IntoIterator<Item = S>,
        S: Shard<Record = W::Record> + 'scope,
        T: OutputTracker,
    {
        let stop = StopCheck::new(&*self.abort, self.runtime_limit);
        let mut tree = ReduceTree::new();
        let mut reduces = ReduceQueue::default();
        let mut shards = shards.into_iter().enumerate();
        let mut feeding = true;

        loop {
            ctx.errors.check()?;
            merges.merge_ready(ctx.tracker, ctx.errors, ctx.metrics)?;

            if !feeding {
                if reduces.is_empty() {
                    break;
                }
                if let Some(reduce) = reduces.pop_ready() {
                    let task = TreeReduceTask { reduce, slot: slots.acquire() };
                    scope.spawn_fifo(move |_| task.run(ctx));
                } else {
                    debug!(parked = reduces.len(), "waiting for tree reduce inputs");
                    reduces.wait_front();
                }
                continue;
            }

            let slot = slots.acquire();
            if ctx.errors.has_error() {
                continue;
            }
            if let Some(reduce) = reduces.pop_ready() {
                let task = TreeReduceTask { reduce, slot };
                scope.spawn_fifo(move |_| task.run(ctx));
                continue;
            }

            let next = if stop.should_stop() {
                info!(shards_submitted = tree.entries(), "abort requested; folding the shards submitted so far");
                None
            } else if ctx.walker.is_done() {
                info!(shards_submitted = tree.entries(), "walker is done; skipping remaining shards");
                None
            } else {
                shards.next()
            };
            let Some((index, shard)) = next else {
                drop(slot);
                feeding = false;
                tree.complete(&mut reduces);
                debug!(shards = tree.entries(), parked = reduces.len(), "all shards submitted");
                continue;
            };

            merges.make_room(ctx.tracker, ctx.errors, ctx.metrics)?;
            let (result, shard_result) = promise();
            let (output, shard_output) = promise();
            merges.push(shard_output, ctx.metrics);
            tree.add_entry(shard_result, &mut reduces)?;
            debug!(shard = index, in_flight = slots.in_flight(), "submitting shard");
            let task: ShardTask<'r, W, S, T> = ShardTask { index, shard, result, output, slot };
            scope.spawn_fifo(move |_| task.run(ctx));
        }

        Ok(tree.result())
    }
}
