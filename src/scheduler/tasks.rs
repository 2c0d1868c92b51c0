//! Units of work submitted to the hierarchical scheduler's worker pool.

use anyhow::Result;
use std::collections::VecDeque;
use std::io::Write;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Instant;
use tracing::debug;

use crate::accumulator::StandardAccumulator;
use crate::async_result::{promise, AsyncResult, Promise};
use crate::engine::EnginePool;
use crate::error::{panic_message, ErrorTracker, SchedulerError};
use crate::metrics::SchedulerMetrics;
use crate::output::{OutputMerge, OutputTracker};
use crate::reduce_tree::TreeReduceNotifier;
use crate::shard::Shard;
use crate::walker::{TreeReducible, Walker};

/// Shared handles every task needs.
pub(crate) struct TaskContext<'r, W, T: ?Sized> {
    pub walker: &'r W,
    pub tracker: &'r T,
    pub engines: &'r EnginePool,
    pub errors: &'r ErrorTracker,
    pub metrics: &'r SchedulerMetrics,
}

impl<W, T: ?Sized> Clone for TaskContext<'_, W, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<W, T: ?Sized> Copy for TaskContext<'_, W, T> {}

fn latched<T>() -> Result<T> {
    Err(SchedulerError::FailureLatched.into())
}

/// Traverses one shard into a staging area.
pub(crate) struct ShardTask<'r, W: Walker, S, T: OutputTracker + ?Sized> {
    pub index: usize,
    pub shard: S,
    pub result: Promise<W::Result>,
    pub output: Promise<OutputMerge<T::Staged>>,
    pub slot: SlotGuard<'r>,
}

impl<'r, W, S, T> ShardTask<'r, W, S, T>
where
    W: Walker,
    S: Shard<Record = W::Record>,
    T: OutputTracker + ?Sized,
{
    /// Traverse the shard and complete both promises. Never panics.
    pub fn run(self, ctx: TaskContext<'r, W, T>) {
        let ShardTask { index, shard, result, output, slot } = self;
        let started = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| traverse_shard(&ctx, &shard)))
            .unwrap_or_else(|payload| Err(SchedulerError::WorkerPanicked(panic_message(payload)).into()));
        match outcome {
            Ok((value, staged)) => {
                ctx.metrics.record_shard(started.elapsed());
                debug!(shard = index, location = %shard.describe(), "shard traversed");
                output.complete(Ok(OutputMerge::new(index, staged)));
                result.complete(Ok(value));
            }
            Err(err) => {
                debug!(shard = index, "shard traversal failed");
                ctx.errors.notify(err);
                output.complete(latched());
                result.complete(latched());
            }
        }
        drop(slot);
    }
}

fn traverse_shard<W, S, T>(ctx: &TaskContext<'_, W, T>, shard: &S) -> Result<(W::Result, T::Staged)>
where
    W: Walker,
    S: Shard<Record = W::Record>,
    T: OutputTracker + ?Sized,
{
    let worker = rayon::current_thread_index().unwrap_or(0);
    let mut engine = ctx.engines.borrow(worker)?;
    let mut staged = ctx.tracker.stage()?;
    let mut acc = StandardAccumulator::new(ctx.walker);
    engine.traverse(ctx.walker, shard, &mut acc, &mut staged)?;
    staged.flush()?;
    Ok((acc.into_value(), staged))
}

/// A combine whose inputs are not necessarily resolved yet.
pub(crate) struct PendingReduce<T> {
    lhs: AsyncResult<T>,
    rhs: AsyncResult<T>,
    result: Promise<T>,
}

impl<T> PendingReduce<T> {
    fn is_ready(&self) -> bool {
        self.lhs.is_done() && self.rhs.is_done()
    }

    fn wait_ready(&self) {
        self.lhs.wait_ready();
        self.rhs.wait_ready();
    }
}

/// Combines two resolved partial results.
pub(crate) struct TreeReduceTask<'r, T> {
    pub reduce: PendingReduce<T>,
    pub slot: SlotGuard<'r>,
}

impl<'r, T: Send + 'static> TreeReduceTask<'r, T> {
    pub fn run<W, O>(self, ctx: TaskContext<'r, W, O>)
    where
        W: TreeReducible<Result = T>,
        O: ?Sized,
    {
        let TreeReduceTask { reduce, slot } = self;
        let PendingReduce { lhs, rhs, result } = reduce;
        let started = Instant::now();
        let outcome = lhs.wait().and_then(|lhs| {
            let rhs = rhs.wait()?;
            catch_unwind(AssertUnwindSafe(|| ctx.walker.tree_reduce(lhs, rhs)))
                .unwrap_or_else(|payload| Err(SchedulerError::WorkerPanicked(panic_message(payload)).into()))
        });
        match outcome {
            Ok(value) => {
                ctx.metrics.record_tree_reduce(started.elapsed());
                debug!("tree reduce finished");
                result.complete(Ok(value));
            }
            Err(err) => {
                ctx.errors.notify(err);
                result.complete(latched());
            }
        }
        drop(slot);
    }
}

/// Reduce tree callback that parks combines until the scheduler submits them.
pub(crate) struct ReduceQueue<T> {
    pending: VecDeque<PendingReduce<T>>,
}

impl<T> Default for ReduceQueue<T> {
    fn default() -> Self {
        Self { pending: VecDeque::new() }
    }
}

impl<T> ReduceQueue<T> {
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// The oldest combine whose inputs are both resolved.
    pub fn pop_ready(&mut self) -> Option<PendingReduce<T>> {
        let index = self.pending.iter().position(PendingReduce::is_ready)?;
        self.pending.remove(index)
    }

    /// Block until the oldest parked combine has both inputs.
    ///
    /// The oldest combine only ever depends on shards and combines that were
    /// already submitted, so this always returns.
    pub fn wait_front(&self) {
        if let Some(front) = self.pending.front() {
            front.wait_ready();
        }
    }
}

impl<T> TreeReduceNotifier<T> for ReduceQueue<T> {
    fn notify_reduce(&mut self, lhs: AsyncResult<T>, rhs: AsyncResult<T>) -> AsyncResult<T> {
        let (result, combined) = promise();
        self.pending.push_back(PendingReduce { lhs, rhs, result });
        combined
    }
}

/// Caps the number of tasks in flight at the worker count.
pub(crate) struct WorkerSlots {
    in_flight: Mutex<usize>,
    freed: Condvar,
    capacity: usize,
}

impl WorkerSlots {
    pub fn new(capacity: usize) -> Self {
        Self {
            in_flight: Mutex::new(0),
            freed: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    /// Wait for a free worker and claim it until the guard drops.
    pub fn acquire(&self) -> SlotGuard<'_> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        while *in_flight >= self.capacity {
            in_flight = self.freed.wait(in_flight).unwrap_or_else(PoisonError::into_inner);
        }
        *in_flight += 1;
        SlotGuard { slots: self }
    }

    pub fn in_flight(&self) -> usize {
        *self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One claimed worker slot.
pub(crate) struct SlotGuard<'s> {
    slots: &'s WorkerSlots,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.slots.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        *in_flight = in_flight.saturating_sub(1);
        self.slots.freed.notify_one();
    }
}
