//! Per-worker traversal engines.
//!
//! A [`Traverser`] drives the window adapter over one shard and folds the
//! walker across the resulting windows. Each worker thread owns one: the
//! [`EnginePool`] creates them up front, pins engine `i` to worker `i`, and
//! lends it out for the duration of one task. The loan is a guard, so the
//! engine goes back to the pool even when the task fails.
//!
//! If a worker re-enters the pool while already holding its engine (walker
//! code that itself waits on pool work can cause this), it gets a temporary
//! engine whose counters are folded back into the pool on release.

use anyhow::Result;
use std::io::Write;
use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};
use tracing::{debug, trace};

use crate::accumulator::Fold;
use crate::error::SchedulerError;
use crate::interval::PosOf;
use crate::metrics::SchedulerMetrics;
use crate::shard::Shard;
use crate::walker::Walker;
use crate::window::WindowMaker;

/// Drives a walker over shards, counting what it sees.
#[derive(Debug, Default)]
pub struct Traverser {
    worker: usize,
    shards: u64,
    windows: u64,
    records: u64,
}

impl Traverser {
    #[must_use]
    pub fn new(worker: usize) -> Self {
        Self { worker, ..Self::default() }
    }

    #[must_use]
    pub fn worker(&self) -> usize {
        self.worker
    }

    #[must_use]
    pub fn shards(&self) -> u64 {
        self.shards
    }

    #[must_use]
    pub fn windows(&self) -> u64 {
        self.windows
    }

    #[must_use]
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Visit every window of `shard` in span order, folding each through `fold`.
    ///
    /// # Errors
    ///
    /// Failures opening the shard, unsorted spans, out-of-order records, and
    /// anything the walker or the fold reports.
    pub fn traverse<W, S, F>(&mut self, walker: &W, shard: &S, fold: &mut F, out: &mut dyn Write) -> Result<()>
    where
        W: Walker,
        S: Shard<Record = W::Record> + ?Sized,
        F: Fold<W::Result, PosOf<W::Record>>,
    {
        let records = shard.open()?;
        let mut maker = WindowMaker::new(records, shard.spans())?;
        while let Some(mut window) = maker.next_window() {
            let span = window.span().cloned();
            let acc = fold.reduce_init(span.as_ref());
            let result = walker.process_window(acc, &mut window, out)?;
            let yielded = window.yielded();
            drop(window);
            maker.check()?;

            trace!(worker = self.worker, span = ?span, records = yielded, "window traversed");
            self.windows += 1;
            self.records += yielded as u64;
            fold.accumulate(span.as_ref(), result)?;
        }
        self.shards += 1;
        Ok(())
    }

    fn absorb(&mut self, other: &Traverser) {
        self.shards += other.shards;
        self.windows += other.windows;
        self.records += other.records;
    }
}

/// Fixed set of traversers, one pinned to each worker.
pub struct EnginePool {
    engines: Vec<Mutex<Traverser>>,
    overflow: Mutex<Traverser>,
}

impl EnginePool {
    /// Create `workers` engines; worker `i` always receives engine `i`.
    #[must_use]
    pub fn new(workers: usize) -> Self {
        Self {
            engines: (0..workers).map(|i| Mutex::new(Traverser::new(i))).collect(),
            overflow: Mutex::new(Traverser::new(usize::MAX)),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.engines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// Lend worker `worker` its engine until the guard drops.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::EngineUnavailable`] if no engine was created for `worker`.
    pub fn borrow(&self, worker: usize) -> Result<EngineGuard<'_>, SchedulerError> {
        let slot = self
            .engines
            .get(worker)
            .ok_or(SchedulerError::EngineUnavailable(worker))?;
        match slot.try_lock() {
            Ok(engine) => Ok(EngineGuard::Pinned(engine)),
            Err(TryLockError::Poisoned(poisoned)) => Ok(EngineGuard::Pinned(poisoned.into_inner())),
            Err(TryLockError::WouldBlock) => {
                debug!(worker, "engine already lent to this worker; using a temporary engine");
                Ok(EngineGuard::Temporary {
                    engine: Traverser::new(worker),
                    pool: self,
                })
            }
        }
    }

    /// Fold every engine's counters into `metrics`.
    pub fn shutdown(self, metrics: &SchedulerMetrics) {
        let overflow = self.overflow.into_inner().unwrap_or_else(PoisonError::into_inner);
        let mut total = Traverser::default();
        total.absorb(&overflow);
        for engine in self.engines {
            let engine = engine.into_inner().unwrap_or_else(PoisonError::into_inner);
            debug!(
                worker = engine.worker,
                shards = engine.shards,
                windows = engine.windows,
                records = engine.records,
                "engine shut down"
            );
            total.absorb(&engine);
        }
        metrics.record_traversal_counts(total.windows, total.records);
    }
}

/// An engine on loan to one task.
pub enum EngineGuard<'p> {
    Pinned(MutexGuard<'p, Traverser>),
    Temporary { engine: Traverser, pool: &'p EnginePool },
}

impl Deref for EngineGuard<'_> {
    type Target = Traverser;

    fn deref(&self) -> &Traverser {
        match self {
            EngineGuard::Pinned(engine) => &**engine,
            EngineGuard::Temporary { engine, .. } => engine,
        }
    }
}

impl DerefMut for EngineGuard<'_> {
    fn deref_mut(&mut self) -> &mut Traverser {
        match self {
            EngineGuard::Pinned(engine) => &mut **engine,
            EngineGuard::Temporary { engine, .. } => engine,
        }
    }
}

impl Drop for EngineGuard<'_> {
    fn drop(&mut self) {
        if let EngineGuard::Temporary { engine, pool } = self {
            pool.overflow
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .absorb(engine);
        }
    }
}
