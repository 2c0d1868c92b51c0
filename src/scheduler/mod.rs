//! Scheduling shards onto traversal engines.
//!
//! [`Scheduler`] is the entry point. It validates a [`SchedulerConfig`] and
//! picks an execution strategy per run:
//!
//! - one thread: [`LinearScheduler`] folds every shard on the calling thread
//!   with a single running value
//! - more threads: [`HierarchicalScheduler`] traverses shards on a fixed
//!   worker pool and combines their results through a reduce tree, merging
//!   staged shard output in submission order
//!
//! ```
//! use shardwalk::output::MemoryOutputTracker;
//! use shardwalk::scheduler::{Scheduler, SchedulerConfig};
//! use shardwalk::testing::{CountRecords, shards_with_counts};
//!
//! # fn main() -> anyhow::Result<()> {
//! let scheduler = Scheduler::new(SchedulerConfig::hierarchical(3))?;
//! let shards = shards_with_counts(&[3, 0, 5, 2, 4]);
//! let total = scheduler.run(&CountRecords, shards, &MemoryOutputTracker::new())?;
//! assert_eq!(total.into_whole(), Some(14));
//! # Ok(())
//! # }
//! ```

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::abort::{AbortSignal, NeverAbort};
use crate::error::SchedulerError;
use crate::interval::{PosOf, Span};
use crate::metrics::SchedulerMetrics;
use crate::output::OutputTracker;
use crate::shard::Shard;
use crate::walker::{Reduced, TreeReducible, Walker};

mod hierarchical;
mod linear;
mod tasks;

pub use hierarchical::HierarchicalScheduler;
pub use linear::LinearScheduler;

/// Most output merges a parallel run leaves pending before it blocks.
pub const DEFAULT_MAX_OUTSTANDING_MERGES: usize = 50;

/// How shards are executed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecMode {
    /// Every shard on the calling thread.
    Linear,
    /// A worker pool of `threads` threads (`None`: one per CPU).
    Hierarchical { threads: Option<usize> },
}

impl Default for ExecMode {
    fn default() -> Self {
        ExecMode::Hierarchical { threads: None }
    }
}

/// Scheduler settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub mode: ExecMode,
    /// Bound on staged shard outputs waiting to be merged.
    pub max_outstanding_merges: usize,
    /// Stop starting new shards once a run has lasted this long.
    pub runtime_limit: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            mode: ExecMode::default(),
            max_outstanding_merges: DEFAULT_MAX_OUTSTANDING_MERGES,
            runtime_limit: None,
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn linear() -> Self {
        Self { mode: ExecMode::Linear, ..Self::default() }
    }

    #[must_use]
    pub fn hierarchical(threads: usize) -> Self {
        Self {
            mode: ExecMode::Hierarchical { threads: Some(threads) },
            ..Self::default()
        }
    }

    /// Worker thread count this configuration asks for.
    #[must_use]
    pub fn threads(&self) -> usize {
        match self.mode {
            ExecMode::Linear => 1,
            ExecMode::Hierarchical { threads } => threads.unwrap_or_else(num_cpus::get),
        }
    }

    /// Reject impossible settings.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidConfig`] for a zero thread count or a zero merge bound.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.threads() == 0 {
            return Err(SchedulerError::InvalidConfig("thread count must be at least 1".into()));
        }
        if self.max_outstanding_merges == 0 {
            return Err(SchedulerError::InvalidConfig(
                "max_outstanding_merges must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Entry point: validated configuration plus per-run strategy selection.
pub struct Scheduler {
    config: SchedulerConfig,
    threads: usize,
    abort: Arc<dyn AbortSignal>,
    metrics: SchedulerMetrics,
}

impl Scheduler {
    /// # Errors
    ///
    /// [`SchedulerError::InvalidConfig`] if the configuration is impossible.
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        config.validate()?;
        let threads = config.threads();
        let cpus = num_cpus::get();
        if threads > cpus {
            warn!(threads, cpus, "more worker threads requested than CPUs available");
        }
        debug!(threads, ?config, "scheduler configured");
        Ok(Self {
            config,
            threads,
            abort: Arc::new(NeverAbort),
            metrics: SchedulerMetrics::new(),
        })
    }

    /// Poll `signal` before every new shard.
    #[must_use]
    pub fn with_abort(mut self, signal: impl AbortSignal + 'static) -> Self {
        self.abort = Arc::new(signal);
        self
    }

    /// Report into an existing metrics collector.
    #[must_use]
    pub fn with_metrics(mut self, metrics: SchedulerMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    #[must_use]
    pub fn metrics(&self) -> &SchedulerMetrics {
        &self.metrics
    }

    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    #[must_use]
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Traverse `shards` with `walker`, in parallel when more than one thread
    /// is configured.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::IntervalReduceInParallel`] for an interval-aggregating
    /// walker with more than one thread, [`SchedulerError::MissingIntervals`]
    /// for one without intervals, and the first failure of any shard, reduce
    /// or output merge.
    pub fn run<W, I, S, T>(&self, walker: &W, shards: I, tracker: &T) -> Result<Reduced<W::Result, PosOf<W::Record>>>
    where
        W: TreeReducible,
        I: IntoIterator<Item = S>,
        S: Shard<Record = W::Record>,
        T: OutputTracker,
    {
        if self.threads > 1 && walker.reduce_by_interval() {
            bail!(SchedulerError::IntervalReduceInParallel { threads: self.threads });
        }
        if self.threads == 1 {
            return self.linear().execute(walker, shards, tracker);
        }
        HierarchicalScheduler::new(self.threads, self.config.max_outstanding_merges, self.metrics.clone())?
            .with_abort(Arc::clone(&self.abort))
            .with_runtime_limit(self.config.runtime_limit)
            .execute(walker, shards, tracker)
    }

    /// Traverse `shards` on the calling thread, whatever the configured thread
    /// count. Works for walkers without a combine function.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::MissingIntervals`] for an interval-aggregating walker,
    /// and the first failure of any shard.
    pub fn run_linear<W, I, S, T>(
        &self,
        walker: &W,
        shards: I,
        tracker: &T,
    ) -> Result<Reduced<W::Result, PosOf<W::Record>>>
    where
        W: Walker,
        I: IntoIterator<Item = S>,
        S: Shard<Record = W::Record>,
        T: OutputTracker + ?Sized,
    {
        self.linear().execute(walker, shards, tracker)
    }

    /// Traverse `shards` keeping one result per interval.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::IntervalReduceInParallel`] when more than one thread
    /// is configured, and the first failure of any shard.
    pub fn run_by_interval<W, I, S, T>(
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
        if self.threads > 1 {
            bail!(SchedulerError::IntervalReduceInParallel { threads: self.threads });
        }
        self.linear().execute_by_interval(walker, intervals, shards, tracker)
    }

    fn linear(&self) -> LinearScheduler {
        LinearScheduler::new(self.metrics.clone())
            .with_abort(Arc::clone(&self.abort))
            .with_runtime_limit(self.config.runtime_limit)
    }
}
