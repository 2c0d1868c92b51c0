//! # Shardwalk
//!
//! A **shard scheduling engine** for ordered, position-sorted data. Shardwalk
//! takes a stream of shards (contiguous partitions of the input, optionally
//! restricted to spans of interest), applies a user-defined fold to every
//! record window, and combines the partial results into one answer, either on
//! the calling thread or on a fixed pool of workers.
//!
//! ## Key Features
//!
//! - **Windowed traversal** - one lazy window per span, fed from a single pass over the shard
//! - **Two execution strategies** - a linear fold, or parallel traversal with a reduce tree
//! - **Order-preserving reduction** - partial results are always combined left to right
//! - **Bounded output merging** - per-shard output is staged and merged in shard order
//! - **Per-interval aggregation** - one result per interval, in linear mode
//! - **Fail-fast** - the first failure stops scheduling and is returned unchanged
//! - **Cooperative abort** - flags, closures and runtime limits stop new work cleanly
//!
//! ## Quick Start
//!
//! ```
//! use shardwalk::output::MemoryOutputTracker;
//! use shardwalk::scheduler::{Scheduler, SchedulerConfig};
//! use shardwalk::testing::{CountRecords, shards_with_counts};
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! // Five shards holding 3, 0, 5, 2 and 4 records
//! let shards = shards_with_counts(&[3, 0, 5, 2, 4]);
//!
//! // Traverse them on three workers and add up the per-shard counts
//! let scheduler = Scheduler::new(SchedulerConfig::hierarchical(3))?;
//! let total = scheduler.run(&CountRecords, shards, &MemoryOutputTracker::new())?;
//!
//! assert_eq!(total.into_whole(), Some(14));
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Shards and windows
//!
//! A [`Shard`] yields its records in position order together with an
//! ascending list of [`Span`]s. The [`window`] adapter turns that into one
//! [`Window`] per span; records outside every span are skipped and never
//! reach the walker. A shard without spans is traversed as one unfiltered
//! window.
//!
//! ### Walkers
//!
//! A [`Walker`] is the computation: a zero value ([`init`](Walker::init)), a
//! per-window fold ([`process_window`](Walker::process_window)) and a
//! completion hook. Walkers that also implement [`TreeReducible`] supply an
//! associative combine and can run in parallel.
//!
//! ### Execution
//!
//! 1. [`Scheduler`] validates the configuration and picks a strategy
//! 2. [`LinearScheduler`] threads one accumulator through every shard, or
//! 3. [`HierarchicalScheduler`] runs shards on workers, feeds their results
//!    into a [`ReduceTree`], and merges staged output through a bounded queue
//! 4. The walker's completion hook sees the final answer exactly once
//!
//! ## Module Overview
//!
//! - [`interval`] - positions, located records and closed spans
//! - [`window`] - the window adapter
//! - [`shard`] - the shard abstraction and in-memory shards
//! - [`walker`] - the walker traits and final result type
//! - [`accumulator`] - standard and per-interval accumulation
//! - [`reduce_tree`] - binary reduce tree over asynchronous results
//! - [`engine`] - per-worker traversal engines
//! - [`output`] - output trackers and the bounded merge queue
//! - [`scheduler`] - configuration, strategy selection and both schedulers
//! - [`abort`] - cooperative cancellation
//! - [`metrics`] - run statistics
//! - [`testing`] - fixtures for tests

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod abort;
pub mod accumulator;
pub mod async_result;
pub mod engine;
pub mod error;
pub mod interval;
pub mod metrics;
pub mod output;
pub mod reduce_tree;
pub mod scheduler;
pub mod shard;
pub mod testing;
pub mod walker;
pub mod window;

// General re-exports
pub use abort::{AbortFlag, AbortSignal, NeverAbort, RuntimeLimit};
pub use async_result::{promise, AsyncResult, Promise};
pub use error::{ErrorTracker, SchedulerError};
pub use interval::{Located, Position, Span};
pub use metrics::{MetricsSnapshot, SchedulerMetrics};
pub use output::{MemoryOutputTracker, MergeQueue, OutputMerge, OutputTracker};
pub use reduce_tree::{ReduceTree, TreeReduceNotifier};
pub use scheduler::{ExecMode, HierarchicalScheduler, LinearScheduler, Scheduler, SchedulerConfig};
pub use shard::{MemoryShard, Shard};
pub use walker::{Reduced, TreeReducible, Walker};
pub use window::{Window, WindowMaker};

// Gated re-exports
#[cfg(feature = "file-output")]
pub use output::FileOutputTracker;
