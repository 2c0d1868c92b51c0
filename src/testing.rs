//! Testing utilities for shardwalk schedulers and walkers.
//!
//! This module bundles the pieces most scheduler tests need:
//!
//! - **Fixtures**: a positioned [`Record`] type and walkers with well-known
//!   answers ([`CountRecords`], [`CollectPositions`], [`FailingWalker`],
//!   [`StopAfter`], [`CountPerInterval`], [`SlowCount`])
//! - **Builders**: [`ShardBuilder`] for single shards and
//!   [`shards_with_counts`] for shard lists
//!
//! # Quick Start
//!
//! ```
//! use shardwalk::output::MemoryOutputTracker;
//! use shardwalk::scheduler::{Scheduler, SchedulerConfig};
//! use shardwalk::testing::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let output = MemoryOutputTracker::new();
//! let scheduler = Scheduler::new(SchedulerConfig::hierarchical(2))?;
//! let positions = scheduler.run(&CollectPositions, shards_with_counts(&[2, 1]), &output)?;
//!
//! assert_eq!(positions.into_whole(), Some(vec![0, 1, 2]));
//! assert_eq!(output.contents_string(), "0\n1\n2\ntotal 3\n");
//! # Ok(())
//! # }
//! ```
//!
//! # Failures
//!
//! [`FailingWalker`] returns a [`FixtureFailure`] (or panics) at a chosen
//! position, which makes fail-fast behavior easy to check:
//!
//! ```
//! use shardwalk::output::MemoryOutputTracker;
//! use shardwalk::scheduler::{Scheduler, SchedulerConfig};
//! use shardwalk::testing::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let scheduler = Scheduler::new(SchedulerConfig::linear())?;
//! let err = scheduler
//!     .run(&FailingWalker::error_at(4), shards_with_counts(&[3, 3]), &MemoryOutputTracker::new())
//!     .unwrap_err();
//! assert_eq!(err.downcast_ref::<FixtureFailure>(), Some(&FixtureFailure(4)));
//! # Ok(())
//! # }
//! ```

pub mod builders;
pub mod fixtures;

pub use builders::*;
pub use fixtures::*;
