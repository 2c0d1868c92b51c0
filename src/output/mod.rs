//! Output tracking: where walker output goes and how per-shard output is merged.
//!
//! Linear runs write straight to the tracker's [`direct`](OutputTracker::direct)
//! writer. Parallel runs give every shard its own staging area from
//! [`stage`](OutputTracker::stage); once a shard finishes, its staged output is
//! wrapped in an [`OutputMerge`] descriptor and queued on a [`MergeQueue`],
//! which merges descriptors into the destination strictly in shard submission
//! order. The result is byte-identical to what a linear run would have written.
//!
//! Backends:
//!
//! - [`MemoryOutputTracker`]: shared in-memory buffer
//! - [`FileOutputTracker`]: one destination file, staging in temporary files
//!   (requires the `file-output` feature)

use anyhow::Result;
use std::io::Write;

mod memory;
mod merge;

#[cfg_attr(docsrs, doc(cfg(feature = "file-output")))]
#[cfg(feature = "file-output")]
mod file;

#[cfg(feature = "file-output")]
pub use file::FileOutputTracker;
pub use memory::MemoryOutputTracker;
pub use merge::MergeQueue;

/// Owner of a run's output streams.
pub trait OutputTracker: Send + Sync {
    /// Per-shard staging area handed out in parallel runs.
    type Staged: Write + Send + 'static;

    /// Writer to the final destination.
    ///
    /// # Errors
    ///
    /// Backend failures opening the destination.
    fn direct(&self) -> Result<Box<dyn Write + '_>>;

    /// A fresh staging area for one shard.
    ///
    /// # Errors
    ///
    /// Backend failures creating the staging area.
    fn stage(&self) -> Result<Self::Staged>;

    /// Append a finished staging area to the destination.
    ///
    /// # Errors
    ///
    /// Backend failures reading the staged data or writing the destination.
    fn merge(&self, staged: Self::Staged) -> Result<()>;

    /// Flush and finalize the destination. Called once at the end of a run.
    ///
    /// # Errors
    ///
    /// Backend failures flushing the destination.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Staged output of one finished shard, waiting to be merged.
#[derive(Debug)]
pub struct OutputMerge<S> {
    /// Submission index of the shard that produced it.
    pub shard: usize,
    pub staged: S,
}

impl<S> OutputMerge<S> {
    #[must_use]
    pub fn new(shard: usize, staged: S) -> Self {
        Self { shard, staged }
    }
}
