//! Run statistics for the schedulers.
//!
//! [`SchedulerMetrics`] is a cheap, cloneable handle that worker threads and
//! the scheduling thread update concurrently. It tracks how long shard
//! traversals, tree reduces and output merges took, how much data passed
//! through, and the highest number of output merges that were ever waiting at
//! once (the backpressure high-water mark).
//!
//! # Example
//!
//! ```no_run
//! use shardwalk::metrics::SchedulerMetrics;
//!
//! # fn main() -> anyhow::Result<()> {
//! let metrics = SchedulerMetrics::new();
//! // ... hand `metrics.clone()` to a scheduler and run it ...
//! metrics.print();
//! metrics.save_to_file("scheduler-metrics.json")?;
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Thread-safe collector of scheduler statistics.
#[derive(Clone, Default)]
pub struct SchedulerMetrics {
    inner: Arc<Mutex<MetricsInner>>,
}

#[derive(Default)]
struct MetricsInner {
    snapshot: MetricsSnapshot,
    start_time: Option<Instant>,
    end_time: Option<Instant>,
}

/// Point-in-time copy of every statistic.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub shards_traversed: u64,
    pub shard_traverse_ms: u64,
    pub tree_reduces: u64,
    pub tree_reduce_ms: u64,
    pub output_merges: u64,
    pub output_merge_ms: u64,
    pub windows_processed: u64,
    pub records_processed: u64,
    pub peak_pending_merges: usize,
    pub execution_time_ms: Option<u64>,
}

impl MetricsSnapshot {
    /// Mean wall time per shard traversal.
    #[must_use]
    pub fn avg_shard_traverse_ms(&self) -> u64 {
        self.shard_traverse_ms.checked_div(self.shards_traversed).unwrap_or(0)
    }

    /// Mean wall time per tree reduce.
    #[must_use]
    pub fn avg_tree_reduce_ms(&self) -> u64 {
        self.tree_reduce_ms.checked_div(self.tree_reduces).unwrap_or(0)
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl SchedulerMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MetricsInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the start time of a run.
    pub fn record_start(&self) {
        self.lock().start_time = Some(Instant::now());
    }

    /// Record the end time of a run.
    pub fn record_end(&self) {
        self.lock().end_time = Some(Instant::now());
    }

    /// Elapsed run time, once both ends were recorded.
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        let inner = self.lock();
        match (inner.start_time, inner.end_time) {
            (Some(start), Some(end)) => Some(end.duration_since(start)),
            _ => None,
        }
    }

    /// One shard finished traversing after `took`.
    pub fn record_shard(&self, took: Duration) {
        let mut inner = self.lock();
        inner.snapshot.shards_traversed += 1;
        inner.snapshot.shard_traverse_ms += millis(took);
    }

    /// One pair of partial results was combined after `took`.
    pub fn record_tree_reduce(&self, took: Duration) {
        let mut inner = self.lock();
        inner.snapshot.tree_reduces += 1;
        inner.snapshot.tree_reduce_ms += millis(took);
    }

    /// `merged` staged outputs were merged into the destination after `took`.
    pub fn record_output_merge(&self, merged: usize, took: Duration) {
        let mut inner = self.lock();
        inner.snapshot.output_merges += merged as u64;
        inner.snapshot.output_merge_ms += millis(took);
    }

    /// Window and record totals gathered from the engines.
    pub fn record_traversal_counts(&self, windows: u64, records: u64) {
        let mut inner = self.lock();
        inner.snapshot.windows_processed += windows;
        inner.snapshot.records_processed += records;
    }

    /// Note the current number of unmerged outputs, keeping the maximum.
    pub fn observe_pending_merges(&self, pending: usize) {
        let mut inner = self.lock();
        inner.snapshot.peak_pending_merges = inner.snapshot.peak_pending_merges.max(pending);
    }

    /// Copy of every statistic.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.lock();
        let mut snapshot = inner.snapshot.clone();
        if let (Some(start), Some(end)) = (inner.start_time, inner.end_time) {
            snapshot.execution_time_ms = Some(millis(end.duration_since(start)));
        }
        snapshot
    }

    /// All statistics as a JSON object.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let s = self.snapshot();
        json!({
            "shards_traversed": s.shards_traversed,
            "shard_traverse_ms": { "total": s.shard_traverse_ms, "avg": s.avg_shard_traverse_ms() },
            "tree_reduces": s.tree_reduces,
            "tree_reduce_ms": { "total": s.tree_reduce_ms, "avg": s.avg_tree_reduce_ms() },
            "output_merges": s.output_merges,
            "output_merge_ms": s.output_merge_ms,
            "windows_processed": s.windows_processed,
            "records_processed": s.records_processed,
            "peak_pending_merges": s.peak_pending_merges,
            "execution_time_ms": s.execution_time_ms,
        })
    }

    /// Print all statistics to stdout in a human-readable format.
    pub fn print(&self) {
        let s = self.snapshot();
        println!("\n========== Scheduler Metrics ==========");
        if let Some(ms) = s.execution_time_ms {
            println!("Execution Time: {:.3}s ({ms} ms)", Duration::from_millis(ms).as_secs_f64());
            println!("---------------------------------------");
        }
        println!(
            "shards traversed: {} (total {} ms, avg {} ms)",
            s.shards_traversed,
            s.shard_traverse_ms,
            s.avg_shard_traverse_ms()
        );
        println!(
            "tree reduces: {} (total {} ms, avg {} ms)",
            s.tree_reduces,
            s.tree_reduce_ms,
            s.avg_tree_reduce_ms()
        );
        println!("output merges: {} ({} ms)", s.output_merges, s.output_merge_ms);
        println!("windows: {}, records: {}", s.windows_processed, s.records_processed);
        println!("peak pending merges: {}", s.peak_pending_merges);
        println!("=======================================\n");
    }

    /// Save all statistics to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written to.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        let formatted = serde_json::to_string_pretty(&self.to_json())?;
        file.write_all(formatted.as_bytes())?;
        Ok(())
    }
}
