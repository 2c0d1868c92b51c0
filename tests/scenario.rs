//! Five shards holding 3, 0, 5, 2 and 4 records, counted under different
//! worker counts.

use anyhow::Result;
use shardwalk::output::MemoryOutputTracker;
use shardwalk::scheduler::{HierarchicalScheduler, Scheduler, SchedulerConfig};
use shardwalk::testing::*;
use shardwalk::SchedulerMetrics;

const COUNTS: [usize; 5] = [3, 0, 5, 2, 4];

fn count_on_pool(threads: usize, max_outstanding_merges: usize) -> Result<Option<u64>> {
    let scheduler = HierarchicalScheduler::new(threads, max_outstanding_merges, SchedulerMetrics::new())?;
    let count = scheduler.execute(&CountRecords, shards_with_counts(&COUNTS), &MemoryOutputTracker::new())?;
    Ok(count.into_whole())
}

#[test]
fn single_worker_pool_counts_fourteen() -> Result<()> {
    assert_eq!(count_on_pool(1, 50)?, Some(14));
    Ok(())
}

#[test]
fn three_worker_pool_counts_fourteen() -> Result<()> {
    assert_eq!(count_on_pool(3, 50)?, Some(14));
    Ok(())
}

#[test]
fn tight_merge_bound_counts_fourteen() -> Result<()> {
    assert_eq!(count_on_pool(3, 1)?, Some(14));
    Ok(())
}

#[test]
fn repeated_runs_agree() -> Result<()> {
    for _ in 0..20 {
        assert_eq!(count_on_pool(3, 50)?, Some(14));
    }
    Ok(())
}

#[test]
fn every_configured_mode_counts_fourteen() -> Result<()> {
    for config in [
        SchedulerConfig::linear(),
        SchedulerConfig::hierarchical(1),
        SchedulerConfig::hierarchical(3),
        SchedulerConfig::default(),
    ] {
        let scheduler = Scheduler::new(config)?;
        let count = scheduler.run(&CountRecords, shards_with_counts(&COUNTS), &MemoryOutputTracker::new())?;
        assert_eq!(count.into_whole(), Some(14), "{:?}", scheduler.config());
    }
    Ok(())
}
