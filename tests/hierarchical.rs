//! Tests for the hierarchical scheduler.

use anyhow::{bail, Result};
use shardwalk::abort::AbortFlag;
use shardwalk::error::SchedulerError;
use shardwalk::output::MemoryOutputTracker;
use shardwalk::scheduler::{HierarchicalScheduler, Scheduler, SchedulerConfig};
use shardwalk::shard::MemoryShard;
use shardwalk::testing::*;
use shardwalk::walker::{TreeReducible, Walker};
use shardwalk::window::Window;
use shardwalk::SchedulerMetrics;
use std::io::Write;
use std::thread;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Writes positions like `CollectPositions`, but the shard holding position
/// zero is slow, so later shards finish first.
struct SlowFirstShard;

impl Walker for SlowFirstShard {
    type Record = Record;
    type Result = Vec<u64>;

    fn init(&self) -> Vec<u64> {
        Vec::new()
    }

    fn process_window(&self, mut acc: Vec<u64>, window: &mut Window<'_, '_, Record>, out: &mut dyn Write) -> Result<Vec<u64>> {
        for record in window {
            if record.pos == 0 {
                thread::sleep(Duration::from_millis(60));
            }
            writeln!(out, "{}", record.pos)?;
            acc.push(record.pos);
        }
        Ok(acc)
    }
}

impl TreeReducible for SlowFirstShard {
    fn tree_reduce(&self, mut lhs: Vec<u64>, rhs: Vec<u64>) -> Result<Vec<u64>> {
        lhs.extend(rhs);
        Ok(lhs)
    }
}

/// Fails immediately on position zero and is slow everywhere else.
struct FailFirstThenCrawl;

impl Walker for FailFirstThenCrawl {
    type Record = Record;
    type Result = u64;

    fn init(&self) -> u64 {
        0
    }

    fn process_window(&self, acc: u64, window: &mut Window<'_, '_, Record>, _out: &mut dyn Write) -> Result<u64> {
        let mut n = 0;
        for record in window {
            if record.pos == 0 {
                bail!(FixtureFailure(0));
            }
            n += 1;
        }
        thread::sleep(Duration::from_millis(5));
        Ok(acc + n)
    }
}

impl TreeReducible for FailFirstThenCrawl {
    fn tree_reduce(&self, lhs: u64, rhs: u64) -> Result<u64> {
        Ok(lhs + rhs)
    }
}

// Respects RUST_LOG; a second call in the same process is a no-op.
fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_test_writer())
        .with(EnvFilter::from_default_env())
        .try_init();
}

fn hierarchical(threads: usize) -> Result<Scheduler> {
    init_logging();
    Scheduler::new(SchedulerConfig::hierarchical(threads))
}

#[test]
fn combines_results_in_shard_order() -> Result<()> {
    let output = MemoryOutputTracker::new();
    let counts = [4, 1, 0, 7, 3, 3, 9, 2, 5, 1, 6];
    let total: usize = counts.iter().sum();

    let positions = hierarchical(4)?.run(&CollectPositions, shards_with_counts(&counts), &output)?;

    let expected: Vec<u64> = (0..total as u64).collect();
    assert_eq!(positions.into_whole(), Some(expected.clone()));
    let lines: Vec<String> = expected.iter().map(u64::to_string).collect();
    assert_eq!(output.contents_string(), format!("{}\ntotal {total}\n", lines.join("\n")));
    Ok(())
}

#[test]
fn output_merges_wait_for_earlier_shards() -> Result<()> {
    let output = MemoryOutputTracker::new();
    let positions = hierarchical(3)?.run(&SlowFirstShard, shards_with_counts(&[2, 2, 2, 2]), &output)?;

    assert_eq!(positions.into_whole(), Some((0..8).collect::<Vec<u64>>()));
    assert_eq!(output.contents_string(), "0\n1\n2\n3\n4\n5\n6\n7\n");
    Ok(())
}

#[test]
fn no_shards_reports_init() -> Result<()> {
    let output = MemoryOutputTracker::new();
    let positions = hierarchical(2)?.run(&CollectPositions, Vec::<MemoryShard<Record>>::new(), &output)?;
    assert_eq!(positions.into_whole(), Some(Vec::new()));
    assert_eq!(output.contents_string(), "total 0\n");
    Ok(())
}

#[test]
fn single_shard_needs_no_reduce() -> Result<()> {
    let scheduler = hierarchical(2)?;
    let count = scheduler.run(&CountRecords, shards_with_counts(&[9]), &MemoryOutputTracker::new())?;
    assert_eq!(count.into_whole(), Some(9));
    assert_eq!(scheduler.metrics().snapshot().tree_reduces, 0);
    Ok(())
}

#[test]
fn every_pair_is_reduced_once() -> Result<()> {
    let scheduler = hierarchical(4)?;
    let count = scheduler.run(&CountRecords, uniform_shards(13, 3), &MemoryOutputTracker::new())?;

    assert_eq!(count.into_whole(), Some(39));
    let snapshot = scheduler.metrics().snapshot();
    assert_eq!(snapshot.shards_traversed, 13);
    assert_eq!(snapshot.tree_reduces, 12);
    assert_eq!(snapshot.records_processed, 39);
    Ok(())
}

#[test]
fn failure_is_returned_unchanged() -> Result<()> {
    let err = hierarchical(4)?
        .run(&FailingWalker::error_at(17), uniform_shards(10, 5), &MemoryOutputTracker::new())
        .unwrap_err();
    assert_eq!(err.downcast_ref::<FixtureFailure>(), Some(&FixtureFailure(17)));
    Ok(())
}

#[test]
fn failure_stops_new_shards() -> Result<()> {
    let scheduler = hierarchical(4)?;
    let err = scheduler
        .run(&FailFirstThenCrawl, uniform_shards(200, 2), &MemoryOutputTracker::new())
        .unwrap_err();

    assert_eq!(err.downcast_ref::<FixtureFailure>(), Some(&FixtureFailure(0)));
    assert!(scheduler.metrics().snapshot().shards_traversed < 199);
    Ok(())
}

#[test]
fn worker_panic_becomes_an_error() -> Result<()> {
    let err = hierarchical(2)?
        .run(&FailingWalker::panic_at(3), uniform_shards(4, 2), &MemoryOutputTracker::new())
        .unwrap_err();

    match err.downcast_ref::<SchedulerError>() {
        Some(SchedulerError::WorkerPanicked(message)) => {
            assert!(message.contains("walker panicked at position 3"), "{message}");
        }
        other => panic!("expected a worker panic, got {other:?}"),
    }
    Ok(())
}

#[test]
fn pending_merges_never_exceed_the_bound() -> Result<()> {
    let config = SchedulerConfig {
        max_outstanding_merges: 2,
        ..SchedulerConfig::hierarchical(4)
    };
    let scheduler = Scheduler::new(config)?;
    let output = MemoryOutputTracker::new();

    let count = scheduler.run(&SlowCount::new(Duration::from_millis(2)), uniform_shards(30, 2), &output)?;

    assert_eq!(count.into_whole(), Some(60));
    let peak = scheduler.metrics().snapshot().peak_pending_merges;
    assert!((1..=2).contains(&peak), "peak pending merges {peak}");
    Ok(())
}

#[test]
fn raised_abort_reports_init() -> Result<()> {
    let flag = AbortFlag::new();
    flag.raise();
    let output = MemoryOutputTracker::new();
    let scheduler = hierarchical(3)?.with_abort(flag);

    let positions = scheduler.run(&CollectPositions, shards_with_counts(&[3, 3]), &output)?;

    assert_eq!(positions.into_whole(), Some(Vec::new()));
    assert_eq!(output.contents_string(), "total 0\n");
    assert_eq!(scheduler.metrics().snapshot().shards_traversed, 0);
    Ok(())
}

#[test]
fn abort_mid_run_folds_the_submitted_prefix() -> Result<()> {
    let flag = AbortFlag::new();
    let trigger = flag.clone();
    let output = MemoryOutputTracker::new();
    let scheduler = hierarchical(2)?.with_abort(flag);

    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        trigger.raise();
    });
    let positions = scheduler.run(&CollectPositions, shards_with_counts(&[1; 5000]), &output)?;
    handle.join().expect("trigger thread");

    let positions = positions.into_whole().unwrap_or_default();
    let prefix: Vec<u64> = (0..positions.len() as u64).collect();
    assert_eq!(positions, prefix);
    Ok(())
}

#[test]
fn done_walker_stops_submission() -> Result<()> {
    let walker = StopAfter::new(1);
    let count = hierarchical(2)?.run(&walker, uniform_shards(50, 10), &MemoryOutputTracker::new())?;

    let count = count.into_whole().unwrap_or_default();
    assert!(count == 10 || count == 20, "counted {count}");
    Ok(())
}

#[test]
fn explicit_scheduler_reports_into_shared_metrics() -> Result<()> {
    let metrics = SchedulerMetrics::new();
    let scheduler = HierarchicalScheduler::new(3, 4, metrics.clone())?;
    assert_eq!(scheduler.threads(), 3);

    let count = scheduler.execute(&CountRecords, shards_with_counts(&[3, 0, 5, 2, 4]), &MemoryOutputTracker::new())?;

    assert_eq!(count.into_whole(), Some(14));
    assert_eq!(metrics.snapshot().shards_traversed, 5);
    assert_eq!(metrics.snapshot().tree_reduces, 4);
    Ok(())
}

#[test]
fn interval_walker_is_rejected_before_any_shard_runs() -> Result<()> {
    let metrics = SchedulerMetrics::new();
    let output = MemoryOutputTracker::new();
    let scheduler = HierarchicalScheduler::new(4, 50, metrics.clone())?;

    let err = scheduler
        .execute(&CountPerInterval, shards_with_counts(&[2, 3]), &output)
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<SchedulerError>(),
        Some(SchedulerError::IntervalReduceInParallel { threads: 4 })
    ));
    assert_eq!(metrics.snapshot().shards_traversed, 0);
    assert_eq!(output.contents_string(), "");
    Ok(())
}

#[test]
fn zero_threads_is_rejected() {
    let err = HierarchicalScheduler::new(0, 4, SchedulerMetrics::new()).err().expect("invalid");
    assert!(matches!(
        err.downcast_ref::<SchedulerError>(),
        Some(SchedulerError::InvalidConfig(_))
    ));
}
