//! Tests for standard and per-interval accumulation.

use shardwalk::accumulator::{Fold, StandardAccumulator};
use shardwalk::error::SchedulerError;
use shardwalk::interval::Span;
use shardwalk::output::MemoryOutputTracker;
use shardwalk::scheduler::{Scheduler, SchedulerConfig};
use shardwalk::testing::*;
use shardwalk::walker::{Reduced, Walker};

fn by_interval(
    intervals: Vec<Span<u64>>,
    shards: Vec<shardwalk::shard::MemoryShard<Record>>,
) -> anyhow::Result<(Reduced<u64, u64>, String)> {
    let output = MemoryOutputTracker::new();
    let scheduler = Scheduler::new(SchedulerConfig::linear())?;
    let reduced = scheduler.run_by_interval(&CountPerInterval, intervals, shards, &output)?;
    Ok((reduced, output.contents_string()))
}

#[test]
fn standard_accumulator_threads_one_value() -> anyhow::Result<()> {
    let mut acc = StandardAccumulator::new(&CountRecords);
    let first = acc.reduce_init(None);
    assert_eq!(first, 0);
    acc.accumulate(None, first + 3)?;
    let second = acc.reduce_init(None);
    assert_eq!(second, 3);
    acc.accumulate(None, second + 4)?;
    assert_eq!(acc.into_value(), 7);
    Ok(())
}

#[test]
fn standard_accumulator_without_windows_reports_init() {
    let acc = StandardAccumulator::new(&CollectPositions);
    assert_eq!(acc.into_value(), CollectPositions.init());
}

#[test]
fn intervals_never_share_a_running_value() -> anyhow::Result<()> {
    let intervals = spans(&[(0, 9), (10, 19), (20, 29)]);
    let shards = vec![
        ShardBuilder::new().positions(0..15).span(0, 9).span(10, 14).build(),
        ShardBuilder::new().positions(15..30).span(15, 19).span(20, 29).build(),
    ];

    let (reduced, output) = by_interval(intervals, shards)?;
    let expected = vec![
        (Span::new(0, 9), 10),
        (Span::new(10, 19), 10),
        (Span::new(20, 29), 10),
    ];
    assert_eq!(reduced.per_interval(), Some(expected.as_slice()));
    assert_eq!(output, "[0, 9]\t10\n[10, 19]\t10\n[20, 29]\t10\n");
    Ok(())
}

#[test]
fn partially_covered_interval_is_sealed_with_what_it_saw() -> anyhow::Result<()> {
    let intervals = spans(&[(0, 9), (10, 19)]);
    let shards = vec![
        ShardBuilder::new().positions(0..20).span(0, 4).span(10, 19).build(),
    ];

    let (reduced, _) = by_interval(intervals, shards)?;
    assert_eq!(
        reduced,
        Reduced::PerInterval(vec![(Span::new(0, 9), 5), (Span::new(10, 19), 10)])
    );
    Ok(())
}

#[test]
fn trailing_open_interval_is_reported() -> anyhow::Result<()> {
    let intervals = spans(&[(0, 9)]);
    let shards = vec![ShardBuilder::new().positions(0..10).span(2, 3).build()];

    let (reduced, _) = by_interval(intervals, shards)?;
    assert_eq!(reduced, Reduced::PerInterval(vec![(Span::new(0, 9), 2)]));
    Ok(())
}

#[test]
fn unfiltered_window_cannot_be_aggregated_by_interval() {
    let intervals = spans(&[(0, 9)]);
    let err = by_interval(intervals, shards_with_counts(&[3])).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SchedulerError>(),
        Some(SchedulerError::NoIntervalForWindow)
    ));
}

#[test]
fn window_outside_every_interval_is_rejected() {
    let intervals = spans(&[(0, 9)]);
    let shards = vec![ShardBuilder::new().positions(0..30).span(20, 25).build()];
    let err = by_interval(intervals, shards).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SchedulerError>(),
        Some(SchedulerError::UncoveredWindow { .. })
    ));
}

#[test]
fn unsorted_intervals_are_rejected() {
    let intervals = vec![Span::new(10, 19), Span::new(0, 9)];
    let err = by_interval(intervals, Vec::new()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SchedulerError>(),
        Some(SchedulerError::UnsortedSpans { .. })
    ));
}

#[test]
fn inverted_interval_is_rejected() {
    let intervals = vec![Span::new(0, 9), Span { start: 30, end: 20 }];
    let err = by_interval(intervals, shards_with_counts(&[5])).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SchedulerError>(),
        Some(SchedulerError::InvertedSpan { index: 1, .. })
    ));
}

#[test]
fn interval_aggregation_refuses_parallel_execution() -> anyhow::Result<()> {
    let scheduler = Scheduler::new(SchedulerConfig::hierarchical(4))?;
    let output = MemoryOutputTracker::new();

    let err = scheduler
        .run(&CountPerInterval, shards_with_counts(&[2, 2]), &output)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SchedulerError>(),
        Some(SchedulerError::IntervalReduceInParallel { threads: 4 })
    ));

    let err = scheduler
        .run_by_interval(&CountPerInterval, spans(&[(0, 3)]), shards_with_counts(&[2, 2]), &output)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SchedulerError>(),
        Some(SchedulerError::IntervalReduceInParallel { threads: 4 })
    ));
    Ok(())
}

#[test]
fn interval_walker_needs_intervals() -> anyhow::Result<()> {
    let scheduler = Scheduler::new(SchedulerConfig::linear())?;
    let err = scheduler
        .run(&CountPerInterval, shards_with_counts(&[2]), &MemoryOutputTracker::new())
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SchedulerError>(),
        Some(SchedulerError::MissingIntervals)
    ));
    Ok(())
}
