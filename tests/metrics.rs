//! Tests for the metrics module.

use anyhow::Result;
use serde_json::Value;
use shardwalk::metrics::{MetricsSnapshot, SchedulerMetrics};
use std::fs;
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn fresh_collector_is_empty() {
    let metrics = SchedulerMetrics::new();
    assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    assert!(metrics.elapsed().is_none());
}

#[test]
fn shard_and_reduce_timings_accumulate() {
    let metrics = SchedulerMetrics::new();
    metrics.record_shard(Duration::from_millis(10));
    metrics.record_shard(Duration::from_millis(30));
    metrics.record_tree_reduce(Duration::from_millis(4));

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.shards_traversed, 2);
    assert_eq!(snapshot.shard_traverse_ms, 40);
    assert_eq!(snapshot.avg_shard_traverse_ms(), 20);
    assert_eq!(snapshot.tree_reduces, 1);
    assert_eq!(snapshot.avg_tree_reduce_ms(), 4);
}

#[test]
fn averages_of_nothing_are_zero() {
    let snapshot = MetricsSnapshot::default();
    assert_eq!(snapshot.avg_shard_traverse_ms(), 0);
    assert_eq!(snapshot.avg_tree_reduce_ms(), 0);
}

#[test]
fn pending_merges_keep_the_peak() {
    let metrics = SchedulerMetrics::new();
    for pending in [1, 3, 2, 5, 1] {
        metrics.observe_pending_merges(pending);
    }
    assert_eq!(metrics.snapshot().peak_pending_merges, 5);
}

#[test]
fn clones_share_one_collector() {
    let metrics = SchedulerMetrics::new();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let metrics = metrics.clone();
            thread::spawn(move || {
                for _ in 0..25 {
                    metrics.record_shard(Duration::ZERO);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("worker thread");
    }
    assert_eq!(metrics.snapshot().shards_traversed, 100);
}

#[test]
fn execution_time_needs_start_and_end() {
    let metrics = SchedulerMetrics::new();
    metrics.record_start();
    assert!(metrics.snapshot().execution_time_ms.is_none());
    metrics.record_end();
    assert!(metrics.elapsed().is_some());
    assert!(metrics.snapshot().execution_time_ms.is_some());
}

#[test]
fn json_export_contains_every_statistic() -> Result<()> {
    let metrics = SchedulerMetrics::new();
    metrics.record_shard(Duration::from_millis(6));
    metrics.record_output_merge(3, Duration::from_millis(2));
    metrics.record_traversal_counts(7, 70);

    let json = metrics.to_json();
    assert_eq!(json["shards_traversed"], 1);
    assert_eq!(json["shard_traverse_ms"]["avg"], 6);
    assert_eq!(json["output_merges"], 3);
    assert_eq!(json["windows_processed"], 7);
    assert_eq!(json["records_processed"], 70);
    assert_eq!(json["execution_time_ms"], Value::Null);
    Ok(())
}

#[test]
fn save_to_file_writes_pretty_json() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("metrics.json");
    let metrics = SchedulerMetrics::new();
    metrics.record_tree_reduce(Duration::from_millis(1));

    metrics.save_to_file(&path)?;

    let saved: Value = serde_json::from_str(&fs::read_to_string(&path)?)?;
    assert_eq!(saved, metrics.to_json());
    Ok(())
}

#[test]
fn snapshot_serializes() -> Result<()> {
    let metrics = SchedulerMetrics::new();
    metrics.record_traversal_counts(2, 5);
    let snapshot = metrics.snapshot();
    let back: MetricsSnapshot = serde_json::from_str(&serde_json::to_string(&snapshot)?)?;
    assert_eq!(back, snapshot);
    Ok(())
}
