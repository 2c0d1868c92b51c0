//! Tests for traversal engines and the engine pool.

use anyhow::Result;
use shardwalk::accumulator::StandardAccumulator;
use shardwalk::engine::{EnginePool, Traverser};
use shardwalk::error::SchedulerError;
use shardwalk::testing::*;
use shardwalk::SchedulerMetrics;

#[test]
fn traverser_counts_windows_and_records() -> Result<()> {
    let shard = ShardBuilder::new().positions(0..10).span(1, 3).span(6, 6).build();
    let mut engine = Traverser::new(2);
    let mut acc = StandardAccumulator::new(&CountRecords);
    let mut out: Vec<u8> = Vec::new();

    engine.traverse(&CountRecords, &shard, &mut acc, &mut out)?;

    assert_eq!(acc.into_value(), 4);
    assert_eq!(engine.worker(), 2);
    assert_eq!(engine.shards(), 1);
    assert_eq!(engine.windows(), 2);
    assert_eq!(engine.records(), 4);
    Ok(())
}

#[test]
fn traverser_rejects_out_of_order_shards() {
    let shard = shardwalk::MemoryShard::new(vec![Record::at(2), Record::at(1)]);
    let mut acc = StandardAccumulator::new(&CountRecords);
    let err = Traverser::new(0)
        .traverse(&CountRecords, &shard, &mut acc, &mut Vec::<u8>::new())
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SchedulerError>(),
        Some(SchedulerError::OutOfOrder { .. })
    ));
}

#[test]
fn each_worker_always_gets_its_own_engine() -> Result<()> {
    let pool = EnginePool::new(3);
    assert_eq!(pool.len(), 3);
    for worker in [0, 2, 1, 2, 0] {
        assert_eq!(pool.borrow(worker)?.worker(), worker);
    }
    Ok(())
}

#[test]
fn unknown_worker_has_no_engine() {
    let pool = EnginePool::new(2);
    assert!(matches!(pool.borrow(2), Err(SchedulerError::EngineUnavailable(2))));
}

#[test]
fn reentrant_borrow_gets_a_temporary_engine() -> Result<()> {
    let pool = EnginePool::new(1);
    let shard = ShardBuilder::new().positions(0..5).build();

    let mut outer = pool.borrow(0)?;
    {
        let mut inner = pool.borrow(0)?;
        assert_eq!(inner.worker(), 0);
        let mut acc = StandardAccumulator::new(&CountRecords);
        inner.traverse(&CountRecords, &shard, &mut acc, &mut Vec::<u8>::new())?;
    }
    let mut acc = StandardAccumulator::new(&CountRecords);
    outer.traverse(&CountRecords, &shard, &mut acc, &mut Vec::<u8>::new())?;
    assert_eq!(outer.shards(), 1);
    drop(outer);

    let metrics = SchedulerMetrics::new();
    pool.shutdown(&metrics);
    assert_eq!(metrics.snapshot().windows_processed, 2);
    assert_eq!(metrics.snapshot().records_processed, 10);
    Ok(())
}
