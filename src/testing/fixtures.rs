//! Ready-made records and walkers for exercising schedulers.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use thiserror::Error;

use crate::interval::{Located, Span};
use crate::walker::{Reduced, TreeReducible, Walker};
use crate::window::Window;

/// A record with a plain integer position and a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    pub pos: u64,
    pub value: i64,
}

impl Record {
    #[must_use]
    pub const fn new(pos: u64, value: i64) -> Self {
        Self { pos, value }
    }

    /// A record whose payload equals its position.
    #[must_use]
    pub const fn at(pos: u64) -> Self {
        Self { pos, value: pos as i64 }
    }
}

impl Located for Record {
    type Pos = u64;

    fn position(&self) -> u64 {
        self.pos
    }
}

/// Counts records. Combining adds.
#[derive(Debug, Clone, Copy, Default)]
pub struct CountRecords;

impl Walker for CountRecords {
    type Record = Record;
    type Result = u64;

    fn init(&self) -> u64 {
        0
    }

    fn process_window(&self, acc: u64, window: &mut Window<'_, '_, Record>, _out: &mut dyn Write) -> Result<u64> {
        Ok(acc + window.count() as u64)
    }
}

impl TreeReducible for CountRecords {
    fn tree_reduce(&self, lhs: u64, rhs: u64) -> Result<u64> {
        Ok(lhs + rhs)
    }
}

/// Collects record positions in traversal order and writes one line per
/// record. Combining concatenates, which is associative but not commutative,
/// so any reordering of partial results shows up in the answer.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectPositions;

impl Walker for CollectPositions {
    type Record = Record;
    type Result = Vec<u64>;

    fn init(&self) -> Vec<u64> {
        Vec::new()
    }

    fn process_window(
        &self,
        mut acc: Vec<u64>,
        window: &mut Window<'_, '_, Record>,
        out: &mut dyn Write,
    ) -> Result<Vec<u64>> {
        for record in window {
            writeln!(out, "{}", record.pos)?;
            acc.push(record.pos);
        }
        Ok(acc)
    }

    fn on_finish(&self, result: &Reduced<Vec<u64>, u64>, out: &mut dyn Write) -> Result<()> {
        if let Some(positions) = result.whole() {
            writeln!(out, "total {}", positions.len())?;
        }
        Ok(())
    }
}

impl TreeReducible for CollectPositions {
    fn tree_reduce(&self, mut lhs: Vec<u64>, rhs: Vec<u64>) -> Result<Vec<u64>> {
        lhs.extend(rhs);
        Ok(lhs)
    }
}

/// Error raised by [`FailingWalker`], so tests can check it came back intact.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("walker refused the record at position {0}")]
pub struct FixtureFailure(pub u64);

/// Counts records but fails, or panics, on reaching one position.
#[derive(Debug, Clone, Copy)]
pub struct FailingWalker {
    position: u64,
    panic: bool,
}

impl FailingWalker {
    /// Return a [`FixtureFailure`] when `position` is reached.
    #[must_use]
    pub const fn error_at(position: u64) -> Self {
        Self { position, panic: false }
    }

    /// Panic when `position` is reached.
    #[must_use]
    pub const fn panic_at(position: u64) -> Self {
        Self { position, panic: true }
    }
}

impl Walker for FailingWalker {
    type Record = Record;
    type Result = u64;

    fn init(&self) -> u64 {
        0
    }

    fn process_window(&self, mut acc: u64, window: &mut Window<'_, '_, Record>, _out: &mut dyn Write) -> Result<u64> {
        for record in window {
            if record.pos == self.position {
                if self.panic {
                    panic!("walker panicked at position {}", record.pos);
                }
                return Err(FixtureFailure(record.pos).into());
            }
            acc += 1;
        }
        Ok(acc)
    }
}

impl TreeReducible for FailingWalker {
    fn tree_reduce(&self, lhs: u64, rhs: u64) -> Result<u64> {
        Ok(lhs + rhs)
    }
}

/// Counts records and reports itself done once `limit` records were seen.
#[derive(Debug, Default)]
pub struct StopAfter {
    limit: usize,
    seen: AtomicUsize,
}

impl StopAfter {
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self { limit, seen: AtomicUsize::new(0) }
    }

    #[must_use]
    pub fn seen(&self) -> usize {
        self.seen.load(Ordering::Acquire)
    }
}

impl Walker for StopAfter {
    type Record = Record;
    type Result = u64;

    fn init(&self) -> u64 {
        0
    }

    fn is_done(&self) -> bool {
        self.seen() >= self.limit
    }

    fn process_window(&self, acc: u64, window: &mut Window<'_, '_, Record>, _out: &mut dyn Write) -> Result<u64> {
        let n = window.count();
        self.seen.fetch_add(n, Ordering::AcqRel);
        Ok(acc + n as u64)
    }
}

impl TreeReducible for StopAfter {
    fn tree_reduce(&self, lhs: u64, rhs: u64) -> Result<u64> {
        Ok(lhs + rhs)
    }
}

/// Counts records per interval.
#[derive(Debug, Clone, Copy, Default)]
pub struct CountPerInterval;

impl Walker for CountPerInterval {
    type Record = Record;
    type Result = u64;

    fn init(&self) -> u64 {
        0
    }

    fn process_window(&self, acc: u64, window: &mut Window<'_, '_, Record>, _out: &mut dyn Write) -> Result<u64> {
        Ok(acc + window.count() as u64)
    }

    fn reduce_by_interval(&self) -> bool {
        true
    }

    fn on_finish(&self, result: &Reduced<u64, u64>, out: &mut dyn Write) -> Result<()> {
        for (interval, count) in result.per_interval().unwrap_or_default() {
            writeln!(out, "{interval}\t{count}")?;
        }
        Ok(())
    }
}

impl TreeReducible for CountPerInterval {
    fn tree_reduce(&self, lhs: u64, rhs: u64) -> Result<u64> {
        Ok(lhs + rhs)
    }
}

/// Counts records, sleeping once per window to keep workers busy.
#[derive(Debug, Clone, Copy)]
pub struct SlowCount {
    pub per_window: Duration,
}

impl SlowCount {
    #[must_use]
    pub const fn new(per_window: Duration) -> Self {
        Self { per_window }
    }
}

impl Walker for SlowCount {
    type Record = Record;
    type Result = u64;

    fn init(&self) -> u64 {
        0
    }

    fn process_window(&self, acc: u64, window: &mut Window<'_, '_, Record>, _out: &mut dyn Write) -> Result<u64> {
        thread::sleep(self.per_window);
        Ok(acc + window.count() as u64)
    }
}

impl TreeReducible for SlowCount {
    fn tree_reduce(&self, lhs: u64, rhs: u64) -> Result<u64> {
        Ok(lhs + rhs)
    }
}

/// Spans `[start, end]` as a vector, for terse test setup.
#[must_use]
pub fn spans(bounds: &[(u64, u64)]) -> Vec<Span<u64>> {
    bounds.iter().map(|&(start, end)| Span::new(start, end)).collect()
}
