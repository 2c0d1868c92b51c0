//! Strategies turning per-window results into one final answer.
//!
//! [`StandardAccumulator`] threads a single running value through every
//! window: the value returned by one window becomes the starting value of the
//! next. It performs no merging of its own; fold semantics belong entirely to
//! the walker. This is a different strategy from tree reduction, which needs
//! the walker's separate combine function, and the two are never mixed.
//!
//! [`IntervalAccumulator`] keeps one result per interval. Each interval starts
//! from a fresh zero value, may continue across shard boundaries, and is sealed
//! once a window ending at the interval's end has been folded.

use anyhow::Result;
use std::io::Write;
use tracing::debug;

use crate::error::SchedulerError;
use crate::interval::{PosOf, Span};
use crate::walker::{Reduced, Walker};

/// A running fold fed one window at a time.
pub trait Fold<T, P> {
    /// Starting value for the window bounded by `span`.
    fn reduce_init(&mut self, span: Option<&Span<P>>) -> T;

    /// Absorb the result of the window bounded by `span`.
    ///
    /// # Errors
    ///
    /// Protocol violations such as an unfiltered window during interval aggregation.
    fn accumulate(&mut self, span: Option<&Span<P>>, result: T) -> Result<()>;
}

/// Threads one value through all windows.
pub struct StandardAccumulator<'w, W: Walker> {
    walker: &'w W,
    value: Option<W::Result>,
}

impl<'w, W: Walker> StandardAccumulator<'w, W> {
    pub fn new(walker: &'w W) -> Self {
        Self { walker, value: None }
    }

    /// The current value, or the walker's zero value if nothing was folded.
    pub fn into_value(self) -> W::Result {
        let walker = self.walker;
        self.value.unwrap_or_else(|| walker.init())
    }
}

impl<W: Walker> Fold<W::Result, PosOf<W::Record>> for StandardAccumulator<'_, W> {
    fn reduce_init(&mut self, _span: Option<&Span<PosOf<W::Record>>>) -> W::Result {
        self.value.take().unwrap_or_else(|| self.walker.init())
    }

    fn accumulate(&mut self, _span: Option<&Span<PosOf<W::Record>>>, result: W::Result) -> Result<()> {
        self.value = Some(result);
        Ok(())
    }
}

/// Collects one result per interval.
pub struct IntervalAccumulator<'w, W: Walker> {
    walker: &'w W,
    intervals: Vec<Span<PosOf<W::Record>>>,
    cursor: usize,
    carry: Option<W::Result>,
    sealed: Vec<(Span<PosOf<W::Record>>, W::Result)>,
}

impl<'w, W: Walker> IntervalAccumulator<'w, W> {
    pub fn new(walker: &'w W, intervals: Vec<Span<PosOf<W::Record>>>) -> Self {
        Self {
            walker,
            intervals,
            cursor: 0,
            carry: None,
            sealed: Vec::new(),
        }
    }

    /// Results collected so far, one per sealed interval.
    #[must_use]
    pub fn sealed(&self) -> &[(Span<PosOf<W::Record>>, W::Result)] {
        &self.sealed
    }

    // An interval left open without a window reaching its end still reports
    // what it saw.
    fn seal_partial(&mut self) {
        if let Some(partial) = self.carry.take() {
            if let Some(interval) = self.intervals.get(self.cursor) {
                debug!(interval = %interval, "sealing partially traversed interval");
                self.sealed.push((interval.clone(), partial));
                self.cursor += 1;
            }
        }
    }

    fn into_results(mut self) -> Vec<(Span<PosOf<W::Record>>, W::Result)> {
        self.seal_partial();
        self.sealed
    }
}

impl<W: Walker> Fold<W::Result, PosOf<W::Record>> for IntervalAccumulator<'_, W> {
    fn reduce_init(&mut self, span: Option<&Span<PosOf<W::Record>>>) -> W::Result {
        let continues_open_interval = match (span, self.intervals.get(self.cursor)) {
            (Some(span), Some(interval)) => interval.covers(span),
            _ => false,
        };
        if !continues_open_interval {
            self.seal_partial();
        }
        self.carry.take().unwrap_or_else(|| self.walker.init())
    }

    fn accumulate(&mut self, span: Option<&Span<PosOf<W::Record>>>, result: W::Result) -> Result<()> {
        let span = span.ok_or(SchedulerError::NoIntervalForWindow)?;
        while self
            .intervals
            .get(self.cursor)
            .is_some_and(|interval| !interval.covers(span))
        {
            self.cursor += 1;
        }
        let interval = self
            .intervals
            .get(self.cursor)
            .ok_or_else(|| SchedulerError::UncoveredWindow { span: span.to_string() })?;

        if span.end == interval.end {
            self.sealed.push((interval.clone(), result));
            self.cursor += 1;
        } else {
            self.carry = Some(result);
        }
        Ok(())
    }
}

/// The accumulator a linear run uses.
pub enum Accumulator<'w, W: Walker> {
    Standard(StandardAccumulator<'w, W>),
    Interval(IntervalAccumulator<'w, W>),
}

impl<'w, W: Walker> Accumulator<'w, W> {
    pub fn standard(walker: &'w W) -> Self {
        Accumulator::Standard(StandardAccumulator::new(walker))
    }

    pub fn by_interval(walker: &'w W, intervals: Vec<Span<PosOf<W::Record>>>) -> Self {
        Accumulator::Interval(IntervalAccumulator::new(walker, intervals))
    }

    /// Hand the final answer to the walker's completion hook and return it.
    ///
    /// # Errors
    ///
    /// Failures raised by [`Walker::on_finish`].
    pub fn finish(self, out: &mut dyn Write) -> Result<Reduced<W::Result, PosOf<W::Record>>> {
        let (walker, reduced) = match self {
            Accumulator::Standard(acc) => {
                let walker = acc.walker;
                (walker, Reduced::Whole(acc.into_value()))
            }
            Accumulator::Interval(acc) => {
                let walker = acc.walker;
                (walker, Reduced::PerInterval(acc.into_results()))
            }
        };
        walker.on_finish(&reduced, out)?;
        Ok(reduced)
    }
}

impl<W: Walker> Fold<W::Result, PosOf<W::Record>> for Accumulator<'_, W> {
    fn reduce_init(&mut self, span: Option<&Span<PosOf<W::Record>>>) -> W::Result {
        match self {
            Accumulator::Standard(acc) => acc.reduce_init(span),
            Accumulator::Interval(acc) => acc.reduce_init(span),
        }
    }

    fn accumulate(&mut self, span: Option<&Span<PosOf<W::Record>>>, result: W::Result) -> Result<()> {
        match self {
            Accumulator::Standard(acc) => acc.accumulate(span, result),
            Accumulator::Interval(acc) => acc.accumulate(span, result),
        }
    }
}
