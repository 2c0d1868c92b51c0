//! The per-unit computation the engine applies to every window.

use anyhow::Result;
use std::io::Write;

use crate::interval::{Located, PosOf, Span};
use crate::window::Window;

/// A fold over windows of records.
///
/// The engine calls [`init`](Walker::init) for a zero value, threads a running
/// value through [`process_window`](Walker::process_window) and hands the final
/// answer to [`on_finish`](Walker::on_finish) exactly once per successful run.
///
/// Output goes to the writer passed alongside each window. In parallel runs
/// that writer is a per-shard staging area, merged into the shared destination
/// in shard order after the shard finishes.
pub trait Walker: Send + Sync {
    type Record: Located + Send;
    type Result: Send + 'static;

    /// Zero value for a fold.
    fn init(&self) -> Self::Result;

    /// Is the walker already satisfied? Checked before each new shard.
    fn is_done(&self) -> bool {
        false
    }

    /// Fold one window into `acc`.
    ///
    /// # Errors
    ///
    /// Any failure aborts the whole run and is returned to the caller as is.
    fn process_window(
        &self,
        acc: Self::Result,
        window: &mut Window<'_, '_, Self::Record>,
        out: &mut dyn Write,
    ) -> Result<Self::Result>;

    /// Collect one result per interval instead of one overall result.
    fn reduce_by_interval(&self) -> bool {
        false
    }

    /// Completion hook, called once with the final answer.
    ///
    /// # Errors
    ///
    /// Failures propagate to the caller.
    fn on_finish(&self, _result: &Reduced<Self::Result, PosOf<Self::Record>>, _out: &mut dyn Write) -> Result<()> {
        Ok(())
    }
}

/// A walker whose partial results can be combined pairwise.
///
/// `tree_reduce` must be associative. It need not be commutative: the engine
/// always passes the earlier partial result as `lhs`.
pub trait TreeReducible: Walker {
    /// Combine two adjacent partial results.
    ///
    /// # Errors
    ///
    /// Any failure aborts the whole run.
    fn tree_reduce(&self, lhs: Self::Result, rhs: Self::Result) -> Result<Self::Result>;
}

/// Final answer of a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reduced<T, P> {
    /// One value folded over every shard.
    Whole(T),
    /// One value per interval, in interval order.
    PerInterval(Vec<(Span<P>, T)>),
}

impl<T, P> Reduced<T, P> {
    #[must_use]
    pub fn whole(&self) -> Option<&T> {
        match self {
            Reduced::Whole(v) => Some(v),
            Reduced::PerInterval(_) => None,
        }
    }

    #[must_use]
    pub fn into_whole(self) -> Option<T> {
        match self {
            Reduced::Whole(v) => Some(v),
            Reduced::PerInterval(_) => None,
        }
    }

    #[must_use]
    pub fn per_interval(&self) -> Option<&[(Span<P>, T)]> {
        match self {
            Reduced::Whole(_) => None,
            Reduced::PerInterval(v) => Some(v),
        }
    }
}
