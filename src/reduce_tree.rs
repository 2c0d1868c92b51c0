//! Binary reduce tree over asynchronous partial results.
//!
//! Entries arrive at level 0 in production order. Whenever a level holds two
//! entries, the two oldest are handed to a [`TreeReduceNotifier`], which
//! schedules their combination and returns a handle to the combined result;
//! that handle joins the next level up. Higher levels therefore always hold
//! earlier data than lower ones, and every combine sees its inputs in
//! left-to-right order.
//!
//! After [`complete`](ReduceTree::complete), a single leftover entry on any
//! level below the deepest is promoted unchanged to the next level, so odd
//! counts still collapse to one root.
//!
//! ```text
//! entries:  e1 e2 e3 e4 e5          level 0   e5
//!            \ /   \ /               level 1   -
//!            r12   r34               level 2   r1234
//!              \   /
//!              r1234                 complete(): e5 -> level 1 -> level 2,
//!                                    then r1234 + e5 -> level 3 (root)
//! ```

use anyhow::{bail, Result};
use std::collections::VecDeque;

use crate::async_result::AsyncResult;
use crate::error::SchedulerError;

/// Schedules the combination of two partial results.
pub trait TreeReduceNotifier<T> {
    /// Arrange for `lhs` and `rhs` to be combined, `lhs` first, and return a
    /// handle to the combined value.
    fn notify_reduce(&mut self, lhs: AsyncResult<T>, rhs: AsyncResult<T>) -> AsyncResult<T>;
}

impl<T, F> TreeReduceNotifier<T> for F
where
    F: FnMut(AsyncResult<T>, AsyncResult<T>) -> AsyncResult<T>,
{
    fn notify_reduce(&mut self, lhs: AsyncResult<T>, rhs: AsyncResult<T>) -> AsyncResult<T> {
        self(lhs, rhs)
    }
}

/// Folds a stream of asynchronous results into one with logarithmic fan-in.
pub struct ReduceTree<T> {
    levels: Vec<VecDeque<AsyncResult<T>>>,
    complete: bool,
    entries: usize,
}

impl<T> Default for ReduceTree<T> {
    fn default() -> Self {
        Self {
            levels: Vec::new(),
            complete: false,
            entries: 0,
        }
    }
}

impl<T> ReduceTree<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the next partial result at level 0.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::TreeComplete`] after [`complete`](Self::complete).
    pub fn add_entry(&mut self, entry: AsyncResult<T>, notifier: &mut impl TreeReduceNotifier<T>) -> Result<()> {
        if self.complete {
            bail!(SchedulerError::TreeComplete);
        }
        self.entries += 1;
        self.push(0, entry);
        self.collapse(notifier);
        Ok(())
    }

    /// Declare that no further entries will arrive and collapse what remains.
    pub fn complete(&mut self, notifier: &mut impl TreeReduceNotifier<T>) {
        if self.complete {
            return;
        }
        self.complete = true;
        self.collapse(notifier);
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Entries added so far.
    #[must_use]
    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Partial results currently waiting somewhere in the tree.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.levels.iter().map(VecDeque::len).sum()
    }

    /// The root of a completed tree.
    ///
    /// `None` before [`complete`](Self::complete), for an empty tree, or once
    /// the root has been taken.
    pub fn result(&mut self) -> Option<AsyncResult<T>> {
        if !self.complete {
            return None;
        }
        debug_assert!(self.pending() <= 1);
        self.levels.last_mut().and_then(VecDeque::pop_front)
    }

    fn push(&mut self, level: usize, entry: AsyncResult<T>) {
        if self.levels.len() <= level {
            self.levels.resize_with(level + 1, VecDeque::new);
        }
        self.levels[level].push_back(entry);
    }

    // Single bottom-up sweep: lower levels are settled before higher ones are
    // visited, and nothing ever moves downwards.
    fn collapse(&mut self, notifier: &mut impl TreeReduceNotifier<T>) {
        let mut level = 0;
        while level < self.levels.len() {
            while self.levels[level].len() >= 2 {
                let (Some(lhs), Some(rhs)) = (self.levels[level].pop_front(), self.levels[level].pop_front()) else {
                    break;
                };
                let combined = notifier.notify_reduce(lhs, rhs);
                self.push(level + 1, combined);
            }
            let deepest = level + 1 == self.levels.len();
            if self.complete && !deepest && self.levels[level].len() == 1 {
                if let Some(leftover) = self.levels[level].pop_front() {
                    self.push(level + 1, leftover);
                }
            }
            level += 1;
        }
    }
}
