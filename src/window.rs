//! Window adapter: split one ordered record stream into per-span windows.
//!
//! A [`WindowMaker`] owns a single peekable cursor over a shard's raw records
//! and hands out one [`Window`] per span (or a single unfiltered window when
//! the span list is empty). Each window yields only the records its span
//! contains:
//!
//! - records positioned before the span are discarded; they belong to no window
//! - records inside the span are yielded in input order
//! - the first record past the span is left on the cursor for the next window
//!
//! Windows are lazy. Nothing is pulled from the raw iterator until a window is
//! iterated, and a window never pulls past its own upper bound, so no record is
//! ever observed by two windows.
//!
//! ```
//! use shardwalk::interval::Span;
//! use shardwalk::window::WindowMaker;
//!
//! let spans = vec![Span::new(2u64, 4), Span::new(7, 8)];
//! let records: Vec<u64> = (0..10).collect();
//! let mut maker = WindowMaker::new(Box::new(records.into_iter()), &spans).unwrap();
//!
//! let first: Vec<u64> = maker.next_window().unwrap().collect();
//! let second: Vec<u64> = maker.next_window().unwrap().collect();
//! assert_eq!(first, vec![2, 3, 4]);
//! assert_eq!(second, vec![7, 8]);
//! assert!(maker.next_window().is_none());
//! ```

use std::iter::Peekable;

use crate::error::SchedulerError;
use crate::interval::{validate_spans, Located, PosOf, Span};

/// Raw, position-ordered records of one shard.
pub type RecordIter<'a, R> = Box<dyn Iterator<Item = R> + Send + 'a>;

/// Hands out the windows of one shard, in span order.
pub struct WindowMaker<'a, R: Located> {
    cursor: Peekable<RecordIter<'a, R>>,
    spans: &'a [Span<PosOf<R>>],
    next_span: usize,
    unfiltered_taken: bool,
    last_position: Option<PosOf<R>>,
    violation: Option<SchedulerError>,
}

impl<'a, R: Located> WindowMaker<'a, R> {
    /// Wrap `records` and prepare one window per entry of `spans`.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvertedSpan`] or [`SchedulerError::UnsortedSpans`] if
    /// `spans` is not a list of well-formed, ascending, disjoint spans.
    pub fn new(records: RecordIter<'a, R>, spans: &'a [Span<PosOf<R>>]) -> Result<Self, SchedulerError> {
        validate_spans(spans)?;
        Ok(Self {
            cursor: records.peekable(),
            spans,
            next_span: 0,
            unfiltered_taken: false,
            last_position: None,
            violation: None,
        })
    }

    /// Number of windows this maker produces in total.
    #[must_use]
    pub fn window_count(&self) -> usize {
        self.spans.len().max(1)
    }

    /// The next window, or `None` once every span has been visited.
    ///
    /// Stops early after an ordering violation; see [`check`](Self::check).
    pub fn next_window(&mut self) -> Option<Window<'_, 'a, R>> {
        if self.violation.is_some() {
            return None;
        }
        let span = if self.spans.is_empty() {
            if self.unfiltered_taken {
                return None;
            }
            self.unfiltered_taken = true;
            None
        } else {
            let span = self.spans.get(self.next_span)?;
            self.next_span += 1;
            Some(span)
        };
        Some(Window { maker: self, span, yielded: 0 })
    }

    /// Report an out-of-order record seen by any window so far.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::OutOfOrder`] describing the offending pair of positions.
    pub fn check(&mut self) -> Result<(), SchedulerError> {
        match self.violation.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    // Peek at the next record's position, latching an ordering violation.
    fn peek_position(&mut self) -> Option<PosOf<R>> {
        let pos = self.cursor.peek()?.position();
        if let Some(last) = &self.last_position {
            if pos < *last {
                self.violation = Some(SchedulerError::OutOfOrder {
                    previous: format!("{last:?}"),
                    position: format!("{pos:?}"),
                });
                return None;
            }
        }
        Some(pos)
    }

    fn advance(&mut self, pos: PosOf<R>) -> Option<R> {
        self.last_position = Some(pos);
        self.cursor.next()
    }
}

/// Records of one shard restricted to one span.
pub struct Window<'w, 'a, R: Located> {
    maker: &'w mut WindowMaker<'a, R>,
    span: Option<&'a Span<PosOf<R>>>,
    yielded: usize,
}

impl<R: Located> Window<'_, '_, R> {
    /// The span bounding this window, or `None` for an unfiltered window.
    #[must_use]
    pub fn span(&self) -> Option<&Span<PosOf<R>>> {
        self.span
    }

    /// How many records this window has yielded so far.
    #[must_use]
    pub fn yielded(&self) -> usize {
        self.yielded
    }
}

impl<R: Located> Iterator for Window<'_, '_, R> {
    type Item = R;

    fn next(&mut self) -> Option<R> {
        loop {
            let pos = self.maker.peek_position()?;
            match self.span {
                None => {}
                Some(span) if span.starts_after(&pos) => {
                    self.maker.advance(pos);
                    continue;
                }
                Some(span) if span.contains(&pos) => {}
                Some(_) => return None,
            }
            let record = self.maker.advance(pos);
            if record.is_some() {
                self.yielded += 1;
            }
            return record;
        }
    }
}
