//! Positions, located records and closed spans.
//!
//! The engine never interprets a position. It only needs a total order, so
//! anything `Ord` works: plain offsets, `(contig, offset)` tuples, timestamps.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{Debug, Display, Formatter, Result as FormatResult};
use std::hash::{Hash, Hasher};

use crate::error::SchedulerError;

/// Bounds every record position satisfies.
pub trait Position: 'static + Ord + Clone + Debug + Send + Sync {}
impl<T> Position for T where T: 'static + Ord + Clone + Debug + Send + Sync {}

/// A record with a position in the ordered input.
pub trait Located {
    type Pos: Position;

    fn position(&self) -> Self::Pos;
}

/// Position type of a record type.
pub type PosOf<R> = <R as Located>::Pos;

macro_rules! located_scalar {
    ($($t:ty),*) => {
        $(
            impl Located for $t {
                type Pos = $t;
                #[inline]
                fn position(&self) -> $t { *self }
            }
        )*
    };
}

located_scalar!(u32, u64, i64, usize);

impl<P: Position, V> Located for (P, V) {
    type Pos = P;

    #[inline]
    fn position(&self) -> P {
        self.0.clone()
    }
}

/// A closed range of positions: [start, end].
#[derive(Clone, Debug, Serialize, Deserialize, Eq)]
pub struct Span<P> {
    pub start: P,
    pub end: P,
}

impl<P: Position> Span<P> {
    #[inline]
    pub fn new(start: P, end: P) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    /// A span covering exactly one position.
    #[inline]
    pub fn point(p: P) -> Self {
        Self { start: p.clone(), end: p }
    }

    #[inline]
    pub fn contains(&self, p: &P) -> bool {
        *p >= self.start && *p <= self.end
    }

    /// The position lies before this span.
    #[inline]
    pub fn starts_after(&self, p: &P) -> bool {
        *p < self.start
    }

    /// The position lies past this span.
    #[inline]
    pub fn ends_before(&self, p: &P) -> bool {
        *p > self.end
    }

    /// This span ends before `other` starts.
    #[inline]
    pub fn is_before(&self, other: &Self) -> bool {
        self.end < other.start
    }

    /// This span starts after `other` ends.
    #[inline]
    pub fn is_past(&self, other: &Self) -> bool {
        self.start > other.end
    }

    #[inline]
    pub fn overlaps(&self, other: &Self) -> bool {
        !self.is_before(other) && !self.is_past(other)
    }

    /// `other` lies entirely inside this span.
    #[inline]
    pub fn covers(&self, other: &Self) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn intersect(&self, other: &Self) -> Option<Self> {
        if !self.overlaps(other) {
            return None;
        }
        let start = if self.start >= other.start { &self.start } else { &other.start };
        let end = if self.end <= other.end { &self.end } else { &other.end };
        Some(Self { start: start.clone(), end: end.clone() })
    }
}

// Ordered by start, then end, so span lists sort the way windows are visited.
impl<P: PartialEq> PartialEq for Span<P> {
    #[inline] fn eq(&self, other: &Self) -> bool { self.start == other.start && self.end == other.end }
}
impl<P: Hash> Hash for Span<P> {
    #[inline] fn hash<H: Hasher>(&self, state: &mut H) { self.start.hash(state); self.end.hash(state); }
}
impl<P: Ord> Ord for Span<P> {
    #[inline] fn cmp(&self, o: &Self) -> Ordering {
        self.start.cmp(&o.start).then(self.end.cmp(&o.end))
    }
}
impl<P: Ord> PartialOrd for Span<P> {
    #[inline] fn partial_cmp(&self, o: &Self) -> Option<Ordering> { Some(self.cmp(o)) }
}

impl<P: Debug> Display for Span<P> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        write!(f, "[{:?}, {:?}]", self.start, self.end)
    }
}

/// Check that every span is well formed and that `spans` is ascending and
/// pairwise disjoint.
///
/// # Errors
///
/// [`SchedulerError::InvertedSpan`] for a span that starts after it ends, or
/// [`SchedulerError::UnsortedSpans`] naming the first out-of-order span.
pub fn validate_spans<P: Position>(spans: &[Span<P>]) -> Result<(), SchedulerError> {
    if let Some((index, span)) = spans.iter().enumerate().find(|(_, s)| s.start > s.end) {
        return Err(SchedulerError::InvertedSpan {
            index,
            span: span.to_string(),
        });
    }
    for (index, pair) in spans.windows(2).enumerate() {
        if !pair[0].is_before(&pair[1]) {
            return Err(SchedulerError::UnsortedSpans {
                index: index + 1,
                span: pair[1].to_string(),
            });
        }
    }
    Ok(())
}
