//! Shards: the externally produced units of work.

use anyhow::Result;

use crate::interval::{Located, PosOf, Span};
use crate::window::RecordIter;

/// One contiguous partition of the ordered input.
///
/// A shard is immutable once handed to a scheduler. The scheduler only reads
/// its span list and opens its records, once per traversal.
pub trait Shard: Send {
    type Record: Located + Send;

    /// Ascending, disjoint spans of interest inside this shard. Empty means
    /// "every record", traversed as one unfiltered window.
    fn spans(&self) -> &[Span<PosOf<Self::Record>>];

    /// Open a position-ordered iterator over this shard's records.
    ///
    /// # Errors
    ///
    /// Whatever the underlying data source reports.
    fn open(&self) -> Result<RecordIter<'_, Self::Record>>;

    /// Smallest span enclosing every span of interest; `None` when unfiltered.
    fn extent(&self) -> Option<Span<PosOf<Self::Record>>> {
        match (self.spans().first(), self.spans().last()) {
            (Some(first), Some(last)) => Some(Span {
                start: first.start.clone(),
                end: last.end.clone(),
            }),
            _ => None,
        }
    }

    /// Short label used in log lines.
    fn describe(&self) -> String {
        match self.extent() {
            Some(extent) => extent.to_string(),
            None => "unfiltered shard".to_string(),
        }
    }
}

/// A shard whose records live in memory.
#[derive(Clone, Debug)]
pub struct MemoryShard<R: Located> {
    records: Vec<R>,
    spans: Vec<Span<PosOf<R>>>,
}

impl<R: Located> MemoryShard<R> {
    /// An unfiltered shard over `records`.
    #[must_use]
    pub fn new(records: Vec<R>) -> Self {
        Self { records, spans: Vec::new() }
    }

    /// A shard over `records` restricted to `spans`.
    #[must_use]
    pub fn with_spans(records: Vec<R>, spans: Vec<Span<PosOf<R>>>) -> Self {
        Self { records, spans }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<R> Shard for MemoryShard<R>
where
    R: Located + Clone + Send + Sync,
{
    type Record = R;

    fn spans(&self) -> &[Span<PosOf<R>>] {
        &self.spans
    }

    fn open(&self) -> Result<RecordIter<'_, R>> {
        Ok(Box::new(self.records.iter().cloned()))
    }
}
