//! Builders for shards and shard lists.

use std::ops::Range;

use crate::interval::Span;
use crate::shard::MemoryShard;
use crate::testing::fixtures::Record;

/// A fluent builder for one in-memory shard.
///
/// ```
/// use shardwalk::shard::Shard;
/// use shardwalk::testing::ShardBuilder;
///
/// let shard = ShardBuilder::new()
///     .positions(0..10)
///     .span(2, 4)
///     .span(7, 8)
///     .build();
///
/// assert_eq!(shard.len(), 10);
/// assert_eq!(shard.spans().len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct ShardBuilder {
    records: Vec<Record>,
    spans: Vec<Span<u64>>,
}

impl ShardBuilder {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
            spans: Vec::new(),
        }
    }

    /// Add one record per position in `range`.
    #[must_use]
    pub fn positions(mut self, range: Range<u64>) -> Self {
        self.records.extend(range.map(Record::at));
        self
    }

    #[must_use]
    pub fn record(mut self, record: Record) -> Self {
        self.records.push(record);
        self
    }

    /// Restrict the shard to `[start, end]` in addition to any earlier spans.
    #[must_use]
    pub fn span(mut self, start: u64, end: u64) -> Self {
        self.spans.push(Span::new(start, end));
        self
    }

    #[must_use]
    pub fn build(self) -> MemoryShard<Record> {
        MemoryShard::with_spans(self.records, self.spans)
    }
}

/// Unfiltered shards holding `counts[i]` records each, positioned
/// consecutively across shards.
///
/// ```
/// use shardwalk::testing::shards_with_counts;
///
/// let shards = shards_with_counts(&[3, 0, 5]);
/// assert_eq!(shards.iter().map(|s| s.len()).collect::<Vec<_>>(), vec![3, 0, 5]);
/// ```
#[must_use]
pub fn shards_with_counts(counts: &[usize]) -> Vec<MemoryShard<Record>> {
    let mut next = 0u64;
    counts
        .iter()
        .map(|&count| {
            let start = next;
            next += count as u64;
            MemoryShard::new((start..next).map(Record::at).collect())
        })
        .collect()
}

/// `shards` unfiltered shards of `per_shard` consecutive records each.
#[must_use]
pub fn uniform_shards(shards: usize, per_shard: usize) -> Vec<MemoryShard<Record>> {
    shards_with_counts(&vec![per_shard; shards])
}
