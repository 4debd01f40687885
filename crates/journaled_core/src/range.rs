//! Half-open byte ranges.

use std::fmt;

/// The half-open byte range `[start, start + len)`.
///
/// Ranges order by start, then by length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ByteRange {
    start: u64,
    len: u64,
}

impl ByteRange {
    /// Creates the range `[start, start + len)`.
    #[must_use]
    pub const fn new(start: u64, len: u64) -> Self {
        Self { start, len }
    }

    /// Creates the range `[start, end)`; an inverted pair yields an empty range.
    #[must_use]
    pub const fn from_bounds(start: u64, end: u64) -> Self {
        Self {
            start,
            len: end.saturating_sub(start),
        }
    }

    /// Inclusive start.
    #[must_use]
    pub const fn start(&self) -> u64 {
        self.start
    }

    /// Length in bytes.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.len
    }

    /// Exclusive end.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.start + self.len
    }

    /// Returns true if the range covers no bytes.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns true if the two ranges share at least one byte.
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end() && other.start < self.end()
    }

    /// Returns the shared part of the two ranges, if any.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let start = self.start.max(other.start);
        let end = self.end().min(other.end());
        (start < end).then(|| Self::from_bounds(start, end))
    }

    /// Returns the range with its end clipped to `limit`.
    #[must_use]
    pub fn clip_end(&self, limit: u64) -> Self {
        Self::from_bounds(self.start, self.end().min(limit))
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end())
    }
}
