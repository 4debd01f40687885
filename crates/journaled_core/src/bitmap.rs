//! Growable block-dirty bitmap.

/// One bit per block, stored in 64-bit words.
///
/// The bitmap grows by appending zero words as higher blocks become dirty
/// and never shrinks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirtyBitmap {
    words: Vec<u64>,
}

impl DirtyBitmap {
    /// Bits per word.
    pub const WORD_BITS: u64 = 64;

    /// Creates an empty bitmap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bitmap from stored words.
    #[must_use]
    pub fn from_words(words: Vec<u64>) -> Self {
        Self { words }
    }

    /// Returns the backing words.
    #[must_use]
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Number of backing words.
    #[must_use]
    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// Number of blocks the bitmap describes.
    #[must_use]
    pub fn block_capacity(&self) -> u64 {
        self.words.len() as u64 * Self::WORD_BITS
    }

    /// Returns true if `block` is dirty.
    #[must_use]
    pub fn is_dirty(&self, block: u64) -> bool {
        let word = (block / Self::WORD_BITS) as usize;
        self.words
            .get(word)
            .is_some_and(|w| w & (1u64 << (block % Self::WORD_BITS)) != 0)
    }

    /// Marks `count` blocks starting at `first` dirty.
    pub fn mark_range(&mut self, first: u64, count: u64) {
        if count == 0 {
            return;
        }

        let last = first + count - 1;
        let needed = (last / Self::WORD_BITS) as usize + 1;
        if self.words.len() < needed {
            self.words.resize(needed, 0);
        }

        for block in first..=last {
            self.words[(block / Self::WORD_BITS) as usize] |= 1u64 << (block % Self::WORD_BITS);
        }
    }

    /// Number of dirty blocks.
    #[must_use]
    pub fn dirty_count(&self) -> u64 {
        self.words.iter().map(|w| u64::from(w.count_ones())).sum()
    }

    /// Highest dirty block, if any.
    #[must_use]
    pub fn last_dirty(&self) -> Option<u64> {
        let (index, word) = self
            .words
            .iter()
            .enumerate()
            .rev()
            .find(|(_, w)| **w != 0)?;
        Some(index as u64 * Self::WORD_BITS + u64::from(63 - word.leading_zeros()))
    }

    /// Maximal runs of consecutive dirty blocks in `[first, end)`, as
    /// `(first_block, block_count)`.
    ///
    /// Blocks beyond the bitmap's capacity are never dirty.
    pub fn dirty_runs(&self, first: u64, end: u64) -> DirtyRuns<'_> {
        DirtyRuns {
            bitmap: self,
            next: first,
            limit: end.min(self.block_capacity()),
        }
    }
}

/// Iterator returned by [`DirtyBitmap::dirty_runs`].
#[derive(Debug)]
pub struct DirtyRuns<'a> {
    bitmap: &'a DirtyBitmap,
    next: u64,
    limit: u64,
}

impl Iterator for DirtyRuns<'_> {
    type Item = (u64, u64);

    fn next(&mut self) -> Option<Self::Item> {
        while self.next < self.limit && !self.bitmap.is_dirty(self.next) {
            self.next += 1;
        }
        if self.next >= self.limit {
            return None;
        }

        let first = self.next;
        while self.next < self.limit && self.bitmap.is_dirty(self.next) {
            self.next += 1;
        }
        Some((first, self.next - first))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_on_demand() {
        let mut bitmap = DirtyBitmap::new();
        assert_eq!(bitmap.word_count(), 0);
        assert!(!bitmap.is_dirty(5));

        bitmap.mark_range(130, 1);
        assert_eq!(bitmap.word_count(), 3);
        assert!(bitmap.is_dirty(130));
        assert!(!bitmap.is_dirty(129));
        assert_eq!(bitmap.dirty_count(), 1);
        assert_eq!(bitmap.last_dirty(), Some(130));
    }

    #[test]
    fn mark_across_words() {
        let mut bitmap = DirtyBitmap::new();
        bitmap.mark_range(60, 10);
        assert_eq!(bitmap.word_count(), 2);
        assert_eq!(bitmap.dirty_count(), 10);
        assert!(bitmap.is_dirty(63));
        assert!(bitmap.is_dirty(64));
        assert!(!bitmap.is_dirty(70));
        assert_eq!(bitmap.last_dirty(), Some(69));
        assert_eq!(DirtyBitmap::from_words(vec![0, 0]).last_dirty(), None);
    }

    #[test]
    fn runs() {
        let mut bitmap = DirtyBitmap::new();
        bitmap.mark_range(0, 2);
        bitmap.mark_range(5, 1);
        bitmap.mark_range(62, 4);

        let runs: Vec<_> = bitmap.dirty_runs(0, u64::MAX).collect();
        assert_eq!(runs, vec![(0, 2), (5, 1), (62, 4)]);
    }

    #[test]
    fn runs_respect_limit() {
        let mut bitmap = DirtyBitmap::new();
        bitmap.mark_range(0, 10);
        bitmap.mark_range(20, 5);

        let runs: Vec<_> = bitmap.dirty_runs(0, 3).collect();
        assert_eq!(runs, vec![(0, 3)]);

        let runs: Vec<_> = bitmap.dirty_runs(0, 22).collect();
        assert_eq!(runs, vec![(0, 10), (20, 2)]);

        let runs: Vec<_> = bitmap.dirty_runs(8, 21).collect();
        assert_eq!(runs, vec![(8, 2), (20, 1)]);
    }

    #[test]
    fn from_words_roundtrip() {
        let mut bitmap = DirtyBitmap::new();
        bitmap.mark_range(3, 70);
        let restored = DirtyBitmap::from_words(bitmap.words().to_vec());
        assert_eq!(restored, bitmap);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn runs_cover_exactly_the_marked_blocks(
                marks in prop::collection::vec((0u64..300, 1u64..40), 0..12),
                first in 0u64..200,
                span in 0u64..400,
            ) {
                let mut bitmap = DirtyBitmap::new();
                let mut naive = vec![false; 400];
                for (start, count) in &marks {
                    bitmap.mark_range(*start, *count);
                    for block in *start..start + count {
                        naive[block as usize] = true;
                    }
                }

                let end = first + span;
                let mut covered = vec![false; 400];
                let mut previous_end = None;
                for (run_first, run_len) in bitmap.dirty_runs(first, end) {
                    prop_assert!(run_len > 0);
                    prop_assert!(run_first >= first && run_first + run_len <= end);
                    // Runs are maximal, so two never touch
                    if let Some(prev) = previous_end {
                        prop_assert!(run_first > prev);
                    }
                    for block in run_first..run_first + run_len {
                        covered[block as usize] = true;
                    }
                    previous_end = Some(run_first + run_len);
                }

                for block in first..end.min(400) {
                    prop_assert_eq!(covered[block as usize], naive[block as usize]);
                }
                prop_assert_eq!(bitmap.dirty_count(), naive.iter().filter(|d| **d).count() as u64);
            }
        }
    }
}
