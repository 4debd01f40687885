//! Power-of-two block size arithmetic.

use crate::error::{JournalError, JournalResult};
use std::fmt;

/// A block size of `2^power` bytes, `power <= 31`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockSize {
    power: u8,
}

impl BlockSize {
    /// Largest supported power.
    pub const MAX_POWER: u8 = 31;

    /// 4 KiB blocks.
    pub const DEFAULT: Self = Self { power: 12 };

    /// Creates a block size of `2^power` bytes.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error if `power` exceeds [`Self::MAX_POWER`].
    pub fn from_power(power: u8) -> JournalResult<Self> {
        if power > Self::MAX_POWER {
            return Err(JournalError::invalid_argument(format!(
                "block power {power} exceeds {}",
                Self::MAX_POWER
            )));
        }
        Ok(Self { power })
    }

    /// Returns the power of two.
    #[must_use]
    pub const fn power(self) -> u8 {
        self.power
    }

    /// Returns the size in bytes.
    #[must_use]
    pub const fn size(self) -> u64 {
        1 << self.power
    }

    /// Returns the mask of in-block offset bits.
    #[must_use]
    pub const fn mask(self) -> u64 {
        self.size() - 1
    }

    /// Rounds `value` down to a block boundary.
    #[must_use]
    pub const fn round_down(self, value: u64) -> u64 {
        value & !self.mask()
    }

    /// Rounds `value` up to a block boundary.
    ///
    /// Values past the last whole block representable in a `u64` round to
    /// that block.
    #[must_use]
    pub const fn round_up(self, value: u64) -> u64 {
        if self.is_aligned(value) {
            value
        } else {
            self.round_down(value.saturating_add(self.size()))
        }
    }

    /// Number of blocks needed to cover `size` bytes.
    #[must_use]
    pub const fn block_count_round_up(self, size: u64) -> u64 {
        self.round_up(size) >> self.power
    }

    /// Returns true if `value` is a multiple of the block size.
    #[must_use]
    pub const fn is_aligned(self, value: u64) -> bool {
        value & self.mask() == 0
    }

    /// Index of the block containing `offset`.
    #[must_use]
    pub const fn block_index(self, offset: u64) -> u64 {
        offset >> self.power
    }

    /// Byte offset of block `index`.
    #[must_use]
    pub const fn block_offset(self, index: u64) -> u64 {
        index << self.power
    }
}

impl fmt::Display for BlockSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes (2^{})", self.size(), self.power)
    }
}
