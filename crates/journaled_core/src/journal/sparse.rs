//! Block-bitmap sparse journal.
//!
//! ```text
//! 0            block_size                                     bitmap_offset
//! [header|pad ][block 0][block 1]...[block n]               [bitmap words][footer]
//! ```
//!
//! Block `i` of the origin is staged at journal offset
//! `block_size + i * block_size`, so the first block of the journal is
//! reserved for the header. Writes are widened to whole blocks: the missing
//! bytes come from the current view (origin patched with already dirty
//! blocks). Unwritten blocks stay holes in file-backed journals.
//!
//! The format carries no payload checksums; only structural damage to the
//! footer and bitmap is detected.

use super::{persist, Implementation, Journal};
use crate::bitmap::DirtyBitmap;
use crate::block::BlockSize;
use crate::error::{JournalError, JournalResult};
use crate::format::{read_frame, write_frame, Frame, JournalHeader, SparseFooter};
use crate::range::ByteRange;
use journaled_storage::{ByteStore, StorageError};
use std::fmt;
use tracing::{debug, warn};

/// Default block size power (4 KiB blocks).
pub const DEFAULT_SPARSE_BLOCK_POWER: u8 = BlockSize::DEFAULT.power();

/// Smallest block size power; a block must be larger than the header.
pub const MIN_SPARSE_BLOCK_POWER: u8 = 5;

const COPY_BUFFER_SIZE: usize = 4096;
const WORD_BYTES: u64 = 8;

/// Journal staging whole blocks tracked by a dirty bitmap.
pub struct SparseJournal {
    store: Box<dyn ByteStore>,
    header: JournalHeader,
    block_size: BlockSize,
    bitmap: DirtyBitmap,
    footer: Option<SparseFooter>,
}

impl fmt::Debug for SparseJournal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SparseJournal")
            .field("header", &self.header)
            .field("block_size", &self.block_size)
            .field("dirty_blocks", &self.bitmap.dirty_count())
            .field("footer", &self.footer)
            .finish_non_exhaustive()
    }
}

impl SparseJournal {
    /// Binds a journal to `store`, which holds just the written `header`.
    pub(crate) fn create(
        store: Box<dyn ByteStore>,
        header: JournalHeader,
        block_size: BlockSize,
    ) -> JournalResult<Self> {
        check_block_size(block_size).map_err(JournalError::invalid_argument)?;
        Ok(Self {
            store,
            header,
            block_size,
            bitmap: DirtyBitmap::new(),
            footer: None,
        })
    }

    /// Binds a finalized journal for apply, validating footer and bitmap.
    pub(crate) fn open(mut store: Box<dyn ByteStore>, header: JournalHeader) -> JournalResult<Self> {
        let size = store.size()?;
        let minimum = (JournalHeader::SIZE + SparseFooter::SIZE) as u64;
        if size < minimum {
            return Err(JournalError::corrupted(
                format!("sparse journal of {size} bytes cannot hold a footer"),
                false,
            ));
        }

        let footer: SparseFooter = read_frame(store.as_mut(), size - SparseFooter::SIZE as u64)?;
        check_nonce(&header, footer.header_nonce)?;

        let block_size = BlockSize::from_power(footer.block_power)
            .map_err(|e| JournalError::corrupted(e.to_string(), false))?;
        check_block_size(block_size).map_err(|m| JournalError::corrupted(m, false))?;

        let bitmap_len = u64::from(footer.bitmap_word_count) * WORD_BYTES;
        let expected_size = footer
            .bitmap_offset
            .checked_add(bitmap_len + SparseFooter::SIZE as u64);
        if expected_size != Some(size) || footer.bitmap_offset < block_size.size() {
            return Err(JournalError::corrupted(
                format!(
                    "sparse bitmap of {} words at {} does not fit a {size} byte journal",
                    footer.bitmap_word_count, footer.bitmap_offset
                ),
                false,
            ));
        }

        let mut raw = vec![0u8; bitmap_len as usize];
        store.read_exact_at(footer.bitmap_offset, &mut raw)?;
        let words = raw
            .chunks_exact(WORD_BYTES as usize)
            .map(|w| {
                let mut word = [0u8; 8];
                word.copy_from_slice(w);
                u64::from_le_bytes(word)
            })
            .collect();
        let bitmap = DirtyBitmap::from_words(words);

        if let Some(last) = bitmap.last_dirty() {
            let data_end = data_offset(block_size, block_size.block_offset(last + 1));
            if data_end > footer.bitmap_offset {
                return Err(JournalError::corrupted(
                    format!("dirty block {last} lies past the staged data region"),
                    false,
                ));
            }
        }

        Ok(Self {
            store,
            header,
            block_size,
            bitmap,
            footer: Some(footer),
        })
    }

    /// Block size used for staging.
    #[must_use]
    pub fn block_size(&self) -> BlockSize {
        self.block_size
    }

    /// Dirty-block bitmap.
    #[must_use]
    pub fn bitmap(&self) -> &DirtyBitmap {
        &self.bitmap
    }

    /// Origin length recorded by finalize, if finalized.
    #[must_use]
    pub fn final_length(&self) -> Option<u64> {
        self.footer.map(|f| f.final_length)
    }

    /// Builds the current view of the whole blocks covering `range`.
    ///
    /// Returns the aligned start offset and the aligned buffer.
    fn load_aligned(
        &mut self,
        origin: &mut dyn ByteStore,
        range: ByteRange,
    ) -> JournalResult<(u64, Vec<u8>)> {
        let bs = self.block_size;
        let start = bs.round_down(range.start());
        let end = bs.round_up(range.end());
        let mut buf = vec![0u8; (end - start) as usize];

        let origin_len = origin.size()?;
        if start < origin_len {
            let from_origin = (origin_len - start).min(end - start) as usize;
            origin.read_exact_at(start, &mut buf[..from_origin])?;
        }

        let first = bs.block_index(start);
        let last = bs.block_index(end);
        let runs: Vec<_> = self.bitmap.dirty_runs(first, last).collect();
        for (run_first, run_count) in runs {
            let at = (bs.block_offset(run_first) - start) as usize;
            let len = bs.block_offset(run_count) as usize;
            self.store.read_exact_at(
                data_offset(bs, bs.block_offset(run_first)),
                &mut buf[at..at + len],
            )?;
        }

        Ok((start, buf))
    }

    fn footer_for_apply(&self) -> JournalResult<SparseFooter> {
        let footer = self.footer.ok_or_else(|| {
            JournalError::invalid_argument("sparse journal must be finalized before it is applied")
        })?;
        check_nonce(&self.header, footer.header_nonce)?;
        Ok(footer)
    }
}

/// Journal position of origin byte `origin_offset`.
fn data_offset(block_size: BlockSize, origin_offset: u64) -> u64 {
    block_size.size() + origin_offset
}

fn check_block_size(block_size: BlockSize) -> Result<(), String> {
    if block_size.power() < MIN_SPARSE_BLOCK_POWER {
        return Err(format!(
            "sparse block size {block_size} is below the minimum power {MIN_SPARSE_BLOCK_POWER}"
        ));
    }
    Ok(())
}

fn check_nonce(header: &JournalHeader, footer_nonce: u64) -> JournalResult<()> {
    if header.nonce != footer_nonce {
        warn!(
            header = header.nonce,
            footer = footer_nonce,
            "sparse footer belongs to another journal"
        );
        return Err(JournalError::corrupted(
            format!(
                "header and footer do not match, nonces: {:#x} and {footer_nonce:#x}",
                header.nonce
            ),
            false,
        ));
    }
    Ok(())
}

impl Journal for SparseJournal {
    fn implementation(&self) -> Implementation {
        Implementation::Sparse
    }

    fn header(&self) -> &JournalHeader {
        &self.header
    }

    fn store_mut(&mut self) -> &mut dyn ByteStore {
        self.store.as_mut()
    }

    fn read(
        &mut self,
        origin: &mut dyn ByteStore,
        offset: u64,
        buf: &mut [u8],
    ) -> JournalResult<()> {
        if buf.is_empty() {
            return Ok(());
        }

        let (start, aligned) = self.load_aligned(origin, ByteRange::new(offset, buf.len() as u64))?;
        let at = (offset - start) as usize;
        buf.copy_from_slice(&aligned[at..at + buf.len()]);
        Ok(())
    }

    fn write(&mut self, origin: &mut dyn ByteStore, offset: u64, data: &[u8]) -> JournalResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let (start, mut aligned) =
            self.load_aligned(origin, ByteRange::new(offset, data.len() as u64))?;
        let at = (offset - start) as usize;
        aligned[at..at + data.len()].copy_from_slice(data);

        let bs = self.block_size;
        self.store.write_at(data_offset(bs, start), &aligned)?;
        self.bitmap
            .mark_range(bs.block_index(start), bs.block_index(aligned.len() as u64));
        Ok(())
    }

    fn finalize(&mut self, final_length: u64, sync: bool) -> JournalResult<()> {
        let bitmap_offset = self.store.size()?.max(self.block_size.size());
        let words = self.bitmap.words();
        let bitmap_word_count = u32::try_from(words.len()).map_err(|_| {
            JournalError::invalid_argument("sparse bitmap exceeds u32::MAX words")
        })?;

        let mut raw = Vec::with_capacity(words.len() * WORD_BYTES as usize);
        for word in words {
            raw.extend_from_slice(&word.to_le_bytes());
        }

        let footer = SparseFooter {
            header_nonce: self.header.nonce,
            final_length,
            block_power: self.block_size.power(),
            bitmap_word_count,
            bitmap_offset,
        };

        self.store.write_at(bitmap_offset, &raw)?;
        write_frame(
            self.store.as_mut(),
            bitmap_offset + raw.len() as u64,
            &footer,
        )?;
        persist(self.store.as_mut(), sync)?;
        self.footer = Some(footer);

        debug!(
            dirty_blocks = self.bitmap.dirty_count(),
            words = bitmap_word_count,
            final_length,
            "finalized sparse journal"
        );
        Ok(())
    }

    fn apply(&mut self, origin: &mut dyn ByteStore, sync: bool) -> JournalResult<()> {
        let footer = self.footer_for_apply()?;
        let bs = self.block_size;

        let mut altered = false;
        if origin.size()? != footer.final_length {
            origin.set_size(footer.final_length)?;
            altered = true;
        }

        let blocks = bs.block_count_round_up(footer.final_length);
        let runs: Vec<_> = self.bitmap.dirty_runs(0, blocks).collect();
        let mut copy = vec![0u8; COPY_BUFFER_SIZE];
        let mut copied = 0u64;

        for (first, count) in runs {
            let run = ByteRange::from_bounds(bs.block_offset(first), bs.block_offset(first + count))
                .clip_end(footer.final_length);

            let mut position = run.start();
            while position < run.end() {
                let len = (run.end() - position).min(COPY_BUFFER_SIZE as u64) as usize;
                match self
                    .store
                    .read_exact_at(data_offset(bs, position), &mut copy[..len])
                {
                    Ok(()) => {}
                    Err(StorageError::ReadPastEnd { offset, .. }) => {
                        warn!(offset, "sparse journal data region is truncated");
                        return Err(JournalError::corrupted(
                            format!("sparse data at {offset} is truncated"),
                            altered,
                        ));
                    }
                    Err(e) => return Err(e.into()),
                }
                origin.write_at(position, &copy[..len])?;
                altered = true;
                position += len as u64;
                copied += len as u64;
            }
        }

        persist(origin, sync)?;

        debug!(
            bytes = copied,
            final_length = footer.final_length,
            "applied sparse journal"
        );
        Ok(())
    }
}
