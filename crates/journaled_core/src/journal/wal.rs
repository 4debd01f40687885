//! Write-ahead append journal.
//!
//! ```text
//! [header][entry header][payload][entry header][payload]...[footer]
//! ```
//!
//! Entries are only ever appended. A later write overlapping an earlier one
//! leaves the earlier payload in place; the in-memory segment map decides
//! which journal bytes are current for each origin byte.

use super::{persist, Implementation, Journal};
use crate::error::{JournalError, JournalResult};
use crate::format::{read_frame, write_frame, Frame, JournalHeader, WalEntryHeader, WalFooter};
use crate::range::ByteRange;
use journaled_storage::{ByteStore, StorageError};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

/// Largest payload a single entry can hold.
pub const MAX_ENTRY_LENGTH: usize = u16::MAX as usize;

/// Where the current content of an origin range lives in the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Segment {
    journal_offset: u64,
    len: u64,
}

/// Journal staging every write as an appended, checksummed entry.
pub struct WalJournal {
    store: Box<dyn ByteStore>,
    header: JournalHeader,
    /// Keyed by origin start offset; segments never overlap.
    segments: BTreeMap<u64, Segment>,
    append_at: u64,
    entry_count: u32,
    max_entry_length: u16,
    footer: Option<WalFooter>,
}

impl fmt::Debug for WalJournal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalJournal")
            .field("header", &self.header)
            .field("segments", &self.segments.len())
            .field("entry_count", &self.entry_count)
            .field("footer", &self.footer)
            .finish_non_exhaustive()
    }
}

impl WalJournal {
    /// Binds a journal to `store`, which holds just the written `header`.
    pub(crate) fn create(store: Box<dyn ByteStore>, header: JournalHeader) -> Self {
        Self {
            store,
            header,
            segments: BTreeMap::new(),
            append_at: JournalHeader::SIZE as u64,
            entry_count: 0,
            max_entry_length: 0,
            footer: None,
        }
    }

    /// Binds a finalized journal for apply, validating its footer.
    pub(crate) fn open(mut store: Box<dyn ByteStore>, header: JournalHeader) -> JournalResult<Self> {
        let size = store.size()?;
        let minimum = (JournalHeader::SIZE + WalFooter::SIZE) as u64;
        if size < minimum {
            return Err(JournalError::corrupted(
                format!("WAL journal of {size} bytes cannot hold a footer"),
                false,
            ));
        }

        let footer_offset = size - WalFooter::SIZE as u64;
        let footer: WalFooter = read_frame(store.as_mut(), footer_offset)?;
        check_nonce(&header, footer.header_nonce)?;

        Ok(Self {
            store,
            header,
            segments: BTreeMap::new(),
            append_at: footer_offset,
            entry_count: footer.entry_count,
            max_entry_length: footer.max_entry_length,
            footer: Some(footer),
        })
    }

    /// Number of entries appended so far.
    #[must_use]
    pub fn entry_count(&self) -> u32 {
        self.entry_count
    }

    /// Segments intersecting `range`, in origin order.
    fn overlapping(&self, range: ByteRange) -> Vec<(ByteRange, Segment)> {
        let mut found: Vec<_> = self
            .segments
            .range(..range.end())
            .rev()
            .map(|(start, seg)| (ByteRange::new(*start, seg.len), *seg))
            .take_while(|(covered, _)| covered.overlaps(&range))
            .collect();
        found.reverse();
        found
    }

    /// Makes `[start, start + seg.len)` resolve to `seg`, trimming or evicting
    /// whatever covered those bytes before.
    fn insert_segment(&mut self, start: u64, seg: Segment) {
        let written = ByteRange::new(start, seg.len);

        for (old_range, old) in self.overlapping(written) {
            self.segments.remove(&old_range.start());

            if old_range.start() < written.start() {
                self.segments.insert(
                    old_range.start(),
                    Segment {
                        journal_offset: old.journal_offset,
                        len: written.start() - old_range.start(),
                    },
                );
            }

            if old_range.end() > written.end() {
                self.segments.insert(
                    written.end(),
                    Segment {
                        journal_offset: old.journal_offset + (written.end() - old_range.start()),
                        len: old_range.end() - written.end(),
                    },
                );
            }
        }

        self.segments.insert(start, seg);
    }

    fn append_entry(&mut self, offset: u64, payload: &[u8]) -> JournalResult<()> {
        let entry = WalEntryHeader::for_payload(offset, payload);
        let data_offset = self.append_at + WalEntryHeader::SIZE as u64;

        write_frame(self.store.as_mut(), self.append_at, &entry)?;
        self.store.write_at(data_offset, payload)?;

        self.append_at = data_offset + payload.len() as u64;
        self.entry_count = self.entry_count.checked_add(1).ok_or_else(|| {
            JournalError::invalid_argument("WAL journal cannot hold more than u32::MAX entries")
        })?;
        self.max_entry_length = self.max_entry_length.max(entry.length);

        self.insert_segment(
            offset,
            Segment {
                journal_offset: data_offset,
                len: payload.len() as u64,
            },
        );
        Ok(())
    }

    fn footer_for_apply(&self) -> JournalResult<WalFooter> {
        let footer = self.footer.ok_or_else(|| {
            JournalError::invalid_argument("WAL journal must be finalized before it is applied")
        })?;
        check_nonce(&self.header, footer.header_nonce)?;
        Ok(footer)
    }
}

fn check_nonce(header: &JournalHeader, footer_nonce: u64) -> JournalResult<()> {
    if header.nonce != footer_nonce {
        warn!(
            header = header.nonce,
            footer = footer_nonce,
            "WAL footer belongs to another journal"
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

fn with_altered(err: JournalError, origin_altered: bool) -> JournalError {
    match err {
        JournalError::Corrupted { message, .. } => JournalError::Corrupted {
            message,
            origin_altered,
        },
        JournalError::Storage(StorageError::ReadPastEnd { offset, .. }) => {
            JournalError::corrupted(format!("WAL entry at {offset} is truncated"), origin_altered)
        }
        other => other,
    }
}

impl Journal for WalJournal {
    fn implementation(&self) -> Implementation {
        Implementation::Wal
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
        buf.fill(0);
        let request = ByteRange::new(offset, buf.len() as u64);

        let origin_len = origin.size()?;
        if offset < origin_len {
            let from_origin = (origin_len - offset).min(request.len()) as usize;
            origin.read_at(offset, &mut buf[..from_origin])?;
        }

        for (seg_range, seg) in self.overlapping(request) {
            let Some(hit) = request.intersection(&seg_range) else {
                continue;
            };
            let journal_offset = seg.journal_offset + (hit.start() - seg_range.start());
            let at = (hit.start() - offset) as usize;
            self.store
                .read_exact_at(journal_offset, &mut buf[at..at + hit.len() as usize])?;
        }

        Ok(())
    }

    fn write(
        &mut self,
        _origin: &mut dyn ByteStore,
        offset: u64,
        data: &[u8],
    ) -> JournalResult<()> {
        let mut at = offset;
        for chunk in data.chunks(MAX_ENTRY_LENGTH) {
            self.append_entry(at, chunk)?;
            at += chunk.len() as u64;
        }
        Ok(())
    }

    fn finalize(&mut self, final_length: u64, sync: bool) -> JournalResult<()> {
        let footer = WalFooter {
            header_nonce: self.header.nonce,
            entry_count: self.entry_count,
            final_length,
            max_entry_length: self.max_entry_length,
        };

        write_frame(self.store.as_mut(), self.append_at, &footer)?;
        persist(self.store.as_mut(), sync)?;
        self.footer = Some(footer);

        debug!(
            entries = self.entry_count,
            final_length,
            max_entry_length = self.max_entry_length,
            "finalized WAL journal"
        );
        Ok(())
    }

    fn apply(&mut self, origin: &mut dyn ByteStore, sync: bool) -> JournalResult<()> {
        let footer = self.footer_for_apply()?;
        let entries_end = self.store.size()?.saturating_sub(WalFooter::SIZE as u64);

        let mut altered = false;
        if origin.size()? != footer.final_length {
            origin.set_size(footer.final_length)?;
            altered = true;
        }

        let mut payload = vec![0u8; usize::from(footer.max_entry_length)];
        let mut position = JournalHeader::SIZE as u64;

        for index in 0..footer.entry_count {
            let entry: WalEntryHeader = read_frame(self.store.as_mut(), position)
                .map_err(|e| with_altered(e, altered))?;

            if entry.length > footer.max_entry_length || position + entry.total_size() > entries_end
            {
                warn!(index, position, "WAL entry overruns the journal");
                return Err(JournalError::corrupted(
                    format!("WAL entry {index} at {position} overruns the journal"),
                    altered,
                ));
            }

            let data = &mut payload[..usize::from(entry.length)];
            self.store
                .read_exact_at(position + WalEntryHeader::SIZE as u64, data)
                .map_err(|e| with_altered(e.into(), altered))?;

            if !entry.verify(data) {
                warn!(index, position, "WAL entry checksum mismatch");
                return Err(JournalError::corrupted(
                    format!("WAL entry {index} at {position} has a bad checksum"),
                    altered,
                ));
            }

            // Bytes past the final length were cut off later in the transaction
            let writable = footer
                .final_length
                .saturating_sub(entry.inner_offset)
                .min(u64::from(entry.length)) as usize;
            if writable > 0 {
                origin.write_at(entry.inner_offset, &data[..writable])?;
                altered = true;
            }

            position += entry.total_size();
        }

        persist(origin, sync)?;

        debug!(
            entries = footer.entry_count,
            final_length = footer.final_length,
            "applied WAL journal"
        );
        Ok(())
    }
}
