//! Read-only diagnostics for a journal store.
//!
//! Inspection never modifies the journal or touches an origin. Structural
//! problems are collected into the report instead of being returned as
//! errors, so a damaged journal can still be described.

use crate::error::JournalResult;
use crate::format::{read_frame, Frame, JournalHeader, WalEntryHeader, WalFooter};
use crate::journal::{Implementation, SparseJournal};
use journaled_storage::ByteStore;
use serde::Serialize;

/// Description of a journal store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JournalReport {
    /// Size of the journal store in bytes.
    pub size: u64,
    /// Strategy name from the header, if the header is readable.
    pub implementation: Option<String>,
    /// Raw strategy identifier from the header.
    pub implementation_id: Option<u8>,
    /// Nonce from the header.
    pub nonce: Option<u64>,
    /// Whether the committed flag is set.
    pub committed: bool,
    /// Origin length recorded in the footer.
    pub final_length: Option<u64>,
    /// WAL details, for WAL journals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wal: Option<WalReport>,
    /// Sparse details, for sparse journals with a valid footer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sparse: Option<SparseReport>,
    /// Structural problems found.
    pub problems: Vec<String>,
}

/// Entry walk of a WAL journal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WalReport {
    /// Entries walked.
    pub entries: u32,
    /// Entry count recorded in the footer.
    pub footer_entries: Option<u32>,
    /// Total payload bytes walked.
    pub payload_bytes: u64,
    /// Largest payload walked.
    pub max_entry_length: u16,
    /// Journal offsets of entries whose payload fails its checksum.
    pub checksum_failures: Vec<u64>,
}

/// Layout of a sparse journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SparseReport {
    /// Block size in bytes.
    pub block_size: u64,
    /// Number of bitmap words.
    pub bitmap_words: usize,
    /// Number of staged blocks.
    pub dirty_blocks: u64,
}

impl JournalReport {
    fn empty(size: u64) -> Self {
        Self {
            size,
            implementation: None,
            implementation_id: None,
            nonce: None,
            committed: false,
            final_length: None,
            wal: None,
            sparse: None,
            problems: Vec::new(),
        }
    }

    /// Returns true if no structural problem was found.
    ///
    /// An uncommitted journal without a footer is healthy: it is simply
    /// still being written or was abandoned.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Inspects the journal held by `store`.
///
/// # Errors
///
/// Returns a storage error if the store cannot be read. Corruption is
/// reported in [`JournalReport::problems`].
pub fn inspect_journal(mut store: Box<dyn ByteStore>) -> JournalResult<JournalReport> {
    let size = store.size()?;
    let mut report = JournalReport::empty(size);

    let header: JournalHeader = match read_frame(store.as_mut(), 0) {
        Ok(header) => header,
        Err(e) if e.is_corruption() => {
            report.problems.push(format!("unreadable header: {e}"));
            return Ok(report);
        }
        Err(e) => return Err(e),
    };

    let implementation = Implementation::from_id(header.implementation_id);
    report.implementation = Some(implementation.to_string());
    report.implementation_id = Some(header.implementation_id);
    report.nonce = Some(header.nonce);
    report.committed = header.is_committed();

    match implementation {
        Implementation::Wal => inspect_wal(store.as_mut(), &header, &mut report)?,
        Implementation::Sparse => inspect_sparse(store, header, &mut report),
        Implementation::Unknown(id) => {
            report.problems.push(format!("unknown implementation id {id}"));
        }
    }

    Ok(report)
}

fn inspect_wal(
    store: &mut dyn ByteStore,
    header: &JournalHeader,
    report: &mut JournalReport,
) -> JournalResult<()> {
    let size = report.size;
    let mut wal = WalReport::default();

    let footer = if size >= (JournalHeader::SIZE + WalFooter::SIZE) as u64 {
        read_frame::<WalFooter>(store, size - WalFooter::SIZE as u64).ok()
    } else {
        None
    };

    let entries_end = match footer {
        Some(footer) => {
            report.final_length = Some(footer.final_length);
            wal.footer_entries = Some(footer.entry_count);
            if footer.header_nonce != header.nonce {
                report.problems.push(format!(
                    "footer nonce {:#x} does not match header nonce {:#x}",
                    footer.header_nonce, header.nonce
                ));
            }
            size - WalFooter::SIZE as u64
        }
        None => {
            if report.committed {
                report.problems.push("committed journal has no footer".to_string());
            }
            size
        }
    };

    let mut position = JournalHeader::SIZE as u64;
    while position < entries_end {
        if entries_end - position < WalEntryHeader::SIZE as u64 {
            report.problems.push(format!(
                "{} trailing bytes at {position} are too short for an entry",
                entries_end - position
            ));
            break;
        }

        let entry: WalEntryHeader = match read_frame(store, position) {
            Ok(entry) => entry,
            Err(e) if e.is_corruption() => {
                report.problems.push(format!("entry at {position}: {e}"));
                break;
            }
            Err(e) => return Err(e),
        };

        let end = position + entry.total_size();
        if end > entries_end {
            report.problems.push(format!(
                "entry at {position} overruns the entry region ending at {entries_end}"
            ));
            break;
        }

        let mut payload = vec![0u8; usize::from(entry.length)];
        store.read_exact_at(position + WalEntryHeader::SIZE as u64, &mut payload)?;
        if !entry.verify(&payload) {
            wal.checksum_failures.push(position);
        }

        wal.entries += 1;
        wal.payload_bytes += u64::from(entry.length);
        wal.max_entry_length = wal.max_entry_length.max(entry.length);
        position = end;
    }

    if !wal.checksum_failures.is_empty() {
        report.problems.push(format!(
            "{} entries fail their checksum",
            wal.checksum_failures.len()
        ));
    }
    if let Some(expected) = wal.footer_entries {
        if expected != wal.entries {
            report.problems.push(format!(
                "footer records {expected} entries, walked {}",
                wal.entries
            ));
        }
    }

    report.wal = Some(wal);
    Ok(())
}

fn inspect_sparse(store: Box<dyn ByteStore>, header: JournalHeader, report: &mut JournalReport) {
    match SparseJournal::open(store, header) {
        Ok(journal) => {
            report.final_length = journal.final_length();
            report.sparse = Some(SparseReport {
                block_size: journal.block_size().size(),
                bitmap_words: journal.bitmap().word_count(),
                dirty_blocks: journal.bitmap().dirty_count(),
            });
        }
        // No footer yet; the layout can only be checked once finalized.
        Err(_) if !report.committed => {}
        Err(e) => report.problems.push(e.to_string()),
    }
}
