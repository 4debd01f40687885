//! Journal strategies.
//!
//! A journal stages writes against an origin store without touching it,
//! then replays them on apply. Two strategies exist:
//!
//! - [`WalJournal`]: every write is appended as a checksummed entry; an
//!   in-memory segment map overlays the newest content on reads. Cheap for
//!   small scattered edits, apply cost follows the bytes written.
//! - [`SparseJournal`]: writes are widened to whole blocks and stored at a
//!   fixed position per block; a dirty bitmap records which blocks live in
//!   the journal. Apply cost follows the number of dirty blocks.
//!
//! Both share the [`JournalHeader`](crate::format::JournalHeader) and differ
//! in their footer. The header's implementation id stops a journal written by
//! one strategy from being opened with the other.

mod sparse;
mod wal;

pub use sparse::{SparseJournal, DEFAULT_SPARSE_BLOCK_POWER, MIN_SPARSE_BLOCK_POWER};
pub use wal::{WalJournal, MAX_ENTRY_LENGTH};

use crate::block::BlockSize;
use crate::error::{JournalError, JournalResult};
use crate::format::{read_frame, write_frame, HeaderFlags, JournalHeader};
use crate::nonce::{NonceSource, RandomNonceSource};
use journaled_storage::ByteStore;
use std::fmt;
use tracing::debug;

/// Identifies the strategy that wrote a journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Implementation {
    /// Write-ahead append log.
    Wal,
    /// Block-bitmap sparse journal.
    Sparse,
    /// An id no known strategy uses.
    Unknown(u8),
}

impl Implementation {
    /// Maps a header implementation id.
    #[must_use]
    pub const fn from_id(id: u8) -> Self {
        match id {
            1 => Self::Wal,
            2 => Self::Sparse,
            other => Self::Unknown(other),
        }
    }

    /// Returns the header implementation id.
    #[must_use]
    pub const fn id(self) -> u8 {
        match self {
            Self::Wal => 1,
            Self::Sparse => 2,
            Self::Unknown(id) => id,
        }
    }
}

impl fmt::Display for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wal => f.write_str("WalJournal"),
            Self::Sparse => f.write_str("SparseJournal"),
            Self::Unknown(id) => write!(f, "id {id}"),
        }
    }
}

/// Capability shared by all journal strategies.
///
/// The origin is passed into every call that needs it; a journal only owns
/// its own backing store.
pub trait Journal: Send + fmt::Debug {
    /// Strategy of this journal.
    fn implementation(&self) -> Implementation;

    /// Header as written at creation or read at open.
    fn header(&self) -> &JournalHeader;

    /// The journal's backing store.
    fn store_mut(&mut self) -> &mut dyn ByteStore;

    /// Reads `buf.len()` bytes at `offset` as seen through the journal.
    ///
    /// `buf` receives origin content patched with staged content. Bytes
    /// neither the origin nor the journal cover are zero, so the whole
    /// buffer is always filled.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the origin or the journal cannot be read.
    fn read(
        &mut self,
        origin: &mut dyn ByteStore,
        offset: u64,
        buf: &mut [u8],
    ) -> JournalResult<()>;

    /// Stages `data` for `offset`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the journal cannot be written.
    fn write(&mut self, origin: &mut dyn ByteStore, offset: u64, data: &[u8])
        -> JournalResult<()>;

    /// Writes the footer recording `final_length` and makes it durable.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the footer cannot be written.
    fn finalize(&mut self, final_length: u64, sync: bool) -> JournalResult<()>;

    /// Replays the finalized journal into `origin`.
    ///
    /// # Errors
    ///
    /// Returns a corruption error if the journal is inconsistent; its
    /// `origin_altered` flag reports whether `origin` was already modified.
    fn apply(&mut self, origin: &mut dyn ByteStore, sync: bool) -> JournalResult<()>;

    /// Flushes the journal store.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the flush fails.
    fn flush(&mut self) -> JournalResult<()> {
        self.store_mut().flush()?;
        Ok(())
    }

    /// Sets the committed flag in the stored header.
    ///
    /// Only the flags byte is rewritten.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the header cannot be patched.
    fn mark_committed(&mut self, sync: bool) -> JournalResult<()> {
        let flags = self.header().flags.with(HeaderFlags::COMMITTED);
        let store = self.store_mut();
        store.write_at(JournalHeader::FLAGS_OFFSET, &[flags.bits()])?;
        persist(store, sync)
    }
}

/// Flushes or syncs `store`.
pub(crate) fn persist(store: &mut dyn ByteStore, sync: bool) -> JournalResult<()> {
    if sync {
        store.sync()?;
    } else {
        store.flush()?;
    }
    Ok(())
}

/// Which strategy new journals use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JournalStrategy {
    /// Write-ahead append log.
    #[default]
    Wal,
    /// Block-bitmap sparse journal.
    Sparse {
        /// Size of one tracked block.
        block_size: BlockSize,
    },
}

impl JournalStrategy {
    /// Sparse strategy with `2^power` byte blocks.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error unless
    /// `MIN_SPARSE_BLOCK_POWER <= power <= 31`.
    pub fn sparse(power: u8) -> JournalResult<Self> {
        if power < MIN_SPARSE_BLOCK_POWER {
            return Err(JournalError::invalid_argument(format!(
                "sparse block power {power} is below the minimum of {MIN_SPARSE_BLOCK_POWER}"
            )));
        }
        Ok(Self::Sparse {
            block_size: BlockSize::from_power(power)?,
        })
    }

    /// Sparse strategy with the default 4 KiB blocks.
    #[must_use]
    pub fn sparse_default() -> Self {
        Self::Sparse {
            block_size: BlockSize::DEFAULT,
        }
    }

    /// Implementation this strategy writes.
    #[must_use]
    pub const fn implementation(&self) -> Implementation {
        match self {
            Self::Wal => Implementation::Wal,
            Self::Sparse { .. } => Implementation::Sparse,
        }
    }
}

/// Creates fresh journals and reopens committed ones for one strategy.
pub struct JournalFactory {
    strategy: JournalStrategy,
    nonces: Box<dyn NonceSource>,
}

impl fmt::Debug for JournalFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JournalFactory")
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

impl JournalFactory {
    /// Creates a factory drawing random nonces.
    #[must_use]
    pub fn new(strategy: JournalStrategy) -> Self {
        Self {
            strategy,
            nonces: Box::new(RandomNonceSource),
        }
    }

    /// Factory for WAL journals.
    #[must_use]
    pub fn wal() -> Self {
        Self::new(JournalStrategy::Wal)
    }

    /// Factory for sparse journals with `2^power` byte blocks.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error for an unsupported power.
    pub fn sparse(power: u8) -> JournalResult<Self> {
        Ok(Self::new(JournalStrategy::sparse(power)?))
    }

    /// Replaces the nonce source.
    #[must_use]
    pub fn with_nonce_source(mut self, source: impl NonceSource + 'static) -> Self {
        self.nonces = Box::new(source);
        self
    }

    /// Strategy used for new journals.
    #[must_use]
    pub const fn strategy(&self) -> JournalStrategy {
        self.strategy
    }

    /// Implementation this factory creates and accepts.
    #[must_use]
    pub const fn implementation(&self) -> Implementation {
        self.strategy.implementation()
    }

    /// Starts a new journal in `store`.
    ///
    /// Any previous content of the store is discarded.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the header cannot be written.
    pub fn create(&mut self, mut store: Box<dyn ByteStore>) -> JournalResult<Box<dyn Journal>> {
        let existing = store.size()?;
        if existing > 0 {
            debug!(bytes = existing, "truncating stale journal store");
            store.set_size(0)?;
        }

        let implementation = self.implementation();
        let header = JournalHeader::new(implementation.id(), self.nonces.next_nonce());
        write_frame(store.as_mut(), 0, &header)?;
        store.flush()?;

        debug!(%implementation, nonce = header.nonce, "created journal");

        Ok(match self.strategy {
            JournalStrategy::Wal => Box::new(WalJournal::create(store, header)),
            JournalStrategy::Sparse { block_size } => {
                Box::new(SparseJournal::create(store, header, block_size)?)
            }
        })
    }

    /// Reopens a committed journal for apply.
    ///
    /// # Errors
    ///
    /// - corruption if the header is invalid, not committed, or the footer
    ///   does not match it
    /// - [`JournalError::IncorrectImplementation`] if another strategy wrote
    ///   the journal
    pub fn open(&self, mut store: Box<dyn ByteStore>) -> JournalResult<Box<dyn Journal>> {
        let header: JournalHeader = read_frame(store.as_mut(), 0)?;

        if !header.is_committed() {
            return Err(JournalError::corrupted(
                "journal was never committed",
                false,
            ));
        }

        let found = Implementation::from_id(header.implementation_id);
        let requested = self.implementation();
        if found != requested {
            return Err(JournalError::IncorrectImplementation {
                journal: found,
                requested,
            });
        }

        debug!(implementation = %found, nonce = header.nonce, "opened committed journal");

        Ok(match self.strategy {
            JournalStrategy::Wal => Box::new(WalJournal::open(store, header)?),
            JournalStrategy::Sparse { .. } => Box::new(SparseJournal::open(store, header)?),
        })
    }
}
