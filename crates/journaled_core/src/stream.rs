//! The journaled stream: a transactional overlay over an origin store.
//!
//! ```text
//!            write / set_len / seek past origin end
//!   Clean ───────────────────────────────────────▶ JournalOpen
//!     ▲  ▲                                             │
//!     │  └────────────── rollback ◀────────────────────┤
//!     │                                                │ commit(false)
//!     │            commit(true)                        ▼
//!     └──────────────────────────────────────── JournalFinalized
//!
//!   any state ── close / drop ──▶ Closed
//! ```
//!
//! `JournalFinalized` is read-only until the deferred apply runs. Closing
//! never deletes a journal: an uncommitted one is left for recovery to
//! discard, a committed one for recovery to apply.

use crate::config::Config;
use crate::error::{JournalError, JournalResult};
use crate::journal::{Journal, JournalFactory};
use crate::range::ByteRange;
use crate::recovery::{recover, RecoveryOutcome};
use journaled_storage::{ByteStore, FileJournalProvider, JournalStoreProvider, StorageError};
use std::fmt;
use std::io::{self, SeekFrom};
use std::path::PathBuf;
use tracing::{debug, warn};

const ZERO_CHUNK: usize = 64 * 1024;

/// Largest offset or length the signed on-disk fields can hold.
const MAX_POSITION: u64 = i64::MAX as u64;

/// Lifecycle state of a [`JournaledStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamState {
    /// No journal; reads go straight to the origin.
    Clean,
    /// A journal is staging changes.
    JournalOpen,
    /// The journal is committed but not applied; read-only.
    JournalFinalized,
    /// The stream is closed.
    Closed,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

const READABLE: &[StreamState] = &[
    StreamState::Clean,
    StreamState::JournalOpen,
    StreamState::JournalFinalized,
];
const WRITABLE: &[StreamState] = &[StreamState::Clean, StreamState::JournalOpen];

/// A transactional overlay over an origin store.
///
/// Writes are staged in a journal until [`commit`](Self::commit); the origin
/// only changes when a committed journal is applied. The overlay exposes a
/// virtual cursor and length that may run ahead of the origin while a
/// journal is open.
///
/// # Example
///
/// ```rust
/// use journaled_core::{Config, JournalFactory, JournaledStream};
/// use journaled_storage::{ByteStore, InMemoryStore, MemoryJournalProvider};
///
/// let mut origin = InMemoryStore::with_data(b"Data".to_vec());
/// let observer = origin.clone();
///
/// let mut stream = JournaledStream::open(
///     &mut origin,
///     MemoryJournalProvider::new(),
///     JournalFactory::wal(),
///     Config::default(),
/// )?;
/// stream.seek(std::io::SeekFrom::End(0))?;
/// stream.write(b"End")?;
/// assert_eq!(observer.data(), b"Data");
///
/// stream.commit(true)?;
/// assert_eq!(observer.data(), b"DataEnd");
/// # Ok::<(), journaled_core::JournalError>(())
/// ```
pub struct JournaledStream<'a> {
    origin: &'a mut dyn ByteStore,
    provider: Box<dyn JournalStoreProvider>,
    factory: JournalFactory,
    config: Config,
    journal: Option<Box<dyn Journal>>,
    state: StreamState,
    virtual_offset: u64,
    virtual_length: u64,
    /// Bytes cut off by a shrinking `set_len` that must read as zero if the
    /// length grows again. Always starts at `virtual_length`.
    stale: Option<ByteRange>,
    recovery: RecoveryOutcome,
}

impl fmt::Debug for JournaledStream<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JournaledStream")
            .field("state", &self.state)
            .field("factory", &self.factory)
            .field("virtual_offset", &self.virtual_offset)
            .field("virtual_length", &self.virtual_length)
            .field("stale", &self.stale)
            .field("recovery", &self.recovery)
            .finish_non_exhaustive()
    }
}

impl<'a> JournaledStream<'a> {
    /// Opens an overlay over `origin`.
    ///
    /// A journal left by a previous session is handled first, according to
    /// `config.policy`.
    ///
    /// # Errors
    ///
    /// - corruption if a leftover journal is unreadable and may not be
    ///   discarded, or fails while being applied
    /// - [`JournalError::CommittedNotApplied`] if a committed journal exists
    ///   and may not be applied
    /// - [`JournalError::IncorrectImplementation`] if the leftover journal
    ///   was written by another strategy
    pub fn open(
        origin: &'a mut dyn ByteStore,
        provider: impl JournalStoreProvider + 'static,
        factory: JournalFactory,
        config: Config,
    ) -> JournalResult<Self> {
        let mut provider: Box<dyn JournalStoreProvider> = Box::new(provider);
        let recovery = recover(origin, provider.as_mut(), &factory, &config)?;
        let virtual_length = origin.size()?;

        debug!(
            implementation = %factory.implementation(),
            length = virtual_length,
            ?recovery,
            "opened journaled stream"
        );

        Ok(Self {
            origin,
            provider,
            factory,
            config,
            journal: None,
            state: StreamState::Clean,
            virtual_offset: 0,
            virtual_length,
            stale: None,
            recovery,
        })
    }

    /// Opens an overlay using a WAL journal stored at `journal_path`.
    ///
    /// # Errors
    ///
    /// See [`open`](Self::open).
    pub fn open_wal(
        origin: &'a mut dyn ByteStore,
        journal_path: impl Into<PathBuf>,
        config: Config,
    ) -> JournalResult<Self> {
        Self::open(
            origin,
            FileJournalProvider::new(journal_path),
            JournalFactory::wal(),
            config,
        )
    }

    /// Opens an overlay using a sparse journal with `2^block_power` byte
    /// blocks stored at `journal_path`.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error for an unsupported block power,
    /// otherwise see [`open`](Self::open).
    pub fn open_sparse(
        origin: &'a mut dyn ByteStore,
        journal_path: impl Into<PathBuf>,
        block_power: u8,
        config: Config,
    ) -> JournalResult<Self> {
        Self::open(
            origin,
            FileJournalProvider::new(journal_path),
            JournalFactory::sparse(block_power)?,
            config,
        )
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// What recovery did when the stream was opened.
    #[must_use]
    pub fn recovery_outcome(&self) -> RecoveryOutcome {
        self.recovery
    }

    /// Current cursor.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.virtual_offset
    }

    /// Apparent length, including staged changes.
    #[must_use]
    pub fn length(&self) -> u64 {
        self.virtual_length
    }

    fn require(&self, allowed: &[StreamState]) -> JournalResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(JournalError::invalid_state(self.state, allowed))
        }
    }

    fn require_writable(&self) -> JournalResult<()> {
        match self.state {
            StreamState::JournalFinalized => Err(JournalError::committed_not_applied(
                "the journal is committed; call commit(true) before changing the stream",
            )),
            _ => self.require(WRITABLE),
        }
    }

    fn ensure_journal(&mut self) -> JournalResult<()> {
        if self.journal.is_some() {
            return Ok(());
        }

        let id = self.config.journal_id.as_str();
        let store = self
            .provider
            .try_open(id, true)?
            .ok_or_else(|| StorageError::NotFound { id: id.to_string() })?;
        self.journal = Some(self.factory.create(store)?);
        self.state = StreamState::JournalOpen;

        debug!(journal = id, "journal opened for staging");
        Ok(())
    }

    fn journal_mut(&mut self) -> JournalResult<&mut Box<dyn Journal>> {
        let state = self.state;
        self.journal.as_mut().ok_or_else(|| {
            JournalError::invalid_state(
                state,
                &[StreamState::JournalOpen, StreamState::JournalFinalized],
            )
        })
    }

    fn stage(&mut self, offset: u64, data: &[u8]) -> JournalResult<()> {
        let origin = &mut *self.origin;
        let journal = self.journal.as_mut().ok_or_else(|| {
            JournalError::invalid_state(self.state, &[StreamState::JournalOpen])
        })?;
        journal.write(origin, offset, data)
    }

    /// Zeroes the part of the stale range that `new_length` exposes.
    ///
    /// With `covered` set, the caller is about to overwrite the exposed
    /// bytes itself and nothing is staged.
    fn expose_stale(&mut self, new_length: u64, covered: bool) -> JournalResult<()> {
        let Some(stale) = self.stale else {
            return Ok(());
        };
        if new_length <= stale.start() {
            return Ok(());
        }

        let exposed = stale.clip_end(new_length);
        if !covered {
            let zeros = vec![0u8; ZERO_CHUNK.min(exposed.len() as usize)];
            let mut position = exposed.start();
            while position < exposed.end() {
                let len = (exposed.end() - position).min(zeros.len() as u64) as usize;
                self.stage(position, &zeros[..len])?;
                position += len as u64;
            }
        }

        self.stale = (new_length < stale.end())
            .then(|| ByteRange::from_bounds(new_length, stale.end()));
        Ok(())
    }

    /// Reads at the cursor into `buf`, returning the bytes read.
    ///
    /// Returns 0 at the end of the stream. Bytes past the origin that no
    /// write covered read as zero.
    ///
    /// # Errors
    ///
    /// Returns an invalid state error when closed, or a storage error.
    pub fn read(&mut self, buf: &mut [u8]) -> JournalResult<usize> {
        self.require(READABLE)?;

        let available = self.virtual_length.saturating_sub(self.virtual_offset);
        let wanted = (buf.len() as u64).min(available) as usize;
        if wanted == 0 {
            return Ok(0);
        }

        let offset = self.virtual_offset;
        let buf = &mut buf[..wanted];
        let read = match self.journal.as_mut() {
            None => self.origin.read_at(offset, buf)?,
            Some(journal) => {
                // Staged length may run past every write; the gap reads as zero.
                journal.read(&mut *self.origin, offset, buf)?;
                wanted
            }
        };

        self.virtual_offset += read as u64;
        Ok(read)
    }

    /// Stages `data` at the cursor and advances it.
    ///
    /// # Errors
    ///
    /// - [`JournalError::CommittedNotApplied`] while finalized
    /// - invalid state when closed
    pub fn write(&mut self, data: &[u8]) -> JournalResult<()> {
        self.require_writable()?;
        if data.is_empty() {
            return Ok(());
        }

        let offset = self.virtual_offset;
        let end = offset
            .checked_add(data.len() as u64)
            .filter(|end| *end <= MAX_POSITION)
            .ok_or_else(|| {
                JournalError::invalid_argument(format!(
                    "write of {} bytes at {offset} ends past {MAX_POSITION}",
                    data.len()
                ))
            })?;

        self.ensure_journal()?;
        if end > self.virtual_length {
            self.expose_stale(end, true)?;
        }
        self.stage(offset, data)?;

        self.virtual_offset = end;
        self.virtual_length = self.virtual_length.max(end);
        Ok(())
    }

    /// Sets the apparent length, clamping the cursor.
    ///
    /// Bytes cut off and later re-exposed by a growing length read as zero.
    ///
    /// # Errors
    ///
    /// - [`JournalError::CommittedNotApplied`] while finalized
    /// - invalid state when closed
    pub fn set_len(&mut self, length: u64) -> JournalResult<()> {
        self.require_writable()?;
        if length == self.virtual_length {
            return Ok(());
        }
        if length > MAX_POSITION {
            return Err(JournalError::invalid_argument(format!(
                "length {length} exceeds {MAX_POSITION}"
            )));
        }

        self.ensure_journal()?;
        if length < self.virtual_length {
            let stale_end = self
                .stale
                .map_or(self.virtual_length, |s| s.end().max(self.virtual_length));
            self.stale = Some(ByteRange::from_bounds(length, stale_end));
        } else {
            self.expose_stale(length, false)?;
        }

        self.virtual_length = length;
        self.virtual_offset = self.virtual_offset.min(length);
        Ok(())
    }

    /// Moves the cursor, returning the new position.
    ///
    /// Seeking past the end extends the stream.
    ///
    /// # Errors
    ///
    /// - invalid argument for a negative or overflowing target
    /// - [`JournalError::CommittedNotApplied`] when seeking past the end
    ///   while finalized
    pub fn seek(&mut self, pos: SeekFrom) -> JournalResult<u64> {
        self.require(READABLE)?;

        let target = match pos {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::Current(delta) => i128::from(self.virtual_offset) + i128::from(delta),
            SeekFrom::End(delta) => i128::from(self.virtual_length) + i128::from(delta),
        };
        let target = u64::try_from(target)
            .ok()
            .filter(|target| *target <= MAX_POSITION)
            .ok_or_else(|| {
                JournalError::invalid_argument(format!(
                    "seek to {pos:?} places the cursor at {target}, outside the stream"
                ))
            })?;

        if target > self.virtual_length && self.state == StreamState::JournalFinalized {
            return Err(JournalError::committed_not_applied(
                "cannot seek past the end while the journal is committed but not applied",
            ));
        }

        if target > self.origin.size()? {
            self.ensure_journal()?;
        }
        if target > self.virtual_length {
            self.expose_stale(target, false)?;
            self.virtual_length = target;
        }

        self.virtual_offset = target;
        Ok(target)
    }

    /// Sets the cursor; equivalent to seeking from the start.
    ///
    /// # Errors
    ///
    /// See [`seek`](Self::seek).
    pub fn set_position(&mut self, position: u64) -> JournalResult<()> {
        self.seek(SeekFrom::Start(position)).map(|_| ())
    }

    /// Flushes the journal and the origin.
    ///
    /// # Errors
    ///
    /// Returns an invalid state error when closed, or a storage error.
    pub fn flush(&mut self) -> JournalResult<()> {
        self.require(READABLE)?;
        if let Some(journal) = self.journal.as_mut() {
            journal.flush()?;
        }
        self.origin.flush()?;
        Ok(())
    }

    /// Commits staged changes.
    ///
    /// The journal is finalized and marked committed, after which a crash
    /// no longer loses the changes. With `apply_immediately` the journal is
    /// then replayed into the origin and deleted; without it the stream
    /// stays read-only until `commit(true)` is called.
    ///
    /// A clean stream commits nothing.
    ///
    /// # Errors
    ///
    /// Returns a corruption error if apply fails; the journal is kept.
    pub fn commit(&mut self, apply_immediately: bool) -> JournalResult<()> {
        match self.state {
            StreamState::Clean => return Ok(()),
            StreamState::Closed => return Err(JournalError::invalid_state(self.state, READABLE)),
            StreamState::JournalOpen | StreamState::JournalFinalized => {}
        }

        let sync = self.config.sync_on_commit;
        let final_length = self.virtual_length;

        if self.state == StreamState::JournalOpen {
            let journal = self.journal_mut()?;
            journal.finalize(final_length, sync)?;
            journal.mark_committed(sync)?;
            self.state = StreamState::JournalFinalized;
            debug!(final_length, "journal committed");
        }

        if !apply_immediately {
            return Ok(());
        }

        let origin = &mut *self.origin;
        let journal = self.journal.as_mut().ok_or_else(|| {
            JournalError::invalid_state(self.state, &[StreamState::JournalFinalized])
        })?;
        journal.apply(origin, sync)?;

        self.journal = None;
        self.state = StreamState::Clean;
        self.stale = None;
        self.virtual_length = self.origin.size()?;
        self.virtual_offset = self.virtual_offset.min(self.virtual_length);

        self.provider.delete(&self.config.journal_id)?;
        debug!(length = self.virtual_length, "journal applied");
        Ok(())
    }

    /// Discards staged changes and deletes the journal.
    ///
    /// # Errors
    ///
    /// Returns an invalid state error while finalized (a committed journal
    /// can only be completed) or when closed.
    pub fn rollback(&mut self) -> JournalResult<()> {
        match self.state {
            StreamState::Clean => return Ok(()),
            StreamState::JournalOpen => {}
            StreamState::JournalFinalized | StreamState::Closed => {
                return Err(JournalError::invalid_state(
                    self.state,
                    &[StreamState::Clean, StreamState::JournalOpen],
                ))
            }
        }

        self.journal = None;
        self.provider.delete(&self.config.journal_id)?;

        self.state = StreamState::Clean;
        self.stale = None;
        self.virtual_length = self.origin.size()?;
        self.virtual_offset = self.virtual_offset.min(self.virtual_length);

        debug!(length = self.virtual_length, "journal rolled back");
        Ok(())
    }

    /// Closes the stream, leaving any journal in storage.
    ///
    /// An open journal is flushed but neither committed nor deleted; a
    /// committed one stays valid for the next open.
    ///
    /// # Errors
    ///
    /// Returns a storage error if flushing fails. The stream is closed
    /// either way.
    pub fn close(&mut self) -> JournalResult<()> {
        if self.state == StreamState::Closed {
            return Ok(());
        }

        let journal_flush = match self.journal.as_mut() {
            Some(journal) => journal.flush(),
            None => Ok(()),
        };
        let origin_flush = self.origin.flush();

        if self.journal.take().is_some() {
            debug!(state = %self.state, "closed with a journal left in storage");
        }
        self.state = StreamState::Closed;

        journal_flush?;
        origin_flush?;
        Ok(())
    }
}

impl Drop for JournaledStream<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "failed to flush journaled stream on drop");
        }
    }
}

impl io::Read for JournaledStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(JournaledStream::read(self, buf)?)
    }
}

impl io::Write for JournaledStream<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        JournaledStream::write(self, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(JournaledStream::flush(self)?)
    }
}

impl io::Seek for JournaledStream<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Ok(JournaledStream::seek(self, pos)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OpenPolicy;
    use journaled_storage::{InMemoryStore, MemoryJournalProvider};
    use std::io::{Read, Seek, Write};

    struct Env {
        origin: InMemoryStore,
        provider: MemoryJournalProvider,
    }

    impl Env {
        fn new(content: &[u8]) -> Self {
            Self {
                origin: InMemoryStore::with_data(content.to_vec()),
                provider: MemoryJournalProvider::new(),
            }
        }

        fn open(&mut self, factory: JournalFactory) -> JournaledStream<'_> {
            JournaledStream::open(
                &mut self.origin,
                self.provider.clone(),
                factory,
                Config::default(),
            )
            .unwrap()
        }
    }

    fn factories() -> Vec<fn() -> JournalFactory> {
        let wal: fn() -> JournalFactory = JournalFactory::wal;
        let sparse: fn() -> JournalFactory = || JournalFactory::sparse(5).unwrap();
        vec![wal, sparse]
    }

    fn read_all(stream: &mut JournaledStream<'_>) -> Vec<u8> {
        stream.set_position(0).unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn clean_reads_pass_through() {
        for factory in factories() {
            let mut env = Env::new(b"hello");
            let provider = env.provider.clone();
            let mut stream = env.open(factory());

            assert_eq!(read_all(&mut stream), b"hello");
            assert_eq!(stream.state(), StreamState::Clean);
            assert!(!provider.has_any_journal());
        }
    }

    #[test]
    fn write_stages_until_commit() {
        for factory in factories() {
            let mut env = Env::new(b"");
            let observer = env.origin.clone();
            let provider = env.provider.clone();
            let mut stream = env.open(factory());

            stream.write(b"Begin").unwrap();
            stream.write(b"Mid").unwrap();
            stream.write(b"End").unwrap();
            assert_eq!(stream.state(), StreamState::JournalOpen);
            assert_eq!(stream.length(), 11);
            assert!(observer.data().is_empty());
            assert!(provider.has_any_journal());

            stream.commit(true).unwrap();
            assert_eq!(observer.data(), b"BeginMidEnd");
            assert_eq!(stream.state(), StreamState::Clean);
            assert!(!provider.has_any_journal());
        }
    }

    #[test]
    fn seek_past_end_zero_fills_gap() {
        for factory in factories() {
            let mut env = Env::new(b"Data");
            let observer = env.origin.clone();
            let mut stream = env.open(factory());

            stream.seek(SeekFrom::End(0)).unwrap();
            stream.write(b"End").unwrap();
            stream.commit(true).unwrap();
            assert_eq!(observer.data(), b"DataEnd");

            stream.seek(SeekFrom::Start(10)).unwrap();
            assert_eq!(stream.state(), StreamState::JournalOpen);
            stream.write(b"Beyond").unwrap();
            assert_eq!(read_all(&mut stream), b"DataEnd\0\0\0Beyond");
            stream.commit(true).unwrap();
            assert_eq!(observer.data(), b"DataEnd\0\0\0Beyond");
        }
    }

    #[test]
    fn truncate_then_append() {
        for factory in factories() {
            let mut env = Env::new(b"9876543210");
            let observer = env.origin.clone();
            let mut stream = env.open(factory());

            stream.set_len(5).unwrap();
            stream.seek(SeekFrom::End(0)).unwrap();
            stream.write(b"88774466").unwrap();
            assert_eq!(read_all(&mut stream), b"9876588774466");

            stream.commit(true).unwrap();
            assert_eq!(observer.data(), b"9876588774466");
        }
    }

    #[test]
    fn truncate_then_extend_reads_zeros() {
        for factory in factories() {
            let mut env = Env::new(b"9876543210");
            let observer = env.origin.clone();
            let mut stream = env.open(factory());

            stream.write(b"abcdefghij").unwrap();
            stream.set_len(3).unwrap();
            assert_eq!(stream.position(), 3);
            stream.set_len(6).unwrap();
            assert_eq!(read_all(&mut stream), b"abc\0\0\0");

            stream.seek(SeekFrom::Start(8)).unwrap();
            assert_eq!(read_all(&mut stream), b"abc\0\0\0\0\0");

            stream.commit(true).unwrap();
            assert_eq!(observer.data(), b"abc\0\0\0\0\0");
        }
    }

    #[test]
    fn rollback_restores_origin_view() {
        for factory in factories() {
            let mut env = Env::new(b"Original");
            let observer = env.origin.clone();
            let provider = env.provider.clone();
            let mut stream = env.open(factory());

            stream.seek(SeekFrom::End(0)).unwrap();
            stream.write(b" and more").unwrap();
            assert_eq!(stream.position(), 17);

            stream.rollback().unwrap();
            assert_eq!(stream.state(), StreamState::Clean);
            assert_eq!(stream.length(), 8);
            assert_eq!(stream.position(), 8);
            assert_eq!(read_all(&mut stream), b"Original");
            assert_eq!(observer.data(), b"Original");
            assert!(!provider.has_any_journal());
        }
    }

    #[test]
    fn deferred_commit_is_read_only() {
        for factory in factories() {
            let mut env = Env::new(b"Initial");
            let observer = env.origin.clone();
            let mut stream = env.open(factory());

            stream.write(b"HeldBack").unwrap();
            stream.commit(false).unwrap();
            assert_eq!(stream.state(), StreamState::JournalFinalized);
            assert_eq!(observer.data(), b"Initial");
            assert_eq!(read_all(&mut stream), b"HeldBack");

            let err = stream.write(b"x").unwrap_err();
            assert!(matches!(err, JournalError::CommittedNotApplied { .. }));
            let err = stream.set_len(2).unwrap_err();
            assert!(matches!(err, JournalError::CommittedNotApplied { .. }));
            let err = stream.seek(SeekFrom::Start(50)).unwrap_err();
            assert!(matches!(err, JournalError::CommittedNotApplied { .. }));
            let err = stream.rollback().unwrap_err();
            assert!(matches!(err, JournalError::InvalidState { .. }));

            stream.commit(true).unwrap();
            assert_eq!(observer.data(), b"HeldBack");

            stream.write(b"x").unwrap();
            assert_eq!(stream.state(), StreamState::JournalOpen);
        }
    }

    #[test]
    fn commit_is_idempotent() {
        for factory in factories() {
            let mut env = Env::new(b"abc");
            let observer = env.origin.clone();
            let mut stream = env.open(factory());

            stream.commit(true).unwrap();
            stream.write(b"X").unwrap();
            stream.commit(true).unwrap();
            stream.commit(true).unwrap();
            stream.rollback().unwrap();
            assert_eq!(observer.data(), b"Xbc");
        }
    }

    #[test]
    fn close_abandons_journal() {
        for factory in factories() {
            let mut env = Env::new(b"keep");
            let provider = env.provider.clone();
            {
                let mut stream = env.open(factory());
                stream.write(b"lost").unwrap();
                stream.close().unwrap();
                assert_eq!(stream.state(), StreamState::Closed);

                let err = stream.read(&mut [0u8; 4]).unwrap_err();
                assert!(matches!(err, JournalError::InvalidState { .. }));
                assert!(stream.write(b"x").is_err());
                assert!(stream.commit(true).is_err());
                assert!(stream.rollback().is_err());
                stream.close().unwrap();
            }
            assert!(provider.has_any_journal());
            assert_eq!(env.origin.data(), b"keep");
        }
    }

    #[test]
    fn committed_journal_applies_on_reopen() {
        for factory in factories() {
            let mut env = Env::new(b"Initial");
            {
                let mut stream = env.open(factory());
                stream.write(b"HeldBack").unwrap();
                stream.commit(false).unwrap();
            }
            assert_eq!(env.origin.data(), b"Initial");

            let provider = env.provider.clone();
            let stream = env.open(factory());
            assert_eq!(stream.recovery_outcome(), RecoveryOutcome::Applied);
            assert_eq!(stream.length(), 8);
            drop(stream);

            assert_eq!(env.origin.data(), b"HeldBack");
            assert!(!provider.has_any_journal());
        }
    }

    #[test]
    fn uncommitted_journal_blocks_default_open() {
        let mut env = Env::new(b"Original");
        {
            let mut stream = env.open(JournalFactory::wal());
            stream.write(b"Partial").unwrap();
        }

        let err = JournaledStream::open(
            &mut env.origin,
            env.provider.clone(),
            JournalFactory::wal(),
            Config::default(),
        )
        .unwrap_err();
        assert!(err.is_corruption());
        assert!(env.provider.has_any_journal());

        let stream = JournaledStream::open(
            &mut env.origin,
            env.provider.clone(),
            JournalFactory::wal(),
            Config::default().policy(OpenPolicy::AUTOMATIC),
        )
        .unwrap();
        assert_eq!(stream.recovery_outcome(), RecoveryOutcome::Discarded);
        drop(stream);
        assert_eq!(env.origin.data(), b"Original");
    }

    #[test]
    fn negative_seek_is_rejected() {
        let mut env = Env::new(b"abc");
        let mut stream = env.open(JournalFactory::wal());

        let err = stream.seek(SeekFrom::Current(-1)).unwrap_err();
        assert!(matches!(err, JournalError::InvalidArgument { .. }));
        assert_eq!(stream.seek(SeekFrom::End(-1)).unwrap(), 2);
        assert_eq!(stream.state(), StreamState::Clean);
    }

    #[test]
    fn positions_beyond_signed_range_are_rejected() {
        let beyond = MAX_POSITION + 6;
        for factory in factories() {
            let mut env = Env::new(b"abc");
            {
                let mut stream = env.open(factory());

                let err = stream.seek(SeekFrom::Start(beyond)).unwrap_err();
                assert!(matches!(err, JournalError::InvalidArgument { .. }));
                let err = stream.set_len(beyond).unwrap_err();
                assert!(matches!(err, JournalError::InvalidArgument { .. }));
                assert_eq!(stream.state(), StreamState::Clean);
                assert_eq!(stream.length(), 3);
                assert_eq!(stream.position(), 0);
            }
            assert!(!env.provider.has_any_journal());
        }
    }

    #[test]
    fn write_ending_past_signed_range_is_rejected() {
        let mut env = Env::new(b"abc");
        {
            let mut stream = env.open(JournalFactory::wal());
            stream.seek(SeekFrom::Start(MAX_POSITION - 1)).unwrap();
            assert_eq!(stream.state(), StreamState::JournalOpen);

            let err = stream.write(b"XY").unwrap_err();
            assert!(matches!(err, JournalError::InvalidArgument { .. }));
            assert_eq!(stream.length(), MAX_POSITION - 1);

            stream.write(b"X").unwrap();
            assert_eq!(stream.length(), MAX_POSITION);
            stream.rollback().unwrap();
        }
        assert_eq!(env.origin.data(), b"abc");
        assert!(!env.provider.has_any_journal());
    }

    #[test]
    fn seek_within_origin_stays_clean() {
        let mut env = Env::new(b"abcdef");
        let mut stream = env.open(JournalFactory::wal());

        stream.seek(SeekFrom::Start(6)).unwrap();
        assert_eq!(stream.state(), StreamState::Clean);
        stream.seek(SeekFrom::Start(7)).unwrap();
        assert_eq!(stream.state(), StreamState::JournalOpen);
        assert_eq!(stream.length(), 7);
    }

    #[test]
    fn io_traits() {
        let mut env = Env::new(b"0123456789");
        let observer = env.origin.clone();
        let mut stream = env.open(JournalFactory::sparse(5).unwrap());

        Seek::seek(&mut stream, SeekFrom::Start(2)).unwrap();
        Write::write_all(&mut stream, b"ab").unwrap();
        Write::flush(&mut stream).unwrap();

        let mut buf = [0u8; 4];
        Read::read_exact(&mut stream, &mut buf).unwrap();
        assert_eq!(&buf, b"4567");

        let err = Seek::seek(&mut stream, SeekFrom::Current(-100)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        stream.commit(true).unwrap();
        assert_eq!(observer.data(), b"01ab456789");
    }

    #[test]
    fn empty_write_keeps_stream_clean() {
        let mut env = Env::new(b"abc");
        let provider = env.provider.clone();
        let mut stream = env.open(JournalFactory::wal());

        stream.write(b"").unwrap();
        stream.set_len(3).unwrap();
        assert_eq!(stream.state(), StreamState::Clean);
        assert!(!provider.has_any_journal());
    }

    #[test]
    fn read_through_unwritten_extension_is_complete() {
        for factory in factories() {
            let mut env = Env::new(b"abc");
            let mut stream = env.open(factory());
            stream.seek(SeekFrom::Start(10)).unwrap();
            stream.write(b"Z").unwrap();
            stream.set_len(20).unwrap();

            stream.set_position(0).unwrap();
            let mut buf = [0xFFu8; 32];
            assert_eq!(stream.read(&mut buf).unwrap(), 20);
            assert_eq!(&buf[..11], b"abc\0\0\0\0\0\0\0Z");
            assert_eq!(&buf[11..20], &[0u8; 9]);
            assert_eq!(stream.read(&mut buf).unwrap(), 0);
        }
    }

    #[test]
    fn file_backed_wal_commit() {
        let dir = tempfile::tempdir().unwrap();
        let origin_path = dir.path().join("data.bin");
        let journal_path = dir.path().join("data.bin.jrnl");
        std::fs::write(&origin_path, b"Data").unwrap();

        let mut origin = journaled_storage::FileStore::open(&origin_path).unwrap();
        {
            let mut stream =
                JournaledStream::open_wal(&mut origin, &journal_path, Config::default()).unwrap();
            stream.seek(SeekFrom::End(0)).unwrap();
            stream.write(b"End").unwrap();
            assert!(journal_path.is_file());
            stream.commit(true).unwrap();
        }
        drop(origin);

        assert_eq!(std::fs::read(&origin_path).unwrap(), b"DataEnd");
        assert!(!journal_path.exists());
    }
}
