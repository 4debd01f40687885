//! Test fixtures and stream helpers.
//!
//! Provides environments that own an origin and a journal provider, so a
//! test can open, drop and reopen streams while observing both stores.

use journaled_core::{Config, JournalFactory, JournalResult, JournalStrategy, JournaledStream};
use journaled_storage::{FileStore, InMemoryStore, MemoryJournalProvider};
use std::io::{Read, SeekFrom};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A named journal factory constructor.
pub type FactoryCase = (&'static str, fn() -> JournalFactory);

/// Factories covering both strategies, including the smallest sparse block.
pub fn all_factories() -> Vec<FactoryCase> {
    vec![
        ("wal", JournalFactory::wal as fn() -> JournalFactory),
        ("sparse-32", || {
            JournalFactory::sparse(5).expect("minimum sparse power")
        }),
        ("sparse-4096", || {
            JournalFactory::new(JournalStrategy::sparse_default())
        }),
    ]
}

/// An in-memory origin and journal provider.
///
/// Clones of the stores are shared, so the environment sees everything a
/// stream does.
#[derive(Debug, Clone, Default)]
pub struct MemoryEnv {
    /// The origin store.
    pub origin: InMemoryStore,
    /// The journal provider.
    pub provider: MemoryJournalProvider,
}

impl MemoryEnv {
    /// Creates an environment whose origin holds `content`.
    pub fn new(content: &[u8]) -> Self {
        Self {
            origin: InMemoryStore::with_data(content.to_vec()),
            provider: MemoryJournalProvider::new(),
        }
    }

    /// Opens a stream with the default configuration.
    ///
    /// # Panics
    ///
    /// Panics if the open fails.
    pub fn open(&mut self, factory: JournalFactory) -> JournaledStream<'_> {
        self.try_open(factory, Config::default())
            .expect("Failed to open journaled stream")
    }

    /// Opens a stream, returning any recovery error.
    pub fn try_open(
        &mut self,
        factory: JournalFactory,
        config: Config,
    ) -> JournalResult<JournaledStream<'_>> {
        JournaledStream::open(&mut self.origin, self.provider.clone(), factory, config)
    }

    /// Returns the origin content.
    pub fn origin_data(&self) -> Vec<u8> {
        self.origin.data()
    }

    /// Returns true if the primary journal exists.
    pub fn has_journal(&self) -> bool {
        self.provider.has_any_journal()
    }

    /// Returns a shared handle to the primary journal store.
    pub fn journal(&self) -> Option<InMemoryStore> {
        self.provider.store("")
    }
}

/// A temporary directory holding an origin file and a journal path.
pub struct FileEnv {
    dir: TempDir,
    origin_path: PathBuf,
    journal_path: PathBuf,
}

impl FileEnv {
    /// Creates an environment whose origin file holds `content`.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory or origin file cannot be created.
    pub fn new(content: &[u8]) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let origin_path = dir.path().join("data.bin");
        let journal_path = dir.path().join("data.bin.jrnl");
        std::fs::write(&origin_path, content).expect("Failed to write origin file");
        Self {
            dir,
            origin_path,
            journal_path,
        }
    }

    /// The temporary directory.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Path of the origin file.
    pub fn origin_path(&self) -> &Path {
        &self.origin_path
    }

    /// Path of the primary journal file.
    pub fn journal_path(&self) -> &Path {
        &self.journal_path
    }

    /// Opens the origin file.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be opened.
    pub fn origin_store(&self) -> FileStore {
        FileStore::open(&self.origin_path).expect("Failed to open origin file")
    }

    /// Reads the origin file.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be read.
    pub fn origin_data(&self) -> Vec<u8> {
        std::fs::read(&self.origin_path).expect("Failed to read origin file")
    }

    /// Returns true if the journal file exists.
    pub fn journal_exists(&self) -> bool {
        self.journal_path.is_file()
    }
}

/// Reads a stream's whole content from the start, leaving the cursor at the
/// end.
///
/// # Panics
///
/// Panics if reading fails.
pub fn read_all(stream: &mut JournaledStream<'_>) -> Vec<u8> {
    stream
        .seek(SeekFrom::Start(0))
        .expect("Failed to seek to start");
    let mut out = Vec::new();
    stream.read_to_end(&mut out).expect("Failed to read stream");
    out
}

/// Builds `len` bytes of a repeating, position-dependent pattern.
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

/// Helpers that damage a journal store in place.
pub mod corruption {
    use journaled_core::format::{Frame, JournalHeader};
    use journaled_storage::InMemoryStore;

    /// Flips every bit of the byte at `offset`.
    pub fn flip_byte(store: &InMemoryStore, offset: usize) {
        store.modify(|data| data[offset] ^= 0xFF);
    }

    /// Removes the last `count` bytes.
    pub fn truncate_tail(store: &InMemoryStore, count: usize) {
        store.modify(|data| {
            let len = data.len().saturating_sub(count);
            data.truncate(len);
        });
    }

    /// Clears the committed flag in the header.
    pub fn clear_committed(store: &InMemoryStore) {
        store.modify(|data| data[JournalHeader::FLAGS_OFFSET as usize] = 0);
    }

    /// Overwrites the implementation id in the header.
    pub fn set_implementation_id(store: &InMemoryStore, id: u8) {
        store.modify(|data| data[8] = id);
    }

    /// Range of bytes strictly between the header and a footer of
    /// `footer_size` bytes.
    pub fn body_range(store: &InMemoryStore, footer_size: usize) -> std::ops::Range<usize> {
        let len = store.data().len();
        JournalHeader::SIZE..len.saturating_sub(footer_size)
    }
}
