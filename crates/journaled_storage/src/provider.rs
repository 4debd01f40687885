//! Journal storage providers.
//!
//! A provider maps a journal identifier to a byte store that can be created,
//! reopened and deleted. The empty identifier names the primary journal of a
//! stream.

use crate::error::StorageResult;
use crate::file::FileStore;
use crate::memory::InMemoryStore;
use crate::store::ByteStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Creates, opens and deletes named journal stores.
///
/// # Invariants
///
/// - `try_open(id, false)` never creates a store
/// - `try_open(id, true)` returns the existing store if there is one
/// - `delete` of a missing store succeeds
pub trait JournalStoreProvider: Send {
    /// Returns true if a store with this identifier exists.
    ///
    /// # Errors
    ///
    /// Returns an error if existence cannot be determined.
    fn exists(&self, id: &str) -> StorageResult<bool>;

    /// Deletes the store with this identifier, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store exists but cannot be removed.
    fn delete(&mut self, id: &str) -> StorageResult<()>;

    /// Opens the store with this identifier.
    ///
    /// Returns `None` if the store does not exist and `create_if_missing`
    /// is false.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or created.
    fn try_open(
        &mut self,
        id: &str,
        create_if_missing: bool,
    ) -> StorageResult<Option<Box<dyn ByteStore>>>;
}

/// A provider storing journals as files next to a base path.
///
/// The primary journal (empty identifier) lives at the base path itself;
/// any other identifier is appended to the base path's file name.
///
/// Journal files written at scattered offsets keep their unwritten ranges as
/// holes on filesystems that support sparse files, so a block-sparse journal
/// only occupies disk space for the blocks it stages.
///
/// # Example
///
/// ```no_run
/// use journaled_storage::{FileJournalProvider, JournalStoreProvider};
///
/// let mut provider = FileJournalProvider::new("data.bin.jrnl");
/// let journal = provider.try_open("", true).unwrap();
/// assert!(journal.is_some());
/// ```
#[derive(Debug, Clone)]
pub struct FileJournalProvider {
    base: PathBuf,
}

impl FileJournalProvider {
    /// Creates a provider rooted at `base`.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Returns the base path (the primary journal's location).
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base
    }

    /// Returns the file path used for `id`.
    #[must_use]
    pub fn path_for(&self, id: &str) -> PathBuf {
        if id.is_empty() {
            return self.base.clone();
        }

        let mut name: OsString = self.base.clone().into_os_string();
        name.push(id);
        PathBuf::from(name)
    }
}

impl JournalStoreProvider for FileJournalProvider {
    fn exists(&self, id: &str) -> StorageResult<bool> {
        Ok(self.path_for(id).is_file())
    }

    fn delete(&mut self, id: &str) -> StorageResult<()> {
        match std::fs::remove_file(self.path_for(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn try_open(
        &mut self,
        id: &str,
        create_if_missing: bool,
    ) -> StorageResult<Option<Box<dyn ByteStore>>> {
        let path = self.path_for(id);

        if path.is_file() {
            return Ok(Some(Box::new(FileStore::open_existing(&path)?)));
        }

        if !create_if_missing {
            return Ok(None);
        }

        Ok(Some(Box::new(FileStore::open_with_create_dirs(&path)?)))
    }
}

/// A provider keeping named journals in memory.
///
/// Clones share the same set of journals, so a test can keep a handle while
/// a journaled stream owns another.
#[derive(Debug, Default, Clone)]
pub struct MemoryJournalProvider {
    stores: Arc<Mutex<HashMap<String, InMemoryStore>>>,
}

impl MemoryJournalProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if any journal exists.
    #[must_use]
    pub fn has_any_journal(&self) -> bool {
        !self.stores.lock().is_empty()
    }

    /// Returns a shared handle to the store for `id`, if it exists.
    #[must_use]
    pub fn store(&self, id: &str) -> Option<InMemoryStore> {
        self.stores.lock().get(id).cloned()
    }

    /// Returns the identifiers of all existing journals.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.stores.lock().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl JournalStoreProvider for MemoryJournalProvider {
    fn exists(&self, id: &str) -> StorageResult<bool> {
        Ok(self.stores.lock().contains_key(id))
    }

    fn delete(&mut self, id: &str) -> StorageResult<()> {
        self.stores.lock().remove(id);
        Ok(())
    }

    fn try_open(
        &mut self,
        id: &str,
        create_if_missing: bool,
    ) -> StorageResult<Option<Box<dyn ByteStore>>> {
        let mut stores = self.stores.lock();

        if let Some(store) = stores.get(id) {
            return Ok(Some(Box::new(store.clone())));
        }

        if !create_if_missing {
            return Ok(None);
        }

        let store = InMemoryStore::new();
        stores.insert(id.to_string(), store.clone());
        Ok(Some(Box::new(store)))
    }
}
