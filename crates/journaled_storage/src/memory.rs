//! In-memory byte store for testing.

use crate::error::StorageResult;
use crate::store::ByteStore;
use parking_lot::RwLock;
use std::sync::Arc;

/// An in-memory byte store.
///
/// This store keeps all data in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral streams that don't need persistence
///
/// # Sharing
///
/// Clones share the same buffer. A test can hand one clone to a journaled
/// stream and keep another to observe or corrupt the content.
///
/// # Example
///
/// ```rust
/// use journaled_storage::{ByteStore, InMemoryStore};
///
/// let mut store = InMemoryStore::new();
/// let observer = store.clone();
/// store.write_at(0, b"test data").unwrap();
/// assert_eq!(observer.data(), b"test data");
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    data: Arc<RwLock<Vec<u8>>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory store with pre-existing data.
    ///
    /// Useful for testing recovery scenarios.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Returns a copy of all data in the store.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Replaces the whole content of the store.
    pub fn replace(&self, data: Vec<u8>) {
        *self.data.write() = data;
    }

    /// Applies `f` to the raw buffer, e.g. to flip bytes in a test.
    pub fn modify<F: FnOnce(&mut Vec<u8>)>(&self, f: F) {
        f(&mut self.data.write());
    }
}

impl ByteStore for InMemoryStore {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> StorageResult<usize> {
        let data = self.data.read();
        let size = data.len() as u64;
        if offset >= size {
            return Ok(0);
        }

        let start = offset as usize;
        let count = buf.len().min(data.len() - start);
        buf[..count].copy_from_slice(&data[start..start + count]);
        Ok(count)
    }

    fn write_at(&mut self, offset: u64, new_data: &[u8]) -> StorageResult<()> {
        if new_data.is_empty() {
            return Ok(());
        }

        let mut data = self.data.write();
        let start = offset as usize;
        let end = start + new_data.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(new_data);
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn set_size(&mut self, new_size: u64) -> StorageResult<()> {
        self.data.write().resize(new_size as usize, 0);
        Ok(())
    }

    fn flush(&mut self) -> StorageResult<()> {
        // In-memory store has no pending writes
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        // In-memory store has no metadata to sync
        Ok(())
    }
}
