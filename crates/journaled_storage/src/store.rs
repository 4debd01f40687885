//! Byte store trait definition.

use crate::error::{StorageError, StorageResult};

/// A random-access, resizable byte store.
///
/// Stores are **opaque byte ranges**. The journaling engine uses one store as
/// the protected origin and one per journal. Stores do not interpret the
/// bytes they hold.
///
/// # Invariants
///
/// - `read_at` returns fewer bytes than requested only at the end of data
/// - `write_at` past the current size zero-fills the gap
/// - `set_size` truncates or zero-extends
/// - `flush` pushes buffered data to the OS, `sync` makes data and metadata
///   durable
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
/// - [`super::FileStore`] - For persistent storage
pub trait ByteStore: Send {
    /// Reads up to `buf.len()` bytes starting at `offset`.
    ///
    /// Returns the number of bytes read, which is short only when the end
    /// of the store is reached. Reading at or past the end returns 0.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> StorageResult<usize>;

    /// Writes all of `data` at `offset`.
    ///
    /// If `offset` is beyond the current size, the gap is zero-filled.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> StorageResult<()>;

    /// Returns the current size of the store in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Truncates or zero-extends the store to `new_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the resize fails.
    fn set_size(&mut self, new_size: u64) -> StorageResult<()>;

    /// Flushes pending writes to the OS.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush operation fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Syncs all data and metadata to durable storage.
    ///
    /// This is a stronger guarantee than `flush` - after it returns, the
    /// content and size survive process termination and power loss.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Reads exactly `buf.len()` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadPastEnd`] if the store ends before the
    /// buffer is filled.
    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> StorageResult<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let read = self.read_at(offset + filled as u64, &mut buf[filled..])?;
            if read == 0 {
                return Err(StorageError::ReadPastEnd {
                    offset,
                    len: buf.len(),
                    size: self.size()?,
                });
            }
            filled += read;
        }
        Ok(())
    }
}

impl<T: ByteStore + ?Sized> ByteStore for &mut T {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> StorageResult<usize> {
        (**self).read_at(offset, buf)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> StorageResult<()> {
        (**self).write_at(offset, data)
    }

    fn size(&self) -> StorageResult<u64> {
        (**self).size()
    }

    fn set_size(&mut self, new_size: u64) -> StorageResult<()> {
        (**self).set_size(new_size)
    }

    fn flush(&mut self) -> StorageResult<()> {
        (**self).flush()
    }

    fn sync(&mut self) -> StorageResult<()> {
        (**self).sync()
    }
}

impl<T: ByteStore + ?Sized> ByteStore for Box<T> {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> StorageResult<usize> {
        (**self).read_at(offset, buf)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> StorageResult<()> {
        (**self).write_at(offset, data)
    }

    fn size(&self) -> StorageResult<u64> {
        (**self).size()
    }

    fn set_size(&mut self, new_size: u64) -> StorageResult<()> {
        (**self).set_size(new_size)
    }

    fn flush(&mut self) -> StorageResult<()> {
        (**self).flush()
    }

    fn sync(&mut self) -> StorageResult<()> {
        (**self).sync()
    }
}
