//! # Journaled Storage
//!
//! Byte store abstractions used by the journaling engine.
//!
//! This crate provides the lowest-level storage layer. Stores are **opaque
//! random-access byte stores** - they know nothing about journal headers,
//! footers, entries or bitmaps.
//!
//! ## Design Principles
//!
//! - A store supports positioned reads and writes, resizing, flush and sync
//! - Writing past the end zero-extends the store
//! - Journal stores are created, opened and deleted by name through a
//!   [`JournalStoreProvider`]
//! - `journaled_core` owns all format interpretation
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral data
//! - [`FileStore`] - For persistent storage using OS file APIs
//!
//! ## Available Providers
//!
//! - [`MemoryJournalProvider`] - Named in-memory journals
//! - [`FileJournalProvider`] - Journals stored next to a base path
//!
//! ## Example
//!
//! ```rust
//! use journaled_storage::{ByteStore, InMemoryStore};
//!
//! let mut store = InMemoryStore::new();
//! store.write_at(0, b"hello world").unwrap();
//!
//! let mut buf = [0u8; 5];
//! store.read_exact_at(6, &mut buf).unwrap();
//! assert_eq!(&buf, b"world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod provider;
mod store;

pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
pub use provider::{FileJournalProvider, JournalStoreProvider, MemoryJournalProvider};
pub use store::ByteStore;
