//! # Journaled Core
//!
//! Crash-consistent transactional overlay for seekable byte stores.
//!
//! A [`JournaledStream`] sits in front of an origin store. Writes, resizes
//! and seeks past the end are staged in a journal; the origin only changes
//! when a committed journal is applied. If the process dies at any point,
//! the next open either discards an uncommitted journal or finishes
//! applying a committed one, so the origin ends up fully before or fully
//! after the transaction.
//!
//! This crate provides:
//! - Journal framing: header, footers and WAL entries ([`format`])
//! - Two journal strategies: append-only WAL and block-sparse
//!   ([`journal`])
//! - The overlay state machine ([`JournaledStream`])
//! - Recovery of leftover journals at open ([`recover`])
//! - Read-only journal diagnostics ([`inspect_journal`])
//!
//! ## Commit protocol
//!
//! 1. Footer written after the staged data, then flushed or synced
//! 2. Header committed flag set in place, then flushed or synced
//! 3. Journal replayed into the origin, origin flushed or synced
//! 4. Journal deleted
//!
//! A crash before step 2 leaves an uncommitted journal; after it, a
//! committed one that recovery replays. Replay is idempotent.
//!
//! ## Example
//!
//! ```rust
//! use journaled_core::{Config, JournalFactory, JournaledStream};
//! use journaled_storage::{InMemoryStore, MemoryJournalProvider};
//!
//! let mut origin = InMemoryStore::with_data(b"9876543210".to_vec());
//! let observer = origin.clone();
//! let mut stream = JournaledStream::open(
//!     &mut origin,
//!     MemoryJournalProvider::new(),
//!     JournalFactory::sparse(5)?,
//!     Config::default(),
//! )?;
//!
//! stream.set_len(5)?;
//! stream.seek(std::io::SeekFrom::End(0))?;
//! stream.write(b"88774466")?;
//! stream.commit(true)?;
//!
//! assert_eq!(observer.data(), b"9876588774466");
//! # Ok::<(), journaled_core::JournalError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bitmap;
mod block;
mod config;
mod error;
pub mod format;
mod inspect;
pub mod journal;
mod nonce;
mod range;
mod recovery;
mod stream;

pub use bitmap::{DirtyBitmap, DirtyRuns};
pub use block::BlockSize;
pub use config::{Config, OpenPolicy};
pub use error::{JournalError, JournalResult};
pub use inspect::{inspect_journal, JournalReport, SparseReport, WalReport};
pub use journal::{Implementation, Journal, JournalFactory, JournalStrategy};
pub use nonce::{NonceSource, RandomNonceSource, SequentialNonceSource};
pub use range::ByteRange;
pub use recovery::{recover, RecoveryOutcome};
pub use stream::{JournaledStream, StreamState};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
