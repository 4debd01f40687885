//! # Journaled Testkit
//!
//! Test utilities for the journaling engine.
//!
//! This crate provides:
//! - Memory and file-backed environments for journaled streams
//! - Property-based generators for stream operations, with a reference model
//! - Crash simulation at each durability point of the commit protocol
//! - Corruption helpers for journal stores
//! - Byte-exact format vectors
//!
//! ## Usage
//!
//! ```rust
//! use journaled_testkit::prelude::*;
//!
//! let mut env = MemoryEnv::new(b"Data");
//! let mut stream = env.open(JournalFactory::wal());
//! stream.seek(std::io::SeekFrom::End(0)).unwrap();
//! stream.write(b"End").unwrap();
//! stream.commit(true).unwrap();
//! drop(stream);
//!
//! assert_eq!(env.origin_data(), b"DataEnd");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod vectors;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use journaled_core::{
        Config, JournalError, JournalFactory, JournaledStream, OpenPolicy, RecoveryOutcome,
        StreamState,
    };
    pub use journaled_storage::{
        ByteStore, InMemoryStore, JournalStoreProvider, MemoryJournalProvider,
    };
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
