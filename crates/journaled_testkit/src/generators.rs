//! Property-based test generators using proptest.
//!
//! Provides strategies for random stream operations and a reference model
//! that applies the same operations to a plain `Vec<u8>`.

use journaled_core::{JournalResult, JournaledStream};
use proptest::prelude::*;
use std::io::SeekFrom;

/// One operation on a journaled stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOp {
    /// Write `data` at `offset`, extending the stream if needed.
    Write {
        /// Absolute offset
        offset: u64,
        /// Bytes to write
        data: Vec<u8>,
    },
    /// Truncate or zero-extend to `len`.
    SetLen(u64),
    /// Move the cursor to `offset`, extending the stream if past its end.
    Seek(u64),
}

impl StreamOp {
    /// Applies the operation to `stream`.
    pub fn apply(&self, stream: &mut JournaledStream<'_>) -> JournalResult<()> {
        match self {
            Self::Write { offset, data } => {
                stream.seek(SeekFrom::Start(*offset))?;
                stream.write(data)
            }
            Self::SetLen(len) => stream.set_len(*len),
            Self::Seek(offset) => stream.seek(SeekFrom::Start(*offset)).map(|_| ()),
        }
    }
}

/// Reference model: the content a stream should expose.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelStream {
    data: Vec<u8>,
}

impl ModelStream {
    /// Creates a model holding `content`.
    pub fn new(content: &[u8]) -> Self {
        Self {
            data: content.to_vec(),
        }
    }

    /// Current content.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Applies one operation.
    pub fn apply(&mut self, op: &StreamOp) {
        match op {
            StreamOp::Write { offset, data } => {
                let start = *offset as usize;
                let end = start + data.len();
                if self.data.len() < end {
                    self.data.resize(end, 0);
                }
                self.data[start..end].copy_from_slice(data);
            }
            StreamOp::SetLen(len) => self.data.resize(*len as usize, 0),
            StreamOp::Seek(offset) => {
                let offset = *offset as usize;
                if offset > self.data.len() {
                    self.data.resize(offset, 0);
                }
            }
        }
    }
}

/// Strategy for origin content up to `max_len` bytes.
pub fn content_strategy(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..max_len)
}

/// Strategy for one operation within `max_offset`.
///
/// Writes dominate; payloads are small enough to keep cases fast but large
/// enough to straddle 32-byte sparse blocks.
pub fn stream_op_strategy(max_offset: u64) -> impl Strategy<Value = StreamOp> {
    prop_oneof![
        6 => (0..max_offset, prop::collection::vec(any::<u8>(), 1..100))
            .prop_map(|(offset, data)| StreamOp::Write { offset, data }),
        2 => (0..max_offset).prop_map(StreamOp::SetLen),
        1 => (0..max_offset).prop_map(StreamOp::Seek),
    ]
}

/// Strategy for a sequence of operations.
pub fn op_sequence_strategy(
    max_offset: u64,
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<StreamOp>> {
    prop::collection::vec(stream_op_strategy(max_offset), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
