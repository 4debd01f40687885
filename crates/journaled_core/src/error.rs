//! Error types for the journaling engine.

use crate::journal::Implementation;
use crate::stream::StreamState;
use std::io;
use thiserror::Error;

/// Result type for journaling operations.
pub type JournalResult<T> = Result<T, JournalError>;

/// Errors that can occur while staging, committing, applying or recovering
/// a journal.
#[derive(Debug, Error)]
pub enum JournalError {
    /// Storage error from the origin or a journal store.
    #[error("storage error: {0}")]
    Storage(#[from] journaled_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The journal is unreadable or inconsistent.
    ///
    /// When `origin_altered` is true the origin was already resized or
    /// partially replayed before the fault was found; it is in an undefined
    /// intermediate state and needs manual intervention.
    #[error("journal corrupted: {message} (origin altered: {origin_altered})")]
    Corrupted {
        /// Description of the corruption.
        message: String,
        /// Whether the origin has been mutated.
        origin_altered: bool,
    },

    /// The journal was written by a different strategy than the one used to
    /// open it.
    #[error(
        "wrong journal implementation: the existing journal used {journal}, \
         but {requested} was used to open it"
    )]
    IncorrectImplementation {
        /// Implementation recorded in the journal header.
        journal: Implementation,
        /// Implementation that tried to open it.
        requested: Implementation,
    },

    /// The overlay is in a state that forbids the operation.
    #[error("journaled stream is in state {current}, expected one of: {}", join_states(.expected))]
    InvalidState {
        /// Current state.
        current: StreamState,
        /// States in which the operation is allowed.
        expected: Vec<StreamState>,
    },

    /// A committed journal exists but has not been applied yet.
    #[error("journal committed but not applied: {message}")]
    CommittedNotApplied {
        /// Description of what must happen first.
        message: String,
    },

    /// A caller-supplied argument is out of range.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the argument problem.
        message: String,
    },
}

fn join_states(states: &[StreamState]) -> String {
    states
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl JournalError {
    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>, origin_altered: bool) -> Self {
        Self::Corrupted {
            message: message.into(),
            origin_altered,
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(current: StreamState, expected: &[StreamState]) -> Self {
        Self::InvalidState {
            current,
            expected: expected.to_vec(),
        }
    }

    /// Creates a committed-but-not-applied error.
    pub fn committed_not_applied(message: impl Into<String>) -> Self {
        Self::CommittedNotApplied {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Returns true if this is a corruption error.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corrupted { .. })
    }

    /// Returns true if the origin was mutated before this error was raised.
    ///
    /// Only corruption errors raised during apply can report true.
    #[must_use]
    pub fn origin_altered(&self) -> bool {
        matches!(
            self,
            Self::Corrupted {
                origin_altered: true,
                ..
            }
        )
    }
}

impl From<JournalError> for io::Error {
    fn from(err: JournalError) -> Self {
        match err {
            JournalError::Io(e) => e,
            JournalError::Storage(journaled_storage::StorageError::Io(e)) => e,
            JournalError::InvalidArgument { .. } => {
                io::Error::new(io::ErrorKind::InvalidInput, err)
            }
            JournalError::Corrupted { .. } | JournalError::IncorrectImplementation { .. } => {
                io::Error::new(io::ErrorKind::InvalidData, err)
            }
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incorrect_implementation_names_both() {
        let err = JournalError::IncorrectImplementation {
            journal: Implementation::Wal,
            requested: Implementation::Sparse,
        };
        let message = err.to_string();
        assert!(message.contains("WalJournal"));
        assert!(message.contains("SparseJournal"));

        let err = JournalError::IncorrectImplementation {
            journal: Implementation::from_id(77),
            requested: Implementation::Wal,
        };
        assert!(err.to_string().contains("id 77"));
    }

    #[test]
    fn invalid_state_lists_expected_states() {
        let err = JournalError::invalid_state(
            StreamState::Closed,
            &[StreamState::Clean, StreamState::JournalOpen],
        );
        let message = err.to_string();
        assert!(message.contains("Closed"));
        assert!(message.contains("Clean, JournalOpen"));
    }

    #[test]
    fn origin_altered_only_for_corruption() {
        assert!(JournalError::corrupted("bad checksum", true).origin_altered());
        assert!(!JournalError::corrupted("bad magic", false).origin_altered());
        assert!(!JournalError::committed_not_applied("pending").origin_altered());
    }

    #[test]
    fn io_error_kinds() {
        let io_err: io::Error = JournalError::invalid_argument("negative seek").into();
        assert_eq!(io_err.kind(), io::ErrorKind::InvalidInput);

        let io_err: io::Error = JournalError::corrupted("bad magic", false).into();
        assert_eq!(io_err.kind(), io::ErrorKind::InvalidData);

        let io_err: io::Error = JournalError::committed_not_applied("pending").into();
        assert_eq!(io_err.kind(), io::ErrorKind::Other);
    }
}
