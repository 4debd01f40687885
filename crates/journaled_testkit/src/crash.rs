//! Crash simulation for the commit protocol.
//!
//! A stream is driven through a sequence of operations and then abandoned
//! at one of the protocol's durability points, leaving the journal and the
//! origin exactly as a crash at that point would.
//!
//! ## Crash points
//!
//! 1. **Before finalize** - journal has staged data, no footer
//! 2. **After finalize** - footer written, committed flag not yet set
//! 3. **After commit flag** - journal committed, origin untouched
//! 4. **During apply** - journal committed, origin resized and partially
//!    replayed
//!
//! Recovery must leave the origin fully before the transaction for 1 and 2
//! and fully after it for 3 and 4.

use crate::fixtures::{corruption, MemoryEnv};
use crate::generators::StreamOp;
use journaled_core::{recover, Config, JournalFactory, JournalResult, RecoveryOutcome};
use journaled_storage::{ByteStore, InMemoryStore, JournalStoreProvider, MemoryJournalProvider};

/// Points at which a crash can be simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashPoint {
    /// Crash with staged data and no footer.
    BeforeFinalize,
    /// Crash after the footer was written but before the committed flag.
    AfterFinalize,
    /// Crash after the committed flag, before apply.
    AfterCommitFlag,
    /// Crash part way through apply.
    DuringApply,
}

impl CrashPoint {
    /// Every crash point, in protocol order.
    pub const ALL: [Self; 4] = [
        Self::BeforeFinalize,
        Self::AfterFinalize,
        Self::AfterCommitFlag,
        Self::DuringApply,
    ];

    /// Returns true if the journal is committed at this point.
    pub fn is_committed(self) -> bool {
        matches!(self, Self::AfterCommitFlag | Self::DuringApply)
    }

    /// Outcome automatic recovery must report when a journal was left.
    pub fn expected_outcome(self) -> RecoveryOutcome {
        if self.is_committed() {
            RecoveryOutcome::Applied
        } else {
            RecoveryOutcome::Discarded
        }
    }
}

/// Runs `ops` on a fresh stream over `env` and abandons it at `point`.
///
/// Returns true if a journal was left behind; operations that never leave
/// the clean state stage nothing.
///
/// # Errors
///
/// Returns any error raised while staging, committing or tearing apply.
pub fn simulate_crash(
    env: &mut MemoryEnv,
    make_factory: fn() -> JournalFactory,
    ops: &[StreamOp],
    point: CrashPoint,
) -> JournalResult<bool> {
    {
        let mut stream = env.try_open(make_factory(), Config::default())?;
        for op in ops {
            op.apply(&mut stream)?;
        }
        if point != CrashPoint::BeforeFinalize {
            stream.commit(false)?;
        }
    }

    let Some(journal) = env.journal() else {
        return Ok(false);
    };

    match point {
        CrashPoint::BeforeFinalize | CrashPoint::AfterCommitFlag => {}
        CrashPoint::AfterFinalize => corruption::clear_committed(&journal),
        CrashPoint::DuringApply => tear_apply(env, &journal, make_factory)?,
    }
    Ok(true)
}

/// Leaves the origin resized to its final length with only the first half
/// of the final content written.
fn tear_apply(
    env: &MemoryEnv,
    journal: &InMemoryStore,
    make_factory: fn() -> JournalFactory,
) -> JournalResult<()> {
    let mut provider = MemoryJournalProvider::new();
    if let Some(mut copy) = provider.try_open("", true)? {
        copy.write_at(0, &journal.data())?;
    }

    let mut scratch = InMemoryStore::with_data(env.origin_data());
    recover(&mut scratch, &mut provider, &make_factory(), &Config::default())?;

    let applied = scratch.data();
    let half = applied.len() / 2;
    env.origin.modify(|data| {
        data.resize(applied.len(), 0);
        data[..half].copy_from_slice(&applied[..half]);
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops() -> Vec<StreamOp> {
        vec![StreamOp::Write {
            offset: 2,
            data: b"XYZW".to_vec(),
        }]
    }

    #[test]
    fn uncommitted_points_are_discarded() {
        for point in [CrashPoint::BeforeFinalize, CrashPoint::AfterFinalize] {
            let mut env = MemoryEnv::new(b"abcdef");
            assert!(simulate_crash(&mut env, JournalFactory::wal, &ops(), point).unwrap());
            assert_eq!(env.origin_data(), b"abcdef");
            assert_eq!(point.expected_outcome(), RecoveryOutcome::Discarded);
        }
    }

    #[test]
    fn torn_apply_resizes_and_half_writes() {
        let mut env = MemoryEnv::new(b"abcdef");
        simulate_crash(&mut env, JournalFactory::wal, &ops(), CrashPoint::DuringApply).unwrap();
        assert_eq!(env.origin_data(), b"abXdef");
        assert!(env.has_journal());
    }

    #[test]
    fn clean_stream_leaves_nothing() {
        let mut env = MemoryEnv::new(b"abc");
        let left = simulate_crash(&mut env, JournalFactory::wal, &[], CrashPoint::DuringApply);
        assert!(!left.unwrap());
    }
}
