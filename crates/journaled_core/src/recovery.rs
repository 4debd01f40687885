//! Handling of journals left behind by a previous session.

use crate::config::Config;
use crate::error::{JournalError, JournalResult};
use crate::format::{read_frame, JournalHeader};
use crate::journal::JournalFactory;
use journaled_storage::{ByteStore, JournalStoreProvider};
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

/// What recovery did with a leftover journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryOutcome {
    /// There was no journal.
    NoJournal,
    /// A committed journal was replayed into the origin and deleted.
    Applied,
    /// An uncommitted or unreadable journal was deleted.
    Discarded,
}

impl fmt::Display for RecoveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NoJournal => "no journal",
            Self::Applied => "applied",
            Self::Discarded => "discarded",
        })
    }
}

/// Resolves a leftover journal for `config.journal_id` according to
/// `config.policy`.
///
/// | journal                    | policy allows       | result            |
/// |----------------------------|---------------------|-------------------|
/// | missing                    | -                   | `NoJournal`       |
/// | uncommitted or unreadable  | discard_uncommitted | `Discarded`       |
/// | uncommitted or unreadable  | -                   | corruption error  |
/// | committed                  | apply_committed     | `Applied`         |
/// | committed                  | -                   | committed error   |
///
/// A journal that fails to apply, or that was written by another strategy,
/// is left in storage.
///
/// # Errors
///
/// - corruption as in the table, or raised during apply
/// - [`JournalError::CommittedNotApplied`] as in the table
/// - [`JournalError::IncorrectImplementation`] if `factory` uses another
///   strategy than the committed journal
pub fn recover(
    origin: &mut dyn ByteStore,
    provider: &mut dyn JournalStoreProvider,
    factory: &JournalFactory,
    config: &Config,
) -> JournalResult<RecoveryOutcome> {
    let id = config.journal_id.as_str();
    let policy = config.policy;

    let Some(mut store) = provider.try_open(id, false)? else {
        return Ok(RecoveryOutcome::NoJournal);
    };

    let committed = match read_frame::<JournalHeader>(store.as_mut(), 0) {
        Ok(header) => header.is_committed(),
        Err(e) if e.is_corruption() => false,
        Err(e) => return Err(e),
    };

    if !committed {
        if policy.discard_uncommitted {
            drop(store);
            provider.delete(id)?;
            info!(journal = id, "discarded uncommitted journal");
            return Ok(RecoveryOutcome::Discarded);
        }

        warn!(journal = id, "found an uncommitted or unreadable journal");
        return Err(JournalError::corrupted(
            "an uncommitted or unreadable journal exists; \
             open with a policy that discards uncommitted journals to remove it",
            false,
        ));
    }

    if !policy.apply_committed {
        warn!(journal = id, "found a committed journal that may not be applied");
        return Err(JournalError::committed_not_applied(
            "a committed journal exists; open with a policy that applies committed journals",
        ));
    }

    let mut journal = factory.open(store).inspect_err(|e| {
        warn!(journal = id, error = %e, "cannot open committed journal");
    })?;
    journal.apply(origin, config.sync_on_commit).inspect_err(|e| {
        warn!(
            journal = id,
            error = %e,
            origin_altered = e.origin_altered(),
            "failed to apply committed journal"
        );
    })?;
    drop(journal);

    provider.delete(id)?;
    info!(
        journal = id,
        implementation = %factory.implementation(),
        "applied committed journal"
    );
    Ok(RecoveryOutcome::Applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OpenPolicy;
    use crate::format::{Frame, WalEntryHeader};
    use crate::journal::Journal;
    use journaled_storage::{InMemoryStore, MemoryJournalProvider};

    fn committed_wal(provider: &mut MemoryJournalProvider, origin: &mut InMemoryStore, data: &[u8]) {
        let store = provider.try_open("", true).unwrap().unwrap();
        let mut journal = JournalFactory::wal().create(store).unwrap();
        journal.write(origin, 0, data).unwrap();
        journal.finalize(data.len() as u64, false).unwrap();
        journal.mark_committed(false).unwrap();
    }

    fn uncommitted_wal(provider: &mut MemoryJournalProvider, origin: &mut InMemoryStore) {
        let store = provider.try_open("", true).unwrap().unwrap();
        let mut journal: Box<dyn Journal> = JournalFactory::wal().create(store).unwrap();
        journal.write(origin, 0, b"partial").unwrap();
    }

    fn run(
        origin: &mut InMemoryStore,
        provider: &mut MemoryJournalProvider,
        factory: &JournalFactory,
        policy: OpenPolicy,
    ) -> JournalResult<RecoveryOutcome> {
        recover(origin, provider, factory, &Config::default().policy(policy))
    }

    #[test]
    fn no_journal() {
        let mut origin = InMemoryStore::with_data(b"abc".to_vec());
        let mut provider = MemoryJournalProvider::new();

        let outcome = run(&mut origin, &mut provider, &JournalFactory::wal(), OpenPolicy::NONE);
        assert_eq!(outcome.unwrap(), RecoveryOutcome::NoJournal);
        assert!(!provider.has_any_journal());
    }

    #[test]
    fn committed_is_applied_and_deleted() {
        let mut origin = InMemoryStore::with_data(b"old".to_vec());
        let mut provider = MemoryJournalProvider::new();
        committed_wal(&mut provider, &mut origin, b"new data");

        let outcome = run(&mut origin, &mut provider, &JournalFactory::wal(), OpenPolicy::default());
        assert_eq!(outcome.unwrap(), RecoveryOutcome::Applied);
        assert_eq!(origin.data(), b"new data");
        assert!(!provider.has_any_journal());
    }

    #[test]
    fn committed_without_apply_policy_is_kept() {
        let mut origin = InMemoryStore::with_data(b"old".to_vec());
        let mut provider = MemoryJournalProvider::new();
        committed_wal(&mut provider, &mut origin, b"new");

        let policy = OpenPolicy::NONE.discard_uncommitted(true);
        let err = run(&mut origin, &mut provider, &JournalFactory::wal(), policy).unwrap_err();
        assert!(matches!(err, JournalError::CommittedNotApplied { .. }));
        assert_eq!(origin.data(), b"old");
        assert!(provider.has_any_journal());
    }

    #[test]
    fn uncommitted_is_discarded_when_allowed() {
        let mut origin = InMemoryStore::with_data(b"old".to_vec());
        let mut provider = MemoryJournalProvider::new();
        uncommitted_wal(&mut provider, &mut origin);

        let outcome = run(&mut origin, &mut provider, &JournalFactory::wal(), OpenPolicy::AUTOMATIC);
        assert_eq!(outcome.unwrap(), RecoveryOutcome::Discarded);
        assert_eq!(origin.data(), b"old");
        assert!(!provider.has_any_journal());
    }

    #[test]
    fn uncommitted_is_corruption_by_default() {
        let mut origin = InMemoryStore::with_data(b"old".to_vec());
        let mut provider = MemoryJournalProvider::new();
        uncommitted_wal(&mut provider, &mut origin);

        let err = run(&mut origin, &mut provider, &JournalFactory::wal(), OpenPolicy::default())
            .unwrap_err();
        assert!(err.is_corruption());
        assert!(!err.origin_altered());
        assert!(provider.has_any_journal());
    }

    #[test]
    fn garbage_journal_counts_as_uncommitted() {
        let mut origin = InMemoryStore::with_data(b"old".to_vec());
        let mut provider = MemoryJournalProvider::new();
        let mut store = provider.try_open("", true).unwrap().unwrap();
        store.write_at(0, b"not a journal header").unwrap();

        let err = run(&mut origin, &mut provider, &JournalFactory::wal(), OpenPolicy::default())
            .unwrap_err();
        assert!(err.is_corruption());

        let outcome = run(&mut origin, &mut provider, &JournalFactory::wal(), OpenPolicy::AUTOMATIC);
        assert_eq!(outcome.unwrap(), RecoveryOutcome::Discarded);
    }

    #[test]
    fn empty_journal_counts_as_uncommitted() {
        let mut origin = InMemoryStore::new();
        let mut provider = MemoryJournalProvider::new();
        provider.try_open("", true).unwrap();

        let outcome = run(&mut origin, &mut provider, &JournalFactory::wal(), OpenPolicy::AUTOMATIC);
        assert_eq!(outcome.unwrap(), RecoveryOutcome::Discarded);
    }

    #[test]
    fn wrong_strategy_keeps_journal() {
        let mut origin = InMemoryStore::with_data(b"old".to_vec());
        let mut provider = MemoryJournalProvider::new();
        committed_wal(&mut provider, &mut origin, b"new");

        let sparse = JournalFactory::sparse(5).unwrap();
        let err = run(&mut origin, &mut provider, &sparse, OpenPolicy::AUTOMATIC).unwrap_err();
        assert!(matches!(err, JournalError::IncorrectImplementation { .. }));
        assert_eq!(origin.data(), b"old");
        assert!(provider.has_any_journal());
    }

    #[test]
    fn corrupt_payload_keeps_journal() {
        let mut origin = InMemoryStore::with_data(b"old".to_vec());
        let mut provider = MemoryJournalProvider::new();
        committed_wal(&mut provider, &mut origin, b"new");

        let journal = provider.store("").unwrap();
        let payload_at = JournalHeader::SIZE + WalEntryHeader::SIZE;
        journal.modify(|d| d[payload_at] ^= 0xFF);

        let err = run(&mut origin, &mut provider, &JournalFactory::wal(), OpenPolicy::AUTOMATIC)
            .unwrap_err();
        assert!(err.is_corruption());
        assert!(provider.has_any_journal());
    }

    #[test]
    fn journal_id_selects_store() {
        let mut origin = InMemoryStore::with_data(b"old".to_vec());
        let mut provider = MemoryJournalProvider::new();
        committed_wal(&mut provider, &mut origin, b"new");

        let config = Config::default().journal_id(".other");
        let outcome = recover(&mut origin, &mut provider, &JournalFactory::wal(), &config);
        assert_eq!(outcome.unwrap(), RecoveryOutcome::NoJournal);
        assert!(provider.has_any_journal());
    }
}
