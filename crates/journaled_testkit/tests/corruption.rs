//! Damaged journals must stop every open and must never be deleted.

use journaled_core::format::{Frame, JournalHeader, SparseFooter, WalEntryHeader, WalFooter};
use journaled_testkit::corruption;
use journaled_testkit::prelude::*;

fn committed(env: &mut MemoryEnv, factory: JournalFactory) -> InMemoryStore {
    {
        let mut stream = env.open(factory);
        stream.seek(std::io::SeekFrom::Start(2)).unwrap();
        stream.write(b"hello").unwrap();
        stream.commit(false).unwrap();
    }
    env.journal().expect("committed journal")
}

fn assert_refused_twice(env: &mut MemoryEnv, factory: fn() -> JournalFactory, what: &str) {
    for attempt in 0..2 {
        let err = env.try_open(factory(), Config::default()).unwrap_err();
        assert!(err.is_corruption(), "{what}, attempt {attempt}: {err}");
        assert!(env.has_journal(), "{what}, attempt {attempt}");
    }
}

#[test]
fn wal_body_damage_is_detected() {
    let probe = committed(&mut MemoryEnv::new(b"0123456789"), JournalFactory::wal());
    let body = corruption::body_range(&probe, WalFooter::SIZE);
    assert_eq!(body, JournalHeader::SIZE..JournalHeader::SIZE + WalEntryHeader::SIZE + 5);

    // The entry's origin offset is not covered by the payload checksum; only
    // its sign bit is checked.
    let offset_low = JournalHeader::SIZE + 4..JournalHeader::SIZE + 11;

    for at in body.filter(|at| !offset_low.contains(at)) {
        let mut env = MemoryEnv::new(b"0123456789");
        let journal = committed(&mut env, JournalFactory::wal());
        corruption::flip_byte(&journal, at);

        assert_refused_twice(&mut env, JournalFactory::wal, &format!("byte {at}"));
    }
}

#[test]
fn wal_checksum_failure_reports_altered_origin() {
    let mut env = MemoryEnv::new(b"0123");
    let journal = committed(&mut env, JournalFactory::wal());
    let payload = JournalHeader::SIZE + WalEntryHeader::SIZE;
    corruption::flip_byte(&journal, payload);

    let err = env.try_open(JournalFactory::wal(), Config::default()).unwrap_err();
    assert!(err.is_corruption());
    // The origin was extended from 4 to 7 bytes before the entry was read.
    assert!(err.origin_altered());
    assert_eq!(env.origin_data().len(), 7);
}

#[test]
fn wal_footer_damage_is_detected() {
    // magic, nonce, entry count, sign of the final length
    for at in [0usize, 8, 16, 27] {
        let mut env = MemoryEnv::new(b"0123456789");
        let journal = committed(&mut env, JournalFactory::wal());
        let footer_start = journal.data().len() - WalFooter::SIZE;
        corruption::flip_byte(&journal, footer_start + at);

        assert_refused_twice(&mut env, JournalFactory::wal, &format!("footer byte {at}"));
    }
}

#[test]
fn sparse_layout_damage_is_detected() {
    let sparse = || JournalFactory::sparse(5).unwrap();
    let damage: [(&str, fn(&InMemoryStore)); 4] = [
        ("truncated tail", |j| corruption::truncate_tail(j, 1)),
        ("footer nonce", |j| {
            let at = j.data().len() - SparseFooter::SIZE + 8;
            corruption::flip_byte(j, at);
        }),
        ("bitmap high bits", |j| {
            let at = j.data().len() - SparseFooter::SIZE - 1;
            corruption::flip_byte(j, at);
        }),
        ("footer magic", |j| {
            let at = j.data().len() - SparseFooter::SIZE;
            corruption::flip_byte(j, at);
        }),
    ];

    for (what, damage) in damage {
        let mut env = MemoryEnv::new(b"0123456789");
        let journal = committed(&mut env, sparse());
        damage(&journal);

        assert_refused_twice(&mut env, sparse, what);
        assert_eq!(env.origin_data(), b"0123456789", "{what}");
    }
}

#[test]
fn damaged_header_blocks_default_open_but_can_be_discarded() {
    for (name, factory) in all_factories() {
        let mut env = MemoryEnv::new(b"0123456789");
        let journal = committed(&mut env, factory());
        corruption::flip_byte(&journal, 0);

        assert_refused_twice(&mut env, factory, name);

        let config = Config::default().policy(OpenPolicy::AUTOMATIC);
        let stream = env.try_open(factory(), config).unwrap();
        assert_eq!(stream.recovery_outcome(), RecoveryOutcome::Discarded, "{name}");
        drop(stream);
        assert_eq!(env.origin_data(), b"0123456789", "{name}");
    }
}

#[test]
fn unknown_implementation_id() {
    let mut env = MemoryEnv::new(b"abc");
    let journal = committed(&mut env, JournalFactory::wal());
    corruption::set_implementation_id(&journal, 9);

    let err = env.try_open(JournalFactory::wal(), Config::default()).unwrap_err();
    match err {
        JournalError::IncorrectImplementation { journal, .. } => {
            assert_eq!(journal.to_string(), "id 9");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(env.has_journal());
}

#[test]
fn committed_flag_cleared_counts_as_uncommitted() {
    let mut env = MemoryEnv::new(b"abc");
    let journal = committed(&mut env, JournalFactory::wal());
    corruption::clear_committed(&journal);

    assert_refused_twice(&mut env, JournalFactory::wal, "cleared flag");

    let config = Config::default().policy(OpenPolicy::AUTOMATIC);
    let stream = env.try_open(JournalFactory::wal(), config).unwrap();
    assert_eq!(stream.recovery_outcome(), RecoveryOutcome::Discarded);
}
