//! Benchmark utilities.

use journaled_core::JournalFactory;
use rand::Rng;

/// Generate random data of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate `count` random offsets below `limit`.
pub fn random_offsets(count: usize, limit: u64) -> Vec<u64> {
    let mut rng = rand::thread_rng();
    (0..count).map(|_| rng.gen_range(0..limit)).collect()
}

/// Named factories compared by every benchmark.
pub fn strategies() -> Vec<(&'static str, fn() -> JournalFactory)> {
    vec![
        ("wal", JournalFactory::wal as fn() -> JournalFactory),
        ("sparse_4k", || {
            JournalFactory::new(journaled_core::JournalStrategy::sparse_default())
        }),
    ]
}
