//! Recovery benchmarks: replaying a committed journal at open.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use journaled_bench::{random_data, random_offsets, strategies};
use journaled_core::{recover, Config, JournaledStream};
use journaled_storage::{ByteStore, InMemoryStore, JournalStoreProvider, MemoryJournalProvider};

const ORIGIN_SIZE: usize = 1 << 20;

/// Stages `writes` scattered 256-byte writes and leaves a committed journal.
fn committed_journal(
    factory: fn() -> journaled_core::JournalFactory,
    writes: usize,
) -> (InMemoryStore, Vec<u8>) {
    let mut origin = InMemoryStore::with_data(vec![0u8; ORIGIN_SIZE]);
    let provider = MemoryJournalProvider::new();
    let data = random_data(256);
    {
        let mut stream =
            JournaledStream::open(&mut origin, provider.clone(), factory(), Config::default())
                .unwrap();
        for offset in random_offsets(writes, (ORIGIN_SIZE - 256) as u64) {
            stream.set_position(offset).unwrap();
            stream.write(&data).unwrap();
        }
        stream.commit(false).unwrap();
    }
    (origin, provider.store("").unwrap().data())
}

/// Benchmark applying committed journals of growing size.
fn bench_apply(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply");
    group.sample_size(30);

    for (name, factory) in strategies() {
        for writes in [10, 100, 1000].iter() {
            let (origin, journal) = committed_journal(factory, *writes);
            group.throughput(Throughput::Bytes(journal.len() as u64));
            group.bench_with_input(BenchmarkId::new(name, writes), writes, |b, _| {
                let config = Config::default();
                let factory = factory();
                b.iter(|| {
                    let mut origin = InMemoryStore::with_data(origin.data());
                    let mut provider = MemoryJournalProvider::new();
                    provider
                        .try_open("", true)
                        .unwrap()
                        .unwrap()
                        .write_at(0, &journal)
                        .unwrap();
                    let outcome = recover(&mut origin, &mut provider, &factory, &config).unwrap();
                    black_box(outcome);
                });
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_apply);

criterion_main!(benches);
