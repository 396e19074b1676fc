use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use chainlog_crypto::ChainHasher;
use chainlog_ledger::AuditLedger;
use chainlog_store::{FileLedgerStore, FileStoreConfig, InMemoryLedgerStore, SyncPolicy};
use chainlog_types::Metadata;

fn metadata() -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("action".into(), "evidence submitted".into());
    metadata.insert("ip".into(), "10.1.2.3".into());
    metadata
}

fn populated(count: u32) -> AuditLedger<InMemoryLedgerStore> {
    let ledger = AuditLedger::new(InMemoryLedgerStore::new());
    for i in 0..count {
        ledger
            .append("DOC-1", "USR-1", ChainHasher::sha256(&i.to_le_bytes()), metadata())
            .unwrap();
    }
    ledger
}

fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");

    let ledger = AuditLedger::new(InMemoryLedgerStore::new());
    let payload = ChainHasher::sha256(b"payload");
    group.bench_function("memory", |b| {
        b.iter(|| {
            ledger
                .append("DOC-1", "USR-1", black_box(payload), metadata())
                .unwrap()
        })
    });

    let dir = tempfile::tempdir().unwrap();
    let store = FileLedgerStore::open(
        dir.path().join("bench.log"),
        FileStoreConfig {
            sync: SyncPolicy::OsDefault,
        },
    )
    .unwrap();
    let ledger = AuditLedger::new(store);
    group.bench_function("file_os_default", |b| {
        b.iter(|| {
            ledger
                .append("DOC-1", "USR-1", black_box(payload), metadata())
                .unwrap()
        })
    });

    group.finish();
}

fn bench_verify(c: &mut Criterion) {
    let mut group = c.benchmark_group("verify");
    for count in [100u32, 1_000] {
        group.bench_function(format!("{count}_entries"), |b| {
            b.iter_batched(
                || populated(count),
                |ledger| black_box(ledger.verify().unwrap()),
                BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_append, bench_verify);
criterion_main!(benches);
