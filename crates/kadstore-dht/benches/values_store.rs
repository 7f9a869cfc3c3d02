use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use kadstore_dht::{
    DbKey, DhtValue, KeyDirectory, KeyTable, StorageEnv, ValueLimits, ValuesStore,
};
use kadstore_protocol::{KNode, Kuid, ValueType, VendorCode, KUID_RAW_SIZE};

fn random_kuid(rng: &mut StdRng) -> Kuid {
    let mut bytes = [0u8; KUID_RAW_SIZE];
    rng.fill(&mut bytes[..]);
    Kuid::from_bytes(bytes)
}

/// One creator per value, spread over enough networks to stay under quotas
fn create_values(count: usize, payload: usize) -> Vec<DhtValue> {
    let mut rng = StdRng::seed_from_u64(42);

    (0..count)
        .map(|i| {
            let creator = Arc::new(KNode::new(
                random_kuid(&mut rng),
                IpAddr::V4(Ipv4Addr::new(10, (i >> 8) as u8, i as u8, 1)),
                6346,
                VendorCode::from_fourcc(b"TEST"),
                1,
                0,
            ));
            let data: Vec<u8> = (0..payload).map(|_| rng.gen()).collect();
            DhtValue::new(&creator, random_kuid(&mut rng), ValueType::BINARY, 1, 0, data).unwrap()
        })
        .collect()
}

/// Store every value, returning the local keys in order
fn populate(store: &mut ValuesStore, values: &[DhtValue]) -> Vec<DbKey> {
    values
        .iter()
        .map(|value| {
            let creator = value.creator();
            store.store(creator, value, true).unwrap();
            store.keys().has(value.id(), &creator.id).unwrap()
        })
        .collect()
}

fn memory_store() -> ValuesStore {
    ValuesStore::open(StorageEnv::memory(), KeyTable::new(), ValueLimits::default()).unwrap()
}

/// The TempDir must be kept alive alongside the store
fn sled_store() -> (ValuesStore, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let env = StorageEnv::sled(temp_dir.path()).unwrap();
    let store = ValuesStore::open(env, KeyTable::new(), ValueLimits::default()).unwrap();
    (store, temp_dir)
}

fn bench_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish");

    for size in [100, 1000] {
        let values = create_values(size, 64);

        group.bench_with_input(BenchmarkId::new("memory", size), &values, |b, values| {
            b.iter(|| {
                let mut store = memory_store();
                black_box(populate(&mut store, values));
            })
        });

        group.bench_with_input(BenchmarkId::new("sled", size), &values, |b, values| {
            b.iter(|| {
                let (mut store, _dir) = sled_store();
                black_box(populate(&mut store, values));
            })
        });
    }

    group.finish();
}

fn bench_replicate(c: &mut Criterion) {
    let mut group = c.benchmark_group("replicate");
    let values = create_values(1000, 256);
    let replicator = KNode::new(
        Kuid::from_bytes([0xEE; KUID_RAW_SIZE]),
        IpAddr::V4(Ipv4Addr::new(172, 16, 0, 1)),
        6346,
        VendorCode::from_fourcc(b"TEST"),
        1,
        0,
    );

    let mut store = memory_store();
    populate(&mut store, &values);

    group.bench_function("memory", |b| {
        let mut i = 0;
        b.iter(|| {
            let value = &values[i % values.len()];
            i += 1;
            black_box(store.store(&replicator, value, true).unwrap())
        })
    });

    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");
    let values = create_values(1000, 256);

    let mut memory = memory_store();
    let memory_keys = populate(&mut memory, &values);

    group.bench_function("memory", |b| {
        let mut i = 0;
        b.iter(|| {
            let dbkey = memory_keys[i % memory_keys.len()];
            i += 1;
            black_box(memory.get(dbkey, ValueType::ANY).unwrap())
        })
    });

    let (mut sled, _dir) = sled_store();
    let sled_keys = populate(&mut sled, &values);

    group.bench_function("sled", |b| {
        let mut i = 0;
        b.iter(|| {
            let dbkey = sled_keys[i % sled_keys.len()];
            i += 1;
            black_box(sled.get(dbkey, ValueType::ANY).unwrap())
        })
    });

    group.finish();
}

criterion_group!(benches, bench_publish, bench_replicate, bench_get);
criterion_main!(benches);
