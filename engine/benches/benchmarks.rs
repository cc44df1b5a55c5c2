//! Performance benchmarks for packsync-engine

use std::collections::HashSet;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use packsync_engine::{
    combined_hash, CollectionId, CollectionInfo, CollectionItem, FetchedItems, Namespace,
    Reconciler, Reconciliation, RemoteCollections, RemoteOutcome,
};
use serde_json::json;

fn infos(range: std::ops::Range<i64>, salt: i32) -> Vec<CollectionInfo> {
    range
        .map(|n| {
            CollectionInfo::new(
                CollectionId::new(Namespace::Stickers, n),
                n * 31,
                (n as i32).wrapping_mul(7919) ^ salt,
            )
            .with_title(format!("Pack {}", n))
        })
        .collect()
}

fn bench_hashing(c: &mut Criterion) {
    let mut group = c.benchmark_group("hashing");

    for size in [10, 100, 1000].iter() {
        let list = infos(0..*size, 0);
        group.bench_with_input(BenchmarkId::new("combined_hash", size), &list, |b, list| {
            b.iter(|| combined_hash(black_box(list)))
        });
    }

    group.finish();
}

fn bench_planning(c: &mut Criterion) {
    let mut group = c.benchmark_group("planning");
    let reconciler = Reconciler::new(Namespace::Stickers);

    for size in [10i64, 100, 500].iter() {
        let size = *size;

        // No local edit: remote list adopted, a quarter of hashes changed.
        let local = infos(0..size, 0);
        let mut remote = infos(size / 4..size + size / 4, 0);
        for info in remote.iter_mut().step_by(4) {
            info.hash ^= 1;
        }
        let order: Vec<_> = local.iter().map(|info| info.id).collect();
        group.bench_with_input(BenchmarkId::new("fast_forward", size), &size, |b, _| {
            b.iter(|| {
                reconciler.plan(
                    black_box(&order),
                    black_box(&local),
                    RemoteCollections::Fresh(remote.clone()),
                )
            })
        });

        // Local and remote both moved since the snapshot.
        let initial: Vec<_> = infos(0..size, 0).iter().map(|info| info.id).collect();
        let mut edited = infos(size / 2..size + size / 2, 0);
        edited.reverse();
        group.bench_with_input(BenchmarkId::new("three_way", size), &size, |b, _| {
            b.iter(|| {
                reconciler.plan(
                    black_box(&initial),
                    black_box(&edited),
                    RemoteCollections::Fresh(remote.clone()),
                )
            })
        });
    }

    group.finish();
}

fn bench_write_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_set");
    let reconciler = Reconciler::new(Namespace::Stickers);

    for size in [10i64, 100, 500].iter() {
        let size = *size;
        let local = infos(0..size, 0);
        let remote = infos(0..size, 1);
        let order: Vec<_> = local.iter().map(|info| info.id).collect();

        let plan = match reconciler.plan(&order, &local, RemoteCollections::Fresh(remote)) {
            Ok(Reconciliation::Apply(plan)) => plan,
            _ => unreachable!(),
        };
        let fetched: Vec<_> = plan
            .refresh
            .iter()
            .map(|info| {
                FetchedItems::loaded(
                    info.id,
                    (0..20)
                        .map(|i| CollectionItem::new(i, info.id.id * 100 + i64::from(i), json!({"i": i})))
                        .collect(),
                )
            })
            .collect();

        group.bench_with_input(BenchmarkId::new("into_write_set", size), &size, |b, _| {
            b.iter(|| {
                plan.clone().into_write_set(RemoteOutcome {
                    archived: HashSet::new(),
                    fetched: black_box(fetched.clone()),
                })
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_hashing, bench_planning, bench_write_set);
criterion_main!(benches);
