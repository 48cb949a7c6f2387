//! Performance benchmarks for range arithmetic and allocation

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ippool_manager::address::merge_ranges;
use ippool_manager::{
    AddressSet, AllocationEngine, CallContext, InMemoryPoolStore, IpPool, IpPoolSpec, IpVersion,
    OwnerReference, StaticReservedAddresses, Subnet,
};
use std::sync::Arc;
use uuid::Uuid;

/// Every other address of 10.0.0.0/8, as `count` single-address ranges
fn fragmented_v4(count: u32) -> Vec<String> {
    (0..count)
        .map(|i| {
            let n = 0x0a00_0000u32 + i * 2;
            std::net::Ipv4Addr::from(n).to_string()
        })
        .collect()
}

/// Benchmark set arithmetic on fragmented sets
fn bench_set_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("address_set_ops");

    for count in [16u32, 256, 4096].iter() {
        let a = AddressSet::parse(IpVersion::V4, &fragmented_v4(*count)).unwrap();
        let b = AddressSet::parse(IpVersion::V4, &["10.0.0.0-10.0.63.255"]).unwrap();

        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::new("union", count), count, |bench, _| {
            bench.iter(|| black_box(a.union(&b).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("difference", count), count, |bench, _| {
            bench.iter(|| black_box(a.difference(&b).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("intersection", count), count, |bench, _| {
            bench.iter(|| black_box(a.intersection(&b).unwrap()));
        });
    }

    group.finish();
}

/// Benchmark merging user supplied range text
fn bench_merge_ranges(c: &mut Criterion) {
    let texts = fragmented_v4(1024);

    c.bench_function("merge_ranges_1024", |b| {
        b.iter(|| black_box(merge_ranges(IpVersion::V4, &texts).unwrap()));
    });
}

/// Benchmark Subnet construction, IPv6 ranges never enumerated
fn bench_subnet_construction(c: &mut Criterion) {
    let mut group = c.benchmark_group("subnet_new");

    let include = ["fd00::1-fd00::ffff:ffff:ffff"];
    let exclude: Vec<String> = (1..=64).map(|i| format!("fd00::{:x}:0", i)).collect();
    group.bench_function("ipv6_wide", |b| {
        b.iter(|| black_box(Subnet::new("fd00::/64", &include, &exclude).unwrap()));
    });

    let include: Vec<String> = (0..64)
        .map(|i| format!("10.0.{}.1-10.0.{}.200", i, i))
        .collect();
    let none: &[&str] = &[];
    group.bench_function("ipv4_many_ranges", |b| {
        b.iter(|| black_box(Subnet::new("10.0.0.0/16", &include, none).unwrap()));
    });

    group.finish();
}

/// Benchmark first-fit allocation against the in-memory store
fn bench_allocate(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("allocate_release_cycle", |b| {
        let store = Arc::new(InMemoryPoolStore::new());
        store.insert(IpPool::new(
            "bench",
            IpPoolSpec::new(IpVersion::V4, "10.0.0.0/16", &["10.0.0.1-10.0.255.254"]),
        ));
        let engine = AllocationEngine::new(store, Arc::new(StaticReservedAddresses::new()));
        let ctx = CallContext::background();
        let owner = OwnerReference::pod("bench", "pod", Uuid::new_v4());

        b.iter(|| {
            runtime.block_on(async {
                let allocated = engine.allocate(&ctx, "bench", "eth0", &owner).await.unwrap();
                engine
                    .release(
                        &ctx,
                        "bench",
                        &[ippool_manager::IpAndOwnerKey::new(allocated.address, owner.key())],
                    )
                    .await
                    .unwrap();
                black_box(allocated)
            })
        });
    });
}

criterion_group!(
    benches,
    bench_set_operations,
    bench_merge_ranges,
    bench_subnet_construction,
    bench_allocate,
);
criterion_main!(benches);
