#![cfg(all(
    feature = "criterion-bench",
    feature = "memory-store",
    feature = "memory-cache"
))]

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::sync::Arc;
use std::time::Duration;
use tenant_authz::{
    MemoryCache, MemoryStore, PermissionCatalog, Purpose, RoleName, SystemClock, UserId,
    VerificationTokenStore,
};
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

fn setup_catalog(rt: &Runtime, resources: usize) -> PermissionCatalog<MemoryStore> {
    let catalog = PermissionCatalog::new(Arc::new(MemoryStore::new()));
    let mut spec: Vec<(String, String)> = (0..resources)
        .map(|i| (format!("reader_{i}"), format!("resource_{i}:read,resource_{i}:write")))
        .collect();
    spec.push(("admin".to_string(), "all:all".to_string()));
    spec.push(("auditor".to_string(), "all:read".to_string()));
    rt.block_on(catalog.provision(spec)).unwrap();
    catalog
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");
    group.sample_size(30);
    group.throughput(Throughput::Elements(1));

    let rt = runtime();
    for resources in [8_usize, 64, 512] {
        let catalog = setup_catalog(&rt, resources);
        let exact = RoleName::try_from("reader_0").unwrap();
        let admin = RoleName::try_from("admin").unwrap();
        let auditor = RoleName::try_from("auditor").unwrap();

        group.bench_with_input(BenchmarkId::new("exact", resources), &resources, |b, _| {
            b.iter(|| black_box(rt.block_on(catalog.resolve(black_box(&exact))).unwrap()))
        });
        group.bench_with_input(BenchmarkId::new("all_all", resources), &resources, |b, _| {
            b.iter(|| black_box(rt.block_on(catalog.resolve(black_box(&admin))).unwrap()))
        });
        group.bench_with_input(BenchmarkId::new("all_read", resources), &resources, |b, _| {
            b.iter(|| black_box(rt.block_on(catalog.resolve(black_box(&auditor))).unwrap()))
        });
    }

    group.finish();
}

fn bench_token_lifecycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("verification_token");
    group.sample_size(30);
    group.throughput(Throughput::Elements(1));

    let rt = runtime();
    let tokens = VerificationTokenStore::new(
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryCache::new(4096)),
        Arc::new(SystemClock),
    );
    let user = UserId::generate();
    let ttl = Duration::from_secs(3600);

    group.bench_function("issue_consume", |b| {
        b.iter(|| {
            rt.block_on(async {
                let token = tokens
                    .issue(user, Purpose::ConfirmEmail, "", ttl)
                    .await
                    .unwrap();
                black_box(tokens.consume(&token).await.unwrap())
            })
        })
    });

    let live = rt
        .block_on(tokens.issue(user, Purpose::ConfirmEmail, "", ttl))
        .unwrap();
    group.bench_function("peek_cached", |b| {
        b.iter(|| black_box(rt.block_on(tokens.peek(black_box(&live))).unwrap()))
    });

    group.finish();
}

criterion_group!(benches, bench_resolve, bench_token_lifecycle);
criterion_main!(benches);
