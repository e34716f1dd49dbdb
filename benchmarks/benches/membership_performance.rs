use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::collections::HashMap;
use swallow_coordinator::{diff_snapshots, MembershipSnapshot, MembershipWatcher};
use swallow_core::NodeSpec;
use swallow_session::{CoordinationSession, CreateMode, MemoryCoordinator};

fn snapshot(count: usize, version: u8) -> HashMap<String, Bytes> {
    (0..count)
        .map(|i| {
            let id = format!("worker-{}", i);
            let node = NodeSpec::new(id.clone(), "ingest")
                .with_quota("cpu", 8)
                .with_version(version);
            (id, Bytes::from(node.to_bytes().unwrap()))
        })
        .collect()
}

fn benchmark_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff_snapshots");

    for size in [10, 100, 1000] {
        let old = snapshot(size, 0);
        let unchanged = old.clone();
        let mut churned = snapshot(size, 0);
        // a tenth of the workers leave, as many join, and a tenth rewrite
        for i in 0..size / 10 {
            churned.remove(&format!("worker-{}", i));
            let id = format!("worker-{}", size + i);
            churned.insert(
                id.clone(),
                Bytes::from(NodeSpec::new(id, "ingest").to_bytes().unwrap()),
            );
        }
        for (id, raw) in snapshot(size / 5, 1).into_iter().skip(size / 10) {
            churned.insert(id, raw);
        }

        group.bench_with_input(BenchmarkId::new("unchanged", size), &size, |b, _| {
            b.iter(|| diff_snapshots(black_box(&old), black_box(&unchanged)))
        });
        group.bench_with_input(BenchmarkId::new("churned", size), &size, |b, _| {
            b.iter(|| diff_snapshots(black_box(&old), black_box(&churned)))
        });
    }

    group.finish();
}

fn benchmark_scan(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("membership_scan");

    for size in [10, 100] {
        let service = MemoryCoordinator::new(format!("bench-scan-{}", size));
        let session = service.connect();
        runtime.block_on(async {
            session.create_if_absent("/nodes", b"").await.unwrap();
            for (id, raw) in snapshot(size, 0) {
                session
                    .create(&format!("/nodes/{}", id), &raw, CreateMode::Ephemeral)
                    .await
                    .unwrap();
            }
        });
        let watcher = MembershipWatcher::new("/nodes");

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                runtime.block_on(async {
                    let mut snapshot = MembershipSnapshot::new();
                    watcher.scan(session.as_ref(), &mut snapshot).await.unwrap()
                })
            })
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_diff, benchmark_scan);
criterion_main!(benches);
