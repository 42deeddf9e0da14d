use criterion::Criterion;
use criterion::{criterion_group, criterion_main};

use chanrpc::tokio::{runtime::Builder, time::Instant};

use quorumkv::client::Clerk;
use quorumkv::config::ReplicaConfig;
use quorumkv::tests::kv_cluster;

fn bench_put(c: &mut Criterion) {
    env_logger::init();
    const N: usize = 5;
    const NQUERIES: u32 = 1000;

    c.bench_function(&format!("{} put ops with {} replicas", NQUERIES, N), |b| {
        b.iter_custom(|iters| {
            let rt = Builder::new_multi_thread()
                .worker_threads(8)
                .enable_all()
                .build()
                .unwrap();

            rt.block_on(async {
                let (clients, _sim, _servers, _net) =
                    kv_cluster(N, ReplicaConfig::default()).await;
                let ck = Clerk::new(clients);

                let start = Instant::now();
                for _ in 0..iters {
                    for i in 0..NQUERIES {
                        ck.put(&format!("key-{}", i), "value").await;
                    }
                }
                start.elapsed()
            })
        });
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = bench_put,
);
criterion_main!(benches);
