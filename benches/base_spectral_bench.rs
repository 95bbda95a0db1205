use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};
use qgcn::dataset::InteractionSet;
use qgcn::graph::GraphNormaliser;
use qgcn::spectral::SpectralOperator;
use rand::prelude::*;
use std::hint::black_box;
use std::time::Duration;

/// Random bipartite interactions: every user gets `per_user` distinct items.
fn generate_interactions(n_users: usize, n_items: usize, per_user: usize, seed: u64) -> InteractionSet {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut pairs = Vec::with_capacity(n_users * per_user);
    for u in 0..n_users {
        for _ in 0..per_user {
            pairs.push((u, rng.random_range(0..n_items)));
        }
    }
    InteractionSet::new(n_users, n_items, pairs).unwrap()
}

pub fn criterion_benchmark(c: &mut Criterion) {
    // Group 1: sparse normalisation only
    let mut group_adj = c.benchmark_group("normalise_adjacency");
    group_adj.warm_up_time(Duration::from_millis(500));
    group_adj.measurement_time(Duration::from_secs(3));
    group_adj.sample_size(20);

    for &n_users in &[100, 500, 2000] {
        let set = generate_interactions(n_users, n_users / 2, 8, 42);
        group_adj.bench_with_input(BenchmarkId::new("users", n_users), &set, |b, set| {
            b.iter(|| black_box(GraphNormaliser::build(set).unwrap()))
        });
    }
    group_adj.finish();

    // Group 2: eigendecomposition + Q0, cubic in node count
    let mut group_q0 = c.benchmark_group("spectral_operator");
    group_q0.warm_up_time(Duration::from_millis(500));
    group_q0.measurement_time(Duration::from_secs(5));
    group_q0.sample_size(10);

    for &n_users in &[20, 60, 120] {
        let set = generate_interactions(n_users, n_users / 2, 4, 7);
        group_q0.bench_function(BenchmarkId::new("nodes", n_users + n_users / 2), |b| {
            b.iter_batched(
                || GraphNormaliser::build(&set).unwrap(),
                |adj| black_box(SpectralOperator::build(&adj).unwrap()),
                BatchSize::SmallInput,
            )
        });
    }
    group_q0.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
