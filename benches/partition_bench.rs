use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use cart_decomp::algs::communicator::NoComm;
use cart_decomp::geometry::{Aabb, Boundary};
use cart_decomp::ghost::build_ghost_layout;
use cart_decomp::graph::{CartGrid, CostGraph};
use cart_decomp::partitioning::{
    CurveKind, MetisPartitioner, Partitioner, PartitionerConfig, SfcPartitioner,
};

fn cube(n: usize, seed: u64) -> CostGraph<3> {
    let mut g = CostGraph::cartesian(
        CartGrid::new([n; 3]).unwrap(),
        Aabb::new([0.0; 3], [1.0; 3]),
        [Boundary::NonPeriodic; 3],
    )
    .unwrap();
    let mut rng = SmallRng::seed_from_u64(seed);
    for id in 0..g.len() {
        g.set_computation_cost(id, rng.gen_range(1.0..4.0)).unwrap();
    }
    g
}

fn cfg(n_parts: usize) -> PartitionerConfig {
    PartitionerConfig {
        n_parts,
        rng_seed: 42,
        ..Default::default()
    }
}

fn bench_partition(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition");

    for &n in &[8usize, 16, 24] {
        let graph = cube(n, 42);

        group.bench_with_input(BenchmarkId::new("metis_decompose", n), &graph, |b, g| {
            let mut p = MetisPartitioner::new(cfg(8));
            b.iter(|| p.decompose(g, &NoComm).unwrap());
        });

        group.bench_with_input(BenchmarkId::new("metis_refine", n), &graph, |b, g| {
            let mut p = MetisPartitioner::new(cfg(8));
            let previous = p.decompose(g, &NoComm).unwrap();
            let mut shifted = g.clone();
            for id in 0..shifted.len() / 10 {
                shifted.set_computation_cost(id, 10.0).unwrap();
            }
            b.iter(|| p.refine(&shifted, &previous, &NoComm).unwrap());
        });

        group.bench_with_input(BenchmarkId::new("hilbert", n), &graph, |b, g| {
            let mut p = SfcPartitioner::new(CurveKind::Hilbert, cfg(8));
            b.iter(|| p.decompose(g, &NoComm).unwrap());
        });
    }

    group.finish();
}

fn bench_ghosts(c: &mut Criterion) {
    let mut group = c.benchmark_group("ghost_layout");

    for &n in &[8usize, 16] {
        let graph = cube(n, 7);
        let a = MetisPartitioner::new(cfg(8)).decompose(&graph, &NoComm).unwrap();
        group.bench_with_input(BenchmarkId::new("build", n), &(graph, a), |b, (g, a)| {
            b.iter(|| build_ghost_layout(g, a, 0, &[0.05; 3], 1).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_partition, bench_ghosts);
criterion_main!(benches);
