#![allow(dead_code)]
use cart_decomp::algs::communicator::LocalComm;
use cart_decomp::geometry::Point;
use cart_decomp::ghost::ParticleSet;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Run `f` once per in-process rank, each on its own thread; results come
/// back in rank order.
pub fn on_ranks<T: Send>(n: usize, f: impl Fn(LocalComm) -> T + Sync) -> Vec<T> {
    let comms = LocalComm::world(n);
    std::thread::scope(|s| {
        let f = &f;
        let handles: Vec<_> = comms.into_iter().map(|c| s.spawn(move || f(c))).collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

/// `n` uniform points in `[lo, hi)^D` from a fixed seed.
pub fn cloud<const D: usize>(n: usize, lo: f64, hi: f64, seed: u64) -> Vec<Point<D>> {
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..n)
        .map(|_| std::array::from_fn(|_| rng.gen_range(lo..hi)))
        .collect()
}

/// Particles of `cloud` for which `keep` holds, valued by their index in
/// the cloud.
pub fn particles<const D: usize>(
    cloud: &[Point<D>],
    keep: impl Fn(&Point<D>) -> bool,
) -> ParticleSet<D, f64> {
    let mut ps = ParticleSet::new();
    for (i, p) in cloud.iter().enumerate() {
        if keep(p) {
            ps.push(*p, i as f64);
        }
    }
    ps
}

/// Assert every rank computed the same value.
pub fn assert_all_equal<T: PartialEq + std::fmt::Debug>(per_rank: &[T]) {
    for (r, v) in per_rank.iter().enumerate().skip(1) {
        assert_eq!(v, &per_rank[0], "rank {r} disagrees with rank 0");
    }
}
