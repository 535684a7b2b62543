use cart_decomp::algs::communicator::NoComm;
use cart_decomp::geometry::{Aabb, Boundary};
use cart_decomp::ghost::build_ghost_layout;
use cart_decomp::graph::{CartGrid, CostGraph};
use cart_decomp::partitioning::{Assignment, StrategyKind, metrics};
use cart_decomp::prelude::{CartDecomposition, DecompositionConfig};
use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;

fn strategy() -> impl Strategy<Value = StrategyKind> {
    prop_oneof![
        Just(StrategyKind::Metis),
        Just(StrategyKind::Hilbert),
        Just(StrategyKind::Morton),
    ]
}

/// Surjective random owner vector.
fn shuffled_owners(n: usize, k: usize, seed: u64) -> Vec<usize> {
    let mut owners: Vec<usize> = (0..n).map(|i| i % k).collect();
    owners.shuffle(&mut SmallRng::seed_from_u64(seed));
    owners
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn assignment_is_total_and_surjective(
        nx in 1usize..7,
        ny in 1usize..7,
        k in 1usize..5,
        kind in strategy(),
    ) {
        let n = nx * ny;
        prop_assume!(k <= n);
        let cfg = DecompositionConfig::new(Aabb::new([0.0; 2], [1.0; 2]), [nx, ny])
            .with_strategy(kind)
            .with_parts(k)
            .on_test();
        let mut dec = CartDecomposition::new(cfg, NoComm).unwrap();
        dec.distribute().unwrap();
        let a = dec.assignment().unwrap();
        prop_assert_eq!(a.len(), n);
        prop_assert!(a.part_sizes().iter().all(|&s| s >= 1));
        for id in 0..n {
            let center = dec.sub_domain_center(id).unwrap();
            prop_assert_eq!(dec.owner_of_point(&center), a.owner(id));
        }
        prop_assert!(dec.unbalance().unwrap() >= 0.0);
    }

    #[test]
    fn ghost_layouts_are_stable_and_paired(
        nx in 1usize..6,
        ny in 1usize..6,
        k in 1usize..4,
        periodic in any::<(bool, bool)>(),
        wx in 0.0f64..0.6,
        wy in 0.0f64..0.6,
        seed in any::<u64>(),
    ) {
        let n = nx * ny;
        prop_assume!(k <= n);
        let bc = |p: bool| if p { Boundary::Periodic } else { Boundary::NonPeriodic };
        let g = CostGraph::cartesian(
            CartGrid::new([nx, ny]).unwrap(),
            Aabb::new([0.0; 2], [1.0; 2]),
            [bc(periodic.0), bc(periodic.1)],
        )
        .unwrap();
        let a = Assignment::new(shuffled_owners(n, k, seed), k).unwrap();
        let width = [wx, wy];
        let layouts: Vec<_> = (0..k)
            .map(|r| build_ghost_layout(&g, &a, r, &width, 1).unwrap())
            .collect();
        for (r, l) in layouts.iter().enumerate() {
            prop_assert_eq!(l, &build_ghost_layout(&g, &a, r, &width, 1).unwrap());
        }
        for p in 0..k {
            for q in 0..k {
                let ext: Vec<_> = layouts[p]
                    .external_from(q)
                    .map(|(_, b)| (b.sub_domain, b.shift, b.near))
                    .collect();
                let int: Vec<_> = layouts[q]
                    .internal_to(p)
                    .map(|(_, b)| (b.sub_domain, b.shift, b.near))
                    .collect();
                prop_assert_eq!(ext, int);
            }
        }
    }

    #[test]
    fn unbalance_is_never_negative(loads in proptest::collection::vec(0.0f64..100.0, 1..16)) {
        let u = metrics::unbalance(&loads);
        prop_assert!(u >= 0.0);
        prop_assert!(u.is_finite());
    }
}
