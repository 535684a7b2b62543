mod util;
use util::*;

use cart_decomp::prelude::*;

fn cube(n: usize, side: f64) -> DecompositionConfig<3> {
    DecompositionConfig::new(Aabb::new([0.0; 3], [side; 3]), [n; 3]).on_test()
}

fn check_valid(a: &Assignment, n_sub_domains: usize, n_parts: usize) {
    assert_eq!(a.len(), n_sub_domains);
    assert_eq!(a.n_parts(), n_parts);
    let sizes = a.part_sizes();
    assert!(sizes.iter().all(|&s| s >= 1), "empty part in {sizes:?}");
    assert_eq!(sizes.iter().sum::<usize>(), n_sub_domains);
}

#[test]
fn uniform_then_weighted_cube_on_three_ranks() {
    let out = on_ranks(3, |comm| {
        let cfg = cube(8, 1.0);
        assert_eq!(cfg.imbalance_tolerance, 0.05);
        let mut dec = CartDecomposition::new(cfg, comm).unwrap();
        dec.distribute().unwrap();
        assert_eq!(dec.ndec(), 1);
        let uniform = dec.unbalance().unwrap();
        assert!(uniform >= 0.0 && uniform < 0.03, "uniform unbalance {uniform}");
        let first = dec.assignment().unwrap().clone();
        check_valid(&first, 512, 3);

        // five heavy sub-domains spread through the id range
        let b = 512 / 5;
        for id in [0, b, 2 * b, 3 * b, 4 * b] {
            dec.set_computation_cost(id, 10.0).unwrap();
        }
        dec.distribute().unwrap();
        assert_eq!(dec.ndec(), 2);
        let weighted = dec.unbalance().unwrap();
        assert!(weighted < 0.06, "weighted unbalance {weighted}");
        let second = dec.assignment().unwrap().clone();
        check_valid(&second, 512, 3);
        (first, second, uniform, weighted)
    });
    assert_all_equal(&out);
}

#[test]
fn moving_sphere_is_refined_ten_times() {
    let out = on_ranks(3, |comm| {
        let cfg = DecompositionConfig::new(Aabb::new([0.0; 3], [10.0; 3]), [10; 3]).on_test();
        let mut dec = CartDecomposition::new(cfg, comm).unwrap();
        dec.distribute().unwrap();

        let mut sphere = SphereCost::new([2.0; 3], 2.0, 5.0, 1.0);
        let mut refines = 0;
        let mut history = Vec::new();
        for step in 0..100 {
            if step % 10 == 0 {
                dec.refine_with(&sphere).unwrap();
                refines += 1;
                let snap = dec.get_decomposition().unwrap();
                assert_eq!(snap.version, dec.ndec());
                check_valid(&snap.assignment, 1000, 3);
                let u = dec.unbalance().unwrap();
                assert!(u < 0.1, "step {step}: unbalance {u}");
                history.push(snap.assignment.owners().to_vec());
            }
            sphere.shift(&[0.05; 3]);
        }
        assert_eq!(refines, 10);
        assert_eq!(dec.ndec(), 11);
        history
    });
    assert_all_equal(&out);
}

#[test]
fn distributed_authority_matches_across_ranks() {
    let out = on_ranks(4, |comm| {
        let cfg = DecompositionConfig::new(Aabb::new([0.0; 2], [1.0; 2]), [12, 12])
            .with_strategy(StrategyKind::Distributed)
            .on_test();
        let mut dec = CartDecomposition::new(cfg, comm).unwrap();
        dec.distribute().unwrap();
        check_valid(dec.assignment().unwrap(), 144, 4);
        assert!(dec.unbalance().unwrap() < 0.05);
        let fresh = dec.assignment().unwrap().clone();

        for id in 0..12 {
            dec.set_computation_cost(id, 3.0).unwrap();
        }
        dec.refine().unwrap();
        assert_eq!(dec.ndec(), 2);
        check_valid(dec.assignment().unwrap(), 144, 4);
        assert!(dec.unbalance().unwrap() < 0.1);
        (fresh, dec.assignment().unwrap().clone())
    });
    assert_all_equal(&out);
}

#[test]
fn space_filling_curves_give_equal_counts() {
    for kind in [StrategyKind::Hilbert, StrategyKind::Morton] {
        let out = on_ranks(3, |comm| {
            let cfg = DecompositionConfig::new(Aabb::new([0.0; 2], [1.0; 2]), [6, 6])
                .with_strategy(kind);
            let mut dec = CartDecomposition::new(cfg, comm).unwrap();
            dec.distribute().unwrap();
            assert_eq!(dec.strategy_kind(), kind);
            assert_eq!(dec.n_owned_sub_domains(), 12);
            assert_eq!(dec.unbalance().unwrap(), 0.0);

            // weights are not considered: the curve cut stays put
            dec.set_computation_cost(0, 50.0).unwrap();
            let before = dec.assignment().unwrap().clone();
            dec.refine().unwrap();
            assert_eq!(dec.assignment().unwrap(), &before);
            assert!(dec.unbalance().unwrap() > 0.0);
            before
        });
        assert_all_equal(&out);
    }
}

#[test]
fn part_count_override_must_match_for_distributed() {
    let errs = on_ranks(2, |comm| {
        let cfg = DecompositionConfig::new(Aabb::new([0.0; 2], [1.0; 2]), [4, 4])
            .with_strategy(StrategyKind::Distributed)
            .with_parts(3);
        let mut dec = CartDecomposition::new(cfg, comm).unwrap();
        let err = dec.distribute().unwrap_err();
        assert!(dec.get_decomposition().is_none());
        err
    });
    for e in errs {
        assert_eq!(
            e,
            DecompError::PartCountMismatch {
                parts: 3,
                processes: 2
            }
        );
    }
}

#[test]
fn fewer_sub_domains_than_ranks_fails_everywhere() {
    let out = on_ranks(3, |comm| {
        let cfg = DecompositionConfig::new(Aabb::new([0.0; 2], [1.0; 2]), [2, 1])
            .with_strategy(StrategyKind::Distributed)
            .on_test();
        let mut dec = CartDecomposition::new(cfg, comm).unwrap();
        let res = dec.distribute();
        assert_eq!(dec.ndec(), 0);
        res
    });
    assert_eq!(out.len(), 3);
    for res in out {
        assert_eq!(res, Err(DecompError::EmptyLocalRange(0)));
    }
}

#[test]
fn every_rank_sees_its_points_as_local() {
    let pts = cloud::<3>(200, 0.0, 1.0, 7);
    let out = on_ranks(3, |comm| {
        let mut dec = CartDecomposition::new(cube(4, 1.0), comm).unwrap();
        dec.distribute().unwrap();
        pts.iter().map(|p| dec.is_local(p)).collect::<Vec<_>>()
    });
    for i in 0..pts.len() {
        let owners = out.iter().filter(|local| local[i]).count();
        assert_eq!(owners, 1, "point {i} is local on {owners} ranks");
    }
}
