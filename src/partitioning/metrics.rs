//! Partition quality metrics.
//!
//! Used for logging after every solve and in tests. All functions take the
//! raw owner vector so they work on candidate partitions before they are
//! wrapped in an [`Assignment`](super::Assignment).

use rayon::prelude::*;

use crate::graph::PartitionableGraph;

/// Communication weight of all edges whose endpoints lie in different parts.
///
/// Each undirected edge counts once, as the mean of its two directed weights.
pub fn edge_cut<G: PartitionableGraph>(g: &G, owners: &[usize]) -> f64 {
    g.edges()
        .filter(|&(u, v, _)| owners[u] != owners[v])
        .map(|(_, _, w)| w)
        .sum::<f64>()
        / 2.0
}

/// Sum of computation weights per part.
pub fn part_loads<G: PartitionableGraph>(g: &G, owners: &[usize], n_parts: usize) -> Vec<f64> {
    let mut loads = vec![0.0; n_parts];
    for (v, &p) in owners.iter().enumerate() {
        loads[p] += g.vertex_weight(v);
    }
    loads
}

/// `(max - avg) / avg` of per-part loads; zero when there is no load.
pub fn unbalance(loads: &[f64]) -> f64 {
    if loads.is_empty() {
        return 0.0;
    }
    let total: f64 = loads.iter().sum();
    let avg = total / loads.len() as f64;
    if avg <= 0.0 {
        return 0.0;
    }
    let max = loads.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    ((max - avg) / avg).max(0.0)
}

/// Migration weight of the vertices whose owner differs between `old` and `new`.
pub fn migrated_volume<G: PartitionableGraph>(g: &G, old: &[usize], new: &[usize]) -> f64 {
    old.par_iter()
        .zip(new.par_iter())
        .enumerate()
        .filter(|(_, (a, b))| a != b)
        .map(|(v, _)| g.migration_weight(v))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partitioning::CsrGraph;

    /// 4-cycle 0-1-2-3-0 with unit weights.
    fn cycle() -> CsrGraph {
        CsrGraph {
            xadj: vec![0, 2, 4, 6, 8],
            adjncy: vec![1, 3, 0, 2, 1, 3, 2, 0],
            adjwgt: vec![1.0; 8],
            vwgt: vec![1.0, 2.0, 3.0, 4.0],
            vsize: vec![1.0; 4],
        }
    }

    #[test]
    fn edge_cut_cycle() {
        let g = cycle();
        assert_eq!(edge_cut(&g, &[0, 0, 1, 1]), 2.0);
        assert_eq!(edge_cut(&g, &[0, 1, 0, 1]), 4.0);
        assert_eq!(edge_cut(&g, &[0, 0, 0, 0]), 0.0);
    }

    #[test]
    fn loads_and_unbalance() {
        let g = cycle();
        let loads = part_loads(&g, &[0, 0, 1, 1], 2);
        assert_eq!(loads, vec![3.0, 7.0]);
        assert!((unbalance(&loads) - 0.4).abs() < 1e-12);
        assert_eq!(unbalance(&[2.0, 2.0]), 0.0);
        assert_eq!(unbalance(&[0.0, 0.0]), 0.0);
    }

    #[test]
    fn migration_counts_moved_vertices() {
        let g = cycle();
        assert_eq!(migrated_volume(&g, &[0, 0, 1, 1], &[0, 1, 1, 0]), 2.0);
    }
}
