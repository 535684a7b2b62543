// Graph trait abstraction for partitioning
use rayon::prelude::*;

use super::CostGraph;

/// Weighted graph view consumed by the partitioners, metrics and refinement.
///
/// Vertices are `0..n_vertices()`. All methods are read-only and thread-safe.
pub trait PartitionableGraph: Sync {
    fn n_vertices(&self) -> usize;

    /// Neighbors of `v`; parallel to [`PartitionableGraph::edge_weights`].
    fn neighbors(&self, v: usize) -> &[usize];

    fn edge_weights(&self, v: usize) -> &[f64];

    /// Computation weight of `v`.
    fn vertex_weight(&self, v: usize) -> f64;

    /// Cost of moving `v` to another part.
    fn migration_weight(&self, v: usize) -> f64;

    fn degree(&self, v: usize) -> usize {
        self.neighbors(v).len()
    }

    /// Parallel iterator over all directed edges `(u, v, w)`.
    fn edges(&self) -> impl ParallelIterator<Item = (usize, usize, f64)> + '_ {
        (0..self.n_vertices()).into_par_iter().flat_map_iter(move |u| {
            self.neighbors(u)
                .iter()
                .zip(self.edge_weights(u))
                .map(move |(&v, &w)| (u, v, w))
        })
    }

    fn total_vertex_weight(&self) -> f64 {
        (0..self.n_vertices())
            .into_par_iter()
            .map(|v| self.vertex_weight(v))
            .sum()
    }
}

impl<const D: usize> PartitionableGraph for CostGraph<D> {
    fn n_vertices(&self) -> usize {
        self.len()
    }
    fn neighbors(&self, v: usize) -> &[usize] {
        self.neighbors_of(v)
    }
    fn edge_weights(&self, v: usize) -> &[f64] {
        self.communication_costs_of(v)
    }
    fn vertex_weight(&self, v: usize) -> f64 {
        self.sub_domains()[v].computation
    }
    fn migration_weight(&self, v: usize) -> f64 {
        self.sub_domains()[v].migration
    }
}
