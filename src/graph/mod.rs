//! Cost graph over the sub-domains of a Cartesian tessellation.
//!
//! One vertex per cell of the coarse grid, one directed edge per
//! face-adjacent pair (both directions are stored). Vertex weights are the
//! computation and migration costs, edge weights the communication cost.
//! Adjacency is kept in CSR form so a sub-domain's neighbor list and the
//! weight of any of its edges are constant-time lookups.

pub mod cost_model;
pub mod graph_traits;
pub mod grid;

pub use cost_model::{CostModel, SphereCost, UniformCost};
pub use graph_traits::PartitionableGraph;
pub use grid::CartGrid;

use crate::decomp_error::DecompError;
use crate::geometry::{Aabb, Boundary, Point};

/// Neutral weight of an un-configured vertex or edge.
pub const DEFAULT_COST: f64 = 1.0;

/// The atomic unit of decomposition.
#[derive(Clone, Debug, PartialEq)]
pub struct SubDomain<const D: usize> {
    pub id: usize,
    pub center: Point<D>,
    pub computation: f64,
    pub migration: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CostGraph<const D: usize> {
    grid: CartGrid<D>,
    domain: Aabb<D>,
    bc: [Boundary; D],
    spacing: [f64; D],
    vertices: Vec<SubDomain<D>>,
    /// `neighbors[offsets[i]..offsets[i + 1]]` are the neighbors of `i`.
    offsets: Vec<usize>,
    neighbors: Vec<usize>,
    communication: Vec<f64>,
}

fn check_cost(id: usize, value: f64) -> Result<f64, DecompError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(DecompError::InvalidCost { id, value })
    }
}

impl<const D: usize> CostGraph<D> {
    /// Build the graph of a Cartesian tessellation of `domain`.
    ///
    /// Each cell gets up to `2 * D` face neighbors. Periodic axes wrap; a
    /// wrap that lands on the cell itself or repeats a neighbor (axes with
    /// one or two divisions) is dropped so the adjacency stays simple.
    pub fn cartesian(
        grid: CartGrid<D>,
        domain: Aabb<D>,
        bc: [Boundary; D],
    ) -> Result<Self, DecompError> {
        if domain.is_empty() {
            return Err(DecompError::InvalidConfig(format!(
                "domain {domain:?} has no volume"
            )));
        }
        let div = grid.divisions();
        let ext = domain.extent();
        let spacing: [f64; D] = std::array::from_fn(|k| ext[k] / div[k] as f64);
        let n = grid.size();

        let mut vertices = Vec::with_capacity(n);
        let mut offsets = Vec::with_capacity(n + 1);
        let mut neighbors = Vec::with_capacity(n * 2 * D);
        offsets.push(0);

        for id in 0..n {
            let c = grid.coords(id);
            let center = std::array::from_fn(|k| domain.lo[k] + (c[k] as f64 + 0.5) * spacing[k]);
            vertices.push(SubDomain {
                id,
                center,
                computation: DEFAULT_COST,
                migration: DEFAULT_COST,
            });

            let start = neighbors.len();
            for k in 0..D {
                for step in [-1i64, 1] {
                    let mut nc: [i64; D] = std::array::from_fn(|a| c[a] as i64);
                    nc[k] += step;
                    let (wrapped, crossings) = grid.wrap(&nc);
                    if crossings[k] != 0 && !bc[k].is_periodic() {
                        continue;
                    }
                    let j = grid.lin_id(&wrapped);
                    if j == id || neighbors[start..].contains(&j) {
                        continue;
                    }
                    neighbors.push(j);
                }
            }
            offsets.push(neighbors.len());
        }

        let communication = vec![DEFAULT_COST; neighbors.len()];
        Ok(Self {
            grid,
            domain,
            bc,
            spacing,
            vertices,
            offsets,
            neighbors,
            communication,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn grid(&self) -> &CartGrid<D> {
        &self.grid
    }

    pub fn domain(&self) -> &Aabb<D> {
        &self.domain
    }

    pub fn boundary(&self) -> &[Boundary; D] {
        &self.bc
    }

    /// Extent of one sub-domain along each axis.
    pub fn spacing(&self) -> [f64; D] {
        self.spacing
    }

    pub fn n_edges(&self) -> usize {
        self.neighbors.len()
    }

    fn check_id(&self, id: usize) -> Result<(), DecompError> {
        if id < self.vertices.len() {
            Ok(())
        } else {
            Err(DecompError::UnknownSubDomain {
                id,
                len: self.vertices.len(),
            })
        }
    }

    fn edge_slot(&self, id: usize, k: usize) -> Result<usize, DecompError> {
        self.check_id(id)?;
        let count = self.offsets[id + 1] - self.offsets[id];
        if k < count {
            Ok(self.offsets[id] + k)
        } else {
            Err(DecompError::NeighborIndexOutOfRange {
                id,
                neighbor: k,
                count,
            })
        }
    }

    pub fn sub_domain(&self, id: usize) -> Result<&SubDomain<D>, DecompError> {
        self.check_id(id)?;
        Ok(&self.vertices[id])
    }

    pub fn sub_domains(&self) -> &[SubDomain<D>] {
        &self.vertices
    }

    /// Physical box covered by sub-domain `id`.
    pub fn sub_domain_box(&self, id: usize) -> Result<Aabb<D>, DecompError> {
        self.check_id(id)?;
        Ok(self.cell_box(&self.grid.coords(id)))
    }

    pub(crate) fn cell_box(&self, c: &[usize; D]) -> Aabb<D> {
        let lo: [f64; D] =
            std::array::from_fn(|k| self.domain.lo[k] + c[k] as f64 * self.spacing[k]);
        let hi: [f64; D] = std::array::from_fn(|k| {
            if c[k] + 1 == self.grid.divisions()[k] {
                self.domain.hi[k]
            } else {
                lo[k] + self.spacing[k]
            }
        });
        Aabb::new(lo, hi)
    }

    pub fn neighbor_count(&self, id: usize) -> Result<usize, DecompError> {
        self.check_id(id)?;
        Ok(self.offsets[id + 1] - self.offsets[id])
    }

    pub fn neighbor(&self, id: usize, k: usize) -> Result<usize, DecompError> {
        Ok(self.neighbors[self.edge_slot(id, k)?])
    }

    /// Neighbor ids of `id`; empty for an unknown id.
    pub fn neighbors_of(&self, id: usize) -> &[usize] {
        match self.offsets.get(id..id + 2) {
            Some(&[a, b]) => &self.neighbors[a..b],
            _ => &[],
        }
    }

    pub fn communication_costs_of(&self, id: usize) -> &[f64] {
        match self.offsets.get(id..id + 2) {
            Some(&[a, b]) => &self.communication[a..b],
            _ => &[],
        }
    }

    pub fn computation_cost(&self, id: usize) -> Result<f64, DecompError> {
        Ok(self.sub_domain(id)?.computation)
    }

    pub fn migration_cost(&self, id: usize) -> Result<f64, DecompError> {
        Ok(self.sub_domain(id)?.migration)
    }

    pub fn communication_cost(&self, id: usize, k: usize) -> Result<f64, DecompError> {
        Ok(self.communication[self.edge_slot(id, k)?])
    }

    /// Weight of the edge `a -> b`, if the two are adjacent.
    pub fn edge_weight(&self, a: usize, b: usize) -> Option<f64> {
        let pos = self.neighbors_of(a).iter().position(|&n| n == b)?;
        Some(self.communication[self.offsets[a] + pos])
    }

    pub fn set_computation_cost(&mut self, id: usize, w: f64) -> Result<(), DecompError> {
        self.check_id(id)?;
        self.vertices[id].computation = check_cost(id, w)?;
        Ok(())
    }

    pub fn set_migration_cost(&mut self, id: usize, w: f64) -> Result<(), DecompError> {
        self.check_id(id)?;
        self.vertices[id].migration = check_cost(id, w)?;
        Ok(())
    }

    pub fn set_communication_cost(
        &mut self,
        id: usize,
        k: usize,
        w: f64,
    ) -> Result<(), DecompError> {
        let slot = self.edge_slot(id, k)?;
        self.communication[slot] = check_cost(id, w)?;
        Ok(())
    }

    /// Re-weight every vertex and edge from a cost model.
    ///
    /// All costs are evaluated and validated before any is written, so a
    /// rejected value leaves the graph unchanged.
    pub fn apply_cost_model<M: CostModel<D> + ?Sized>(
        &mut self,
        model: &M,
    ) -> Result<(), DecompError> {
        let mut vertex_costs = Vec::with_capacity(self.len());
        let mut edge_costs = Vec::with_capacity(self.n_edges());
        for sd in &self.vertices {
            let (comp, mig) = model.compute_cost(sd);
            vertex_costs.push((check_cost(sd.id, comp)?, check_cost(sd.id, mig)?));
            for k in 0..self.offsets[sd.id + 1] - self.offsets[sd.id] {
                edge_costs.push(check_cost(sd.id, model.compute_comm_cost(sd, k))?);
            }
        }
        for (sd, (comp, mig)) in self.vertices.iter_mut().zip(vertex_costs) {
            sd.computation = comp;
            sd.migration = mig;
        }
        self.communication = edge_costs;
        Ok(())
    }

    /// Sub-domain containing `p`.
    ///
    /// The upper face of a non-periodic axis belongs to the last cell;
    /// periodic axes wrap `p` back into the domain first.
    pub fn locate(&self, p: &Point<D>) -> Option<usize> {
        let div = self.grid.divisions();
        let mut c = [0usize; D];
        for k in 0..D {
            let rel = (p[k] - self.domain.lo[k]) / self.spacing[k];
            if !rel.is_finite() {
                return None;
            }
            let t = rel.floor() as i64;
            let n = div[k] as i64;
            c[k] = if self.bc[k].is_periodic() {
                t.rem_euclid(n) as usize
            } else if (0..n).contains(&t) {
                t as usize
            } else if t == n && p[k] <= self.domain.hi[k] {
                (n - 1) as usize
            } else {
                return None;
            };
        }
        Some(self.grid.lin_id(&c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube(n: usize, bc: Boundary) -> CostGraph<3> {
        CostGraph::cartesian(
            CartGrid::new([n, n, n]).unwrap(),
            Aabb::new([0.0; 3], [1.0; 3]),
            [bc; 3],
        )
        .unwrap()
    }

    #[test]
    fn interior_cells_have_two_d_neighbors() {
        let g = cube(4, Boundary::NonPeriodic);
        assert_eq!(g.len(), 64);
        let interior = g.grid().lin_id(&[1, 2, 1]);
        assert_eq!(g.neighbor_count(interior).unwrap(), 6);
        assert_eq!(g.neighbor_count(0).unwrap(), 3);
        // every edge stored in both directions
        for a in 0..g.len() {
            for &b in g.neighbors_of(a) {
                assert!(g.neighbors_of(b).contains(&a));
            }
        }
    }

    #[test]
    fn periodic_cells_wrap() {
        let g = cube(4, Boundary::Periodic);
        for id in 0..g.len() {
            assert_eq!(g.neighbor_count(id).unwrap(), 6);
        }
        let far = g.grid().lin_id(&[3, 0, 0]);
        assert!(g.neighbors_of(0).contains(&far));
    }

    #[test]
    fn short_periodic_axes_stay_simple() {
        let g = CostGraph::cartesian(
            CartGrid::new([2, 1]).unwrap(),
            Aabb::new([0.0; 2], [1.0; 2]),
            [Boundary::Periodic; 2],
        )
        .unwrap();
        assert_eq!(g.neighbors_of(0), &[1]);
        assert_eq!(g.neighbors_of(1), &[0]);
    }

    #[test]
    fn cost_setters_validate() {
        let mut g = cube(2, Boundary::NonPeriodic);
        g.set_computation_cost(3, 10.0).unwrap();
        assert_eq!(g.computation_cost(3).unwrap(), 10.0);
        assert!(matches!(
            g.set_computation_cost(8, 1.0),
            Err(DecompError::UnknownSubDomain { id: 8, len: 8 })
        ));
        assert!(g.set_migration_cost(0, -1.0).is_err());
        assert!(matches!(
            g.set_communication_cost(0, 3, 1.0),
            Err(DecompError::NeighborIndexOutOfRange { .. })
        ));
        g.set_migration_cost(1, 2.5).unwrap();
        assert_eq!(g.migration_cost(1).unwrap(), 2.5);
        g.set_communication_cost(0, 0, 4.0).unwrap();
        assert_eq!(g.communication_cost(0, 0).unwrap(), 4.0);
        let n = g.neighbor(0, 0).unwrap();
        assert_eq!(g.edge_weight(0, n), Some(4.0));
        // asymmetric weights are allowed
        assert_eq!(g.edge_weight(n, 0), Some(DEFAULT_COST));
    }

    #[test]
    fn locate_points() {
        let g = cube(4, Boundary::NonPeriodic);
        assert_eq!(g.locate(&[0.1, 0.1, 0.1]), Some(0));
        assert_eq!(g.locate(&[1.0, 1.0, 1.0]), Some(63));
        assert_eq!(g.locate(&[1.1, 0.0, 0.0]), None);
        let p = cube(4, Boundary::Periodic);
        assert_eq!(p.locate(&[1.1, 0.0, 0.0]), Some(0));
        assert_eq!(p.locate(&[-0.1, 0.0, 0.0]), Some(3));
    }

    #[test]
    fn boxes_tile_the_domain() {
        let g = cube(3, Boundary::NonPeriodic);
        let vol: f64 = (0..g.len()).map(|i| g.sub_domain_box(i).unwrap().volume()).sum();
        assert!((vol - 1.0).abs() < 1e-12);
        let b = g.sub_domain_box(g.len() - 1).unwrap();
        assert_eq!(b.hi, [1.0; 3]);
    }
}
