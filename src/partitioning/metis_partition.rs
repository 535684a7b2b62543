//! Single-authority k-way partitioning through METIS.
//!
//! Every rank holds the complete cost graph and runs the same seeded solve,
//! so all ranks arrive at the same assignment without communicating. The
//! solver result is post-processed by the balance pass in [`super::refine`]
//! and checked for empty parts before it is returned.

use log::{debug, warn};

use super::csr::{SolverArrays, to_solver};
use super::error::PartitionError;
use super::{Assignment, Partitioner, PartitionerConfig, fill_empty_parts, metrics, refine};
use crate::algs::communicator::Communicator;
use crate::decomp_error::DecompError;
use crate::graph::{CostGraph, PartitionableGraph};

#[derive(Debug, Clone)]
pub struct MetisPartitioner {
    cfg: PartitionerConfig,
}

impl MetisPartitioner {
    pub fn new(cfg: PartitionerConfig) -> Self {
        Self { cfg }
    }
}

fn check_solvable<G: PartitionableGraph>(g: &G, n_parts: usize) -> Result<(), DecompError> {
    let n = g.n_vertices();
    if n == 0 {
        return Err(DecompError::DegenerateGraph("graph has no vertices".into()));
    }
    if n < n_parts {
        return Err(DecompError::DegenerateGraph(format!(
            "{n} sub-domains cannot fill {n_parts} parts"
        )));
    }
    if g.total_vertex_weight() <= 0.0 {
        return Err(DecompError::DegenerateGraph("all computation costs are zero".into()));
    }
    Ok(())
}

/// Raw METIS k-way call with vertex weights, migration sizes and edge weights.
///
/// Targets equal part weights with `1 + tol` allowed imbalance; returns the
/// part of every vertex and the solver's edge cut.
fn solve(
    arrays: &SolverArrays<metis::Idx>,
    cfg: &PartitionerConfig,
) -> Result<(Vec<usize>, i64), DecompError> {
    let n = arrays.vwgt.len();
    let nparts: metis::Idx = num_traits::NumCast::from(cfg.n_parts)
        .ok_or_else(|| PartitionError::IndexOverflow(cfg.n_parts.to_string()))?;
    let seed: metis::Idx = num_traits::NumCast::from(cfg.rng_seed % (i32::MAX as u64))
        .ok_or_else(|| PartitionError::IndexOverflow(cfg.rng_seed.to_string()))?;
    let tpwgts = vec![1.0 as metis::Real / cfg.n_parts as metis::Real; cfg.n_parts];
    let ubvec = [1.0 as metis::Real + cfg.imbalance_tolerance as metis::Real];

    let graph = metis::Graph::new(1, nparts, &arrays.xadj, &arrays.adjncy)
        .map_err(|e| DecompError::SolverFailure(format!("{e:?}")))?
        .set_vwgt(&arrays.vwgt)
        .set_vsize(&arrays.vsize)
        .set_adjwgt(&arrays.adjwgt)
        .set_tpwgts(&tpwgts)
        .set_ubvec(&ubvec)
        .set_option(metis::option::Seed(seed));

    let mut part = vec![0 as metis::Idx; n];
    let cut = graph
        .part_kway(&mut part)
        .map_err(|e| DecompError::SolverFailure(format!("{e:?}")))?;

    let owners = part
        .into_iter()
        .map(|p| {
            usize::try_from(p)
                .ok()
                .filter(|&p| p < cfg.n_parts)
                .ok_or_else(|| DecompError::SolverFailure(format!("part id {p} out of range")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok((owners, i64::from(cut)))
}

/// Partition any graph with the single-authority solver.
pub fn partition_kway<G: PartitionableGraph>(
    g: &G,
    cfg: &PartitionerConfig,
) -> Result<Vec<usize>, DecompError> {
    cfg.validate()?;
    check_solvable(g, cfg.n_parts)?;
    if cfg.n_parts == 1 {
        return Ok(vec![0; g.n_vertices()]);
    }

    let arrays = to_solver::<metis::Idx, _>(g)?;
    let (mut owners, solver_cut) = solve(&arrays, cfg)?;

    if !refine::balance(g, &mut owners, cfg.n_parts, cfg, None) {
        warn!(
            "k-way: imbalance tolerance {} not reached after balancing",
            cfg.imbalance_tolerance
        );
    }
    fill_empty_parts(&mut owners, cfg.n_parts);

    debug!(
        "k-way: {} parts, solver cut {}, weighted cut {:.3}, loads {:?}",
        cfg.n_parts,
        solver_cut,
        metrics::edge_cut(g, &owners),
        metrics::part_loads(g, &owners, cfg.n_parts)
    );
    Ok(owners)
}

impl Partitioner for MetisPartitioner {
    fn decompose<C: Communicator, const D: usize>(
        &mut self,
        graph: &CostGraph<D>,
        _comm: &C,
    ) -> Result<Assignment, DecompError> {
        let owners = partition_kway(graph, &self.cfg)?;
        Assignment::new(owners, self.cfg.n_parts)
    }

    fn refine<C: Communicator, const D: usize>(
        &mut self,
        graph: &CostGraph<D>,
        previous: &Assignment,
        _comm: &C,
    ) -> Result<Assignment, DecompError> {
        self.cfg.validate()?;
        check_solvable(graph, self.cfg.n_parts)?;
        if previous.n_parts() != self.cfg.n_parts {
            return Err(DecompError::PartCountMismatch {
                parts: previous.n_parts(),
                processes: self.cfg.n_parts,
            });
        }
        let owners = refine::refine_kway(graph, previous.owners(), self.cfg.n_parts, &self.cfg)?;
        Assignment::new(owners, self.cfg.n_parts)
    }

    fn config(&self) -> &PartitionerConfig {
        &self.cfg
    }

    fn config_mut(&mut self) -> &mut PartitionerConfig {
        &mut self.cfg
    }
}
