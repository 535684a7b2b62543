//! Distributed-authority partitioning.
//!
//! Each rank is authoritative for the contiguous range of renumbered vertex
//! ids given by the [`VertexDistribution`]. It packs only its own rows
//! (weights it owns plus neighbor ids, local or remote) into a
//! [`CsrShard`]; the shards are all-gathered and every rank then runs the
//! same deterministic solve on the stacked graph. Weights set on a rank for
//! sub-domains it does not own are therefore ignored, and ranks may hold
//! diverging cost graphs between calls.
//!
//! After every successful call the distribution is rebuilt from the new
//! assignment so each rank's owned sub-domains become its contiguous range.
//!
//! Both operations are collective over the communicator.

use log::debug;

use super::csr::{CsrGraph, CsrShard};
use super::error::PartitionError;
use super::{Assignment, Partitioner, PartitionerConfig, metis_partition, refine};
use crate::algs::collective::all_gather_bytes;
use crate::algs::communicator::{CommTag, Communicator};
use crate::decomp_error::DecompError;
use crate::graph::{CostGraph, PartitionableGraph};

const SHARD_TAG: CommTag = CommTag(0x2000);

/// Contiguous ranges of renumbered ids per rank plus the renumbering.
///
/// Rank `r` owns renumbered ids `vtxdist[r]..vtxdist[r + 1]`; `r2g` maps a
/// renumbered id to the global sub-domain id and `g2r` is its inverse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexDistribution {
    vtxdist: Vec<usize>,
    r2g: Vec<usize>,
    g2r: Vec<usize>,
}

impl VertexDistribution {
    /// Identity numbering split into `n_ranks` near-equal ranges.
    pub fn uniform(n: usize, n_ranks: usize) -> Self {
        let vtxdist = (0..=n_ranks).map(|r| r * n / n_ranks.max(1)).collect();
        Self {
            vtxdist,
            r2g: (0..n).collect(),
            g2r: (0..n).collect(),
        }
    }

    /// Renumber so each part's sub-domains are contiguous, in ascending
    /// global id order within the part.
    pub fn from_assignment(a: &Assignment) -> Self {
        let mut vtxdist = Vec::with_capacity(a.n_parts() + 1);
        let mut r2g = Vec::with_capacity(a.len());
        vtxdist.push(0);
        for part in 0..a.n_parts() {
            r2g.extend(a.members(part));
            vtxdist.push(r2g.len());
        }
        let mut g2r = vec![0; a.len()];
        for (r, &g) in r2g.iter().enumerate() {
            g2r[g] = r;
        }
        Self { vtxdist, r2g, g2r }
    }

    pub fn n_ranks(&self) -> usize {
        self.vtxdist.len().saturating_sub(1)
    }

    pub fn n_vertices(&self) -> usize {
        self.r2g.len()
    }

    pub fn vtxdist(&self) -> &[usize] {
        &self.vtxdist
    }

    /// Renumbered range owned by `rank`.
    pub fn range(&self, rank: usize) -> std::ops::Range<usize> {
        match self.vtxdist.get(rank..rank + 2) {
            Some(&[a, b]) => a..b,
            _ => 0..0,
        }
    }

    #[inline]
    pub fn to_global(&self, r: usize) -> usize {
        self.r2g[r]
    }

    #[inline]
    pub fn to_renumbered(&self, g: usize) -> usize {
        self.g2r[g]
    }

    /// Owner rank of renumbered id `r`.
    pub fn rank_of(&self, r: usize) -> Option<usize> {
        if r >= self.n_vertices() {
            return None;
        }
        Some(self.vtxdist.partition_point(|&start| start <= r) - 1)
    }
}

#[derive(Debug, Clone)]
pub struct DistributedPartitioner {
    cfg: PartitionerConfig,
    dist: Option<VertexDistribution>,
}

impl DistributedPartitioner {
    pub fn new(cfg: PartitionerConfig) -> Self {
        Self { cfg, dist: None }
    }

    pub fn distribution(&self) -> Option<&VertexDistribution> {
        self.dist.as_ref()
    }

    /// This rank's rows of `graph` in renumbered ids.
    pub fn local_shard<G: PartitionableGraph>(
        graph: &G,
        dist: &VertexDistribution,
        rank: usize,
    ) -> Result<CsrShard, DecompError> {
        let range = dist.range(rank);
        if range.is_empty() {
            return Err(DecompError::EmptyLocalRange(rank));
        }
        let mut shard = CsrShard::new(range.start);
        for r in range {
            let g = dist.to_global(r);
            let adj = graph
                .neighbors(g)
                .iter()
                .zip(graph.edge_weights(g))
                .map(|(&u, &w)| (dist.to_renumbered(u), w));
            shard.push_row(graph.vertex_weight(g), graph.migration_weight(g), adj);
        }
        Ok(shard)
    }

    /// Collective: gather every rank's shard into the full renumbered graph.
    fn gather<C: Communicator, G: PartitionableGraph>(
        &self,
        graph: &G,
        dist: &VertexDistribution,
        comm: &C,
    ) -> Result<CsrGraph, DecompError> {
        let shard = Self::local_shard(graph, dist, comm.rank())?;
        let shards = all_gather_bytes(comm, SHARD_TAG, &shard.encode())?
            .iter()
            .enumerate()
            .map(|(rank, bytes)| CsrShard::decode(bytes, rank))
            .collect::<Result<Vec<_>, PartitionError>>()?;
        let stacked = CsrShard::assemble(&shards)?;
        debug!(
            "rank {}: gathered {} vertices from {} shards",
            comm.rank(),
            stacked.n_vertices(),
            shards.len()
        );
        Ok(stacked)
    }

    /// Local checks every rank evaluates identically, so a rejected call
    /// fails on all ranks before any message is sent.
    fn check_world<C: Communicator>(
        &self,
        n: usize,
        comm: &C,
    ) -> Result<VertexDistribution, DecompError> {
        self.cfg.validate()?;
        if self.cfg.n_parts != comm.size() {
            return Err(DecompError::PartCountMismatch {
                parts: self.cfg.n_parts,
                processes: comm.size(),
            });
        }
        let dist = match &self.dist {
            Some(d) if d.n_vertices() == n && d.n_ranks() == comm.size() => d.clone(),
            _ => VertexDistribution::uniform(n, comm.size()),
        };
        if let Some(empty) = (0..dist.n_ranks()).find(|&r| dist.range(r).is_empty()) {
            return Err(DecompError::EmptyLocalRange(empty));
        }
        Ok(dist)
    }

    fn finish(
        &mut self,
        dist: &VertexDistribution,
        renumbered: &[usize],
    ) -> Result<Assignment, DecompError> {
        let mut owners = vec![0; renumbered.len()];
        for (r, &p) in renumbered.iter().enumerate() {
            owners[dist.to_global(r)] = p;
        }
        let a = Assignment::new(owners, self.cfg.n_parts)?;
        self.dist = Some(VertexDistribution::from_assignment(&a));
        Ok(a)
    }
}

impl Partitioner for DistributedPartitioner {
    fn decompose<C: Communicator, const D: usize>(
        &mut self,
        graph: &CostGraph<D>,
        comm: &C,
    ) -> Result<Assignment, DecompError> {
        let dist = self.check_world(graph.len(), comm)?;
        let stacked = self.gather(graph, &dist, comm)?;
        let parts = metis_partition::partition_kway(&stacked, &self.cfg)?;
        self.finish(&dist, &parts)
    }

    fn refine<C: Communicator, const D: usize>(
        &mut self,
        graph: &CostGraph<D>,
        previous: &Assignment,
        comm: &C,
    ) -> Result<Assignment, DecompError> {
        let dist = self.check_world(graph.len(), comm)?;
        if previous.len() != graph.len() {
            return Err(PartitionError::PreviousMismatch {
                expected: graph.len(),
                got: previous.len(),
            }
            .into());
        }
        let stacked = self.gather(graph, &dist, comm)?;
        let prev_r: Vec<usize> = (0..stacked.n_vertices())
            .map(|r| previous.owners()[dist.to_global(r)])
            .collect();
        let parts = refine::refine_kway(&stacked, &prev_r, self.cfg.n_parts, &self.cfg)?;
        self.finish(&dist, &parts)
    }

    fn config(&self) -> &PartitionerConfig {
        &self.cfg
    }

    fn config_mut(&mut self) -> &mut PartitionerConfig {
        &mut self.cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{LocalComm, NoComm};
    use crate::geometry::{Aabb, Boundary};
    use crate::graph::CartGrid;

    fn square(n: usize) -> CostGraph<2> {
        CostGraph::cartesian(
            CartGrid::new([n, n]).unwrap(),
            Aabb::new([0.0; 2], [1.0; 2]),
            [Boundary::NonPeriodic; 2],
        )
        .unwrap()
    }

    #[test]
    fn renumbering_makes_parts_contiguous() {
        let a = Assignment::new(vec![1, 0, 1, 0, 2], 3).unwrap();
        let d = VertexDistribution::from_assignment(&a);
        assert_eq!(d.vtxdist(), &[0, 2, 4, 5]);
        assert_eq!((d.to_global(0), d.to_global(2)), (1, 0));
        assert_eq!(d.to_renumbered(4), 4);
        assert_eq!(d.rank_of(3), Some(1));
        assert_eq!(d.rank_of(5), None);
        assert_eq!(d.range(2), 4..5);
    }

    #[test]
    fn uniform_distribution_covers_all() {
        let d = VertexDistribution::uniform(10, 3);
        assert_eq!(d.vtxdist(), &[0, 3, 6, 10]);
        let d = VertexDistribution::uniform(2, 3);
        assert!(d.range(0).is_empty());
    }

    #[test]
    fn rank_count_must_match() {
        let g = square(4);
        let mut p = DistributedPartitioner::new(PartitionerConfig {
            n_parts: 2,
            ..Default::default()
        });
        assert_eq!(
            p.decompose(&g, &NoComm),
            Err(DecompError::PartCountMismatch {
                parts: 2,
                processes: 1
            })
        );
    }

    #[test]
    fn empty_local_range_is_reported() {
        let g = square(1);
        let d = VertexDistribution::uniform(1, 2);
        assert_eq!(
            DistributedPartitioner::local_shard(&g, &d, 0),
            Err(DecompError::EmptyLocalRange(0))
        );
    }

    #[test]
    fn short_graph_is_rejected_before_gathering() {
        let world = LocalComm::world(2);
        let results: Vec<_> = std::thread::scope(|s| {
            let hs: Vec<_> = world
                .iter()
                .map(|c| {
                    s.spawn(move || {
                        let mut p = DistributedPartitioner::new(PartitionerConfig {
                            n_parts: 2,
                            ..Default::default()
                        });
                        p.decompose(&square(1), c)
                    })
                })
                .collect();
            hs.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(results, vec![Err(DecompError::EmptyLocalRange(0)); 2]);
    }

    #[test]
    fn ranks_agree_on_the_partition() {
        let world = LocalComm::world(2);
        let results: Vec<_> = std::thread::scope(|s| {
            let hs: Vec<_> = world
                .iter()
                .map(|c| {
                    s.spawn(move || {
                        let mut g = square(6);
                        // each rank only knows the true cost of its own half
                        for id in 0..36 {
                            if (id < 18) == (c.rank() == 0) {
                                g.set_computation_cost(id, 2.0).unwrap();
                            }
                        }
                        let mut p = DistributedPartitioner::new(PartitionerConfig {
                            n_parts: 2,
                            ..Default::default()
                        });
                        let a = p.decompose(&g, c).unwrap();
                        let b = p.refine(&g, &a, c).unwrap();
                        (a, b, p.distribution().cloned())
                    })
                })
                .collect();
            hs.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(results[0].0, results[1].0);
        assert_eq!(results[0].1, results[1].1);
        let dist = results[0].2.as_ref().unwrap();
        let sizes = results[0].1.part_sizes();
        assert_eq!(dist.range(0).len(), sizes[0]);
    }
}
