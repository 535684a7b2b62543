//! Partitioning strategies: sub-domain ids → process ranks.
//!
//! Three strategies share one output contract, an [`Assignment`]:
//!
//! * [`metis_partition::MetisPartitioner`]: every rank holds the whole cost graph and
//!   solves the same seeded k-way problem locally.
//! * [`distributed::DistributedPartitioner`]: every rank contributes only its
//!   contiguous shard of the graph; the solve is collective.
//! * [`sfc::SfcPartitioner`]: contiguous ranges of a space-filling curve; no
//!   solver, equal sub-domain counts, computation costs are not considered.
//!
//! [`Strategy`] is the tagged variant the decomposition session drives.

pub mod csr;
pub mod distributed;
pub mod error;
pub mod metis_partition;
pub mod metrics;
pub mod refine;
pub mod sfc;

pub use csr::{CsrGraph, CsrShard};
pub use distributed::{DistributedPartitioner, VertexDistribution};
pub use error::PartitionError;
pub use metis_partition::MetisPartitioner;
pub use metrics::{edge_cut, migrated_volume, part_loads, unbalance};
pub use sfc::{CurveKind, SfcPartitioner};

use serde::{Deserialize, Serialize};

use crate::algs::communicator::Communicator;
use crate::decomp_error::DecompError;
use crate::graph::CostGraph;

pub type PartitionId = usize;

/// Solver-facing knobs shared by all strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionerConfig {
    pub n_parts: usize,
    /// Allowed relative excess of the heaviest part over the average load.
    pub imbalance_tolerance: f64,
    /// Weight of communication relative to data redistribution in refine
    /// mode. Larger values favor a low edge cut over low migration.
    pub itr: f64,
    pub rng_seed: u64,
    /// Sweeps of greedy boundary refinement per refine call.
    pub refine_passes: usize,
}

impl Default for PartitionerConfig {
    fn default() -> Self {
        Self {
            n_parts: 1,
            imbalance_tolerance: 0.05,
            itr: 1000.0,
            rng_seed: 42,
            refine_passes: 4,
        }
    }
}

impl PartitionerConfig {
    pub fn validate(&self) -> Result<(), DecompError> {
        if self.n_parts == 0 {
            return Err(DecompError::InvalidConfig("n_parts must be at least 1".into()));
        }
        if !(self.imbalance_tolerance.is_finite() && self.imbalance_tolerance >= 0.0) {
            return Err(DecompError::InvalidConfig(format!(
                "imbalance tolerance {} must be finite and non-negative",
                self.imbalance_tolerance
            )));
        }
        if !(self.itr.is_finite() && self.itr >= 0.0) {
            return Err(DecompError::InvalidConfig(format!(
                "itr {} must be finite and non-negative",
                self.itr
            )));
        }
        Ok(())
    }
}

/// Total map from sub-domain id to owning part.
///
/// Always surjective onto `0..n_parts`: every part owns at least one
/// sub-domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    owners: Vec<PartitionId>,
    n_parts: usize,
}

impl Assignment {
    /// Validate and wrap `owners[id] = part`.
    pub fn new(owners: Vec<PartitionId>, n_parts: usize) -> Result<Self, DecompError> {
        let mut counts = vec![0usize; n_parts];
        for (id, &p) in owners.iter().enumerate() {
            match counts.get_mut(p) {
                Some(c) => *c += 1,
                None => {
                    return Err(DecompError::InvalidConfig(format!(
                        "sub-domain {id} assigned to part {p}, only {n_parts} parts exist"
                    )));
                }
            }
        }
        if let Some(empty) = counts.iter().position(|&c| c == 0) {
            return Err(DecompError::EmptyPartition(empty));
        }
        Ok(Self { owners, n_parts })
    }

    #[inline]
    pub fn owner(&self, id: usize) -> Option<PartitionId> {
        self.owners.get(id).copied()
    }

    pub fn owners(&self) -> &[PartitionId] {
        &self.owners
    }

    pub fn n_parts(&self) -> usize {
        self.n_parts
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Sub-domain ids owned by `part`, ascending.
    pub fn members(&self, part: PartitionId) -> impl Iterator<Item = usize> + '_ {
        self.owners
            .iter()
            .enumerate()
            .filter(move |&(_, &p)| p == part)
            .map(|(id, _)| id)
    }

    pub fn part_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_parts];
        for &p in &self.owners {
            sizes[p] += 1;
        }
        sizes
    }
}

/// Common interface of the partitioning strategies.
///
/// Both calls are collective for strategies that communicate; strategies that
/// do not still require an identical graph on every rank.
pub trait Partitioner {
    /// Fresh partition; any previous assignment is ignored.
    fn decompose<C: Communicator, const D: usize>(
        &mut self,
        graph: &CostGraph<D>,
        comm: &C,
    ) -> Result<Assignment, DecompError>;

    /// Incremental partition biased toward `previous`.
    fn refine<C: Communicator, const D: usize>(
        &mut self,
        graph: &CostGraph<D>,
        previous: &Assignment,
        comm: &C,
    ) -> Result<Assignment, DecompError>;

    fn config(&self) -> &PartitionerConfig;

    /// Knobs may change between calls, e.g. a fresh seed per decomposition.
    fn config_mut(&mut self) -> &mut PartitionerConfig;
}

/// Strategy selector used in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StrategyKind {
    #[default]
    Metis,
    Distributed,
    Hilbert,
    Morton,
}

#[derive(Debug, Clone)]
pub enum Strategy {
    Metis(MetisPartitioner),
    Distributed(DistributedPartitioner),
    SpaceFilling(SfcPartitioner),
}

impl Strategy {
    pub fn new(kind: StrategyKind, cfg: PartitionerConfig) -> Self {
        match kind {
            StrategyKind::Metis => Strategy::Metis(MetisPartitioner::new(cfg)),
            StrategyKind::Distributed => Strategy::Distributed(DistributedPartitioner::new(cfg)),
            StrategyKind::Hilbert => {
                Strategy::SpaceFilling(SfcPartitioner::new(CurveKind::Hilbert, cfg))
            }
            StrategyKind::Morton => {
                Strategy::SpaceFilling(SfcPartitioner::new(CurveKind::Morton, cfg))
            }
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::Metis(_) => StrategyKind::Metis,
            Strategy::Distributed(_) => StrategyKind::Distributed,
            Strategy::SpaceFilling(s) => match s.curve() {
                CurveKind::Hilbert => StrategyKind::Hilbert,
                CurveKind::Morton => StrategyKind::Morton,
            },
        }
    }
}

impl Partitioner for Strategy {
    fn decompose<C: Communicator, const D: usize>(
        &mut self,
        graph: &CostGraph<D>,
        comm: &C,
    ) -> Result<Assignment, DecompError> {
        match self {
            Strategy::Metis(p) => p.decompose(graph, comm),
            Strategy::Distributed(p) => p.decompose(graph, comm),
            Strategy::SpaceFilling(p) => p.decompose(graph, comm),
        }
    }

    fn refine<C: Communicator, const D: usize>(
        &mut self,
        graph: &CostGraph<D>,
        previous: &Assignment,
        comm: &C,
    ) -> Result<Assignment, DecompError> {
        match self {
            Strategy::Metis(p) => p.refine(graph, previous, comm),
            Strategy::Distributed(p) => p.refine(graph, previous, comm),
            Strategy::SpaceFilling(p) => p.refine(graph, previous, comm),
        }
    }

    fn config(&self) -> &PartitionerConfig {
        match self {
            Strategy::Metis(p) => p.config(),
            Strategy::Distributed(p) => p.config(),
            Strategy::SpaceFilling(p) => p.config(),
        }
    }

    fn config_mut(&mut self) -> &mut PartitionerConfig {
        match self {
            Strategy::Metis(p) => p.config_mut(),
            Strategy::Distributed(p) => p.config_mut(),
            Strategy::SpaceFilling(p) => p.config_mut(),
        }
    }
}

/// Give every empty part one vertex taken from the part with the most
/// vertices. Needs `owners.len() >= n_parts`.
pub(crate) fn fill_empty_parts(owners: &mut [PartitionId], n_parts: usize) {
    let mut counts = vec![0usize; n_parts];
    for &p in owners.iter() {
        counts[p] += 1;
    }
    for empty in 0..n_parts {
        if counts[empty] > 0 {
            continue;
        }
        let Some(donor) = (0..n_parts).max_by_key(|&p| (counts[p], std::cmp::Reverse(p))) else {
            return;
        };
        if counts[donor] < 2 {
            return;
        }
        if let Some(v) = owners.iter().rposition(|&p| p == donor) {
            owners[v] = empty;
            counts[donor] -= 1;
            counts[empty] += 1;
        }
    }
}
