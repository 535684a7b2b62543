//! Space-filling-curve partitioning.
//!
//! Sub-domains are ordered along a Hilbert or Morton curve through their grid
//! coordinates and the ordered list is cut into `n_parts` contiguous ranges
//! whose lengths differ by at most one. Computation costs are not
//! considered: the parts hold equal numbers of sub-domains, not equal load.

use super::{Assignment, Partitioner, PartitionerConfig};
use crate::algs::communicator::Communicator;
use crate::decomp_error::DecompError;
use crate::graph::CostGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveKind {
    Hilbert,
    Morton,
}

#[derive(Debug, Clone)]
pub struct SfcPartitioner {
    curve: CurveKind,
    cfg: PartitionerConfig,
}

/// Bits per axis needed for `n` distinct coordinates.
fn bits_for(n: usize) -> u32 {
    (usize::BITS - n.saturating_sub(1).leading_zeros()).max(1)
}

/// Interleave the bits of `x`, most significant level first, axis 0 leading.
fn interleave<const D: usize>(x: &[u64; D], bits: u32) -> u128 {
    let mut idx = 0u128;
    for b in (0..bits).rev() {
        for xi in x {
            idx = (idx << 1) | u128::from((xi >> b) & 1);
        }
    }
    idx
}

/// Position of grid point `coords` along the Morton (Z-order) curve.
pub fn morton_index<const D: usize>(coords: &[usize; D], bits: u32) -> u128 {
    interleave(&coords.map(|c| c as u64), bits)
}

/// Position of grid point `coords` along a `D`-dimensional Hilbert curve of
/// `2^bits` points per axis (Skilling's transpose algorithm).
pub fn hilbert_index<const D: usize>(coords: &[usize; D], bits: u32) -> u128 {
    let mut x = coords.map(|c| c as u64);
    if D == 0 || bits == 0 {
        return 0;
    }
    let m = 1u64 << (bits - 1);

    let mut q = m;
    while q > 1 {
        let p = q - 1;
        for i in 0..D {
            if x[i] & q != 0 {
                x[0] ^= p;
            } else {
                let t = (x[0] ^ x[i]) & p;
                x[0] ^= t;
                x[i] ^= t;
            }
        }
        q >>= 1;
    }

    for i in 1..D {
        x[i] ^= x[i - 1];
    }
    let mut t = 0;
    let mut q = m;
    while q > 1 {
        if x[D - 1] & q != 0 {
            t ^= q - 1;
        }
        q >>= 1;
    }
    for xi in x.iter_mut() {
        *xi ^= t;
    }

    interleave(&x, bits)
}

impl SfcPartitioner {
    pub fn new(curve: CurveKind, cfg: PartitionerConfig) -> Self {
        Self { curve, cfg }
    }

    pub fn curve(&self) -> CurveKind {
        self.curve
    }

    /// Sub-domain ids in curve order.
    pub fn order<const D: usize>(&self, graph: &CostGraph<D>) -> Result<Vec<usize>, DecompError> {
        let grid = graph.grid();
        let bits = grid.divisions().iter().map(|&n| bits_for(n)).max().unwrap_or(1);
        if D as u32 * bits > u128::BITS {
            return Err(DecompError::InvalidConfig(format!(
                "{D}-D grid {:?} does not fit a 128-bit curve index",
                grid.divisions()
            )));
        }
        let mut keyed: Vec<(u128, usize)> = (0..graph.len())
            .map(|id| {
                let c = grid.coords(id);
                let key = match self.curve {
                    CurveKind::Hilbert => hilbert_index(&c, bits),
                    CurveKind::Morton => morton_index(&c, bits),
                };
                (key, id)
            })
            .collect();
        keyed.sort_unstable();
        Ok(keyed.into_iter().map(|(_, id)| id).collect())
    }
}

impl Partitioner for SfcPartitioner {
    fn decompose<C: Communicator, const D: usize>(
        &mut self,
        graph: &CostGraph<D>,
        _comm: &C,
    ) -> Result<Assignment, DecompError> {
        self.cfg.validate()?;
        let n = graph.len();
        let k = self.cfg.n_parts;
        if n < k {
            return Err(DecompError::DegenerateGraph(format!(
                "{n} sub-domains cannot fill {k} parts"
            )));
        }
        let mut owners = vec![0; n];
        for (pos, id) in self.order(graph)?.into_iter().enumerate() {
            owners[id] = pos * k / n;
        }
        Assignment::new(owners, k)
    }

    /// The curve order does not depend on costs, so refining reproduces the
    /// fresh decomposition.
    fn refine<C: Communicator, const D: usize>(
        &mut self,
        graph: &CostGraph<D>,
        _previous: &Assignment,
        comm: &C,
    ) -> Result<Assignment, DecompError> {
        self.decompose(graph, comm)
    }

    fn config(&self) -> &PartitionerConfig {
        &self.cfg
    }

    fn config_mut(&mut self) -> &mut PartitionerConfig {
        &mut self.cfg
    }
}
