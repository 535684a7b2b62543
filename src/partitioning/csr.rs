//! Owned CSR graphs and the single conversion point to solver integers.
//!
//! [`CsrGraph`] is a plain copy of any [`PartitionableGraph`]; [`CsrShard`]
//! is one rank's contiguous slice of it as used by the distributed
//! partitioner. Weights stay `f64` everywhere except in [`SolverArrays`],
//! built by [`to_solver`] right before a solver call.

use num_traits::NumCast;

use super::error::PartitionError;
use crate::algs::wire::{WireEdge, WireReader, WireVertex, WireWriter, kind};
use crate::graph::PartitionableGraph;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CsrGraph {
    pub xadj: Vec<usize>,
    pub adjncy: Vec<usize>,
    pub adjwgt: Vec<f64>,
    pub vwgt: Vec<f64>,
    pub vsize: Vec<f64>,
}

impl CsrGraph {
    pub fn from_graph<G: PartitionableGraph>(g: &G) -> Self {
        let n = g.n_vertices();
        let mut out = CsrGraph {
            xadj: Vec::with_capacity(n + 1),
            ..Default::default()
        };
        out.xadj.push(0);
        for v in 0..n {
            out.adjncy.extend_from_slice(g.neighbors(v));
            out.adjwgt.extend_from_slice(g.edge_weights(v));
            out.xadj.push(out.adjncy.len());
            out.vwgt.push(g.vertex_weight(v));
            out.vsize.push(g.migration_weight(v));
        }
        out
    }

    /// Check array lengths, offsets and neighbor ranges.
    pub fn validate(&self) -> Result<(), PartitionError> {
        let n = self.vwgt.len();
        if self.xadj.len() != n + 1 || self.vsize.len() != n {
            return Err(PartitionError::MalformedCsr(format!(
                "{} vertex weights, {} sizes, {} offsets",
                n,
                self.vsize.len(),
                self.xadj.len()
            )));
        }
        if self.xadj[0] != 0 || self.xadj.windows(2).any(|w| w[0] > w[1]) {
            return Err(PartitionError::MalformedCsr("offsets are not monotone from 0".into()));
        }
        if self.xadj[n] != self.adjncy.len() || self.adjwgt.len() != self.adjncy.len() {
            return Err(PartitionError::MalformedCsr(format!(
                "{} neighbors, {} edge weights, last offset {}",
                self.adjncy.len(),
                self.adjwgt.len(),
                self.xadj[n]
            )));
        }
        if let Some(&bad) = self.adjncy.iter().find(|&&u| u >= n) {
            return Err(PartitionError::MalformedCsr(format!(
                "neighbor {bad} out of range for {n} vertices"
            )));
        }
        Ok(())
    }
}

impl PartitionableGraph for CsrGraph {
    fn n_vertices(&self) -> usize {
        self.vwgt.len()
    }
    fn neighbors(&self, v: usize) -> &[usize] {
        &self.adjncy[self.xadj[v]..self.xadj[v + 1]]
    }
    fn edge_weights(&self, v: usize) -> &[f64] {
        &self.adjwgt[self.xadj[v]..self.xadj[v + 1]]
    }
    fn vertex_weight(&self, v: usize) -> f64 {
        self.vwgt[v]
    }
    fn migration_weight(&self, v: usize) -> f64 {
        self.vsize[v]
    }
}

/// Rows `[first, first + len)` of a graph. Neighbor ids are global.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CsrShard {
    pub first: usize,
    pub xadj: Vec<usize>,
    pub adjncy: Vec<usize>,
    pub adjwgt: Vec<f64>,
    pub vwgt: Vec<f64>,
    pub vsize: Vec<f64>,
}

impl CsrShard {
    pub fn new(first: usize) -> Self {
        Self {
            first,
            xadj: vec![0],
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.vwgt.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vwgt.is_empty()
    }

    /// Append the next row.
    pub fn push_row(&mut self, vwgt: f64, vsize: f64, adj: impl IntoIterator<Item = (usize, f64)>) {
        for (u, w) in adj {
            self.adjncy.push(u);
            self.adjwgt.push(w);
        }
        self.xadj.push(self.adjncy.len());
        self.vwgt.push(vwgt);
        self.vsize.push(vsize);
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::with_header(kind::GRAPH_SHARD);
        w.put_count(self.first);
        w.put_count(self.len());
        for r in 0..self.len() {
            let (a, b) = (self.xadj[r], self.xadj[r + 1]);
            w.put(&WireVertex::new(self.first + r, b - a, self.vwgt[r], self.vsize[r]));
            for k in a..b {
                w.put(&WireEdge::new(self.adjncy[k], self.adjwgt[k]));
            }
        }
        w.finish()
    }

    /// Inverse of [`CsrShard::encode`]; `rank` only labels the error.
    pub fn decode(bytes: &[u8], rank: usize) -> Result<Self, PartitionError> {
        let corrupt = || PartitionError::CorruptShard(rank);
        let mut r = WireReader::expect_header(bytes, kind::GRAPH_SHARD).ok_or_else(corrupt)?;
        let first = r.get_count().ok_or_else(corrupt)?;
        let len = r.get_count().ok_or_else(corrupt)?;
        let mut shard = CsrShard::new(first);
        for i in 0..len {
            let v: WireVertex = r.get().ok_or_else(corrupt)?;
            if v.id() != first + i {
                return Err(corrupt());
            }
            let mut adj = Vec::with_capacity(v.degree());
            for _ in 0..v.degree() {
                let e: WireEdge = r.get().ok_or_else(corrupt)?;
                adj.push((e.nbr(), e.weight()));
            }
            shard.push_row(v.computation(), v.migration(), adj);
        }
        if !r.is_exhausted() {
            return Err(corrupt());
        }
        Ok(shard)
    }

    /// Stack shards with consecutive ranges into one graph.
    pub fn assemble(shards: &[CsrShard]) -> Result<CsrGraph, PartitionError> {
        let mut g = CsrGraph {
            xadj: vec![0],
            ..Default::default()
        };
        for (rank, s) in shards.iter().enumerate() {
            if s.first != g.vwgt.len() {
                return Err(PartitionError::CorruptShard(rank));
            }
            let base = g.adjncy.len();
            g.xadj.extend(s.xadj[1..].iter().map(|&o| base + o));
            g.adjncy.extend_from_slice(&s.adjncy);
            g.adjwgt.extend_from_slice(&s.adjwgt);
            g.vwgt.extend_from_slice(&s.vwgt);
            g.vsize.extend_from_slice(&s.vsize);
        }
        g.validate()?;
        Ok(g)
    }
}

/// Graph arrays in the solver's integer type.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverArrays<I> {
    pub xadj: Vec<I>,
    pub adjncy: Vec<I>,
    pub vwgt: Vec<I>,
    pub vsize: Vec<I>,
    pub adjwgt: Vec<I>,
}

/// Integer weights are `round(w * scale)`; `scale` keeps the heaviest total
/// well inside the index range.
const WEIGHT_RESOLUTION: f64 = 1000.0;

fn cast<I: NumCast>(
    x: impl num_traits::ToPrimitive + std::fmt::Debug + Copy,
) -> Result<I, PartitionError> {
    NumCast::from(x).ok_or_else(|| PartitionError::IndexOverflow(format!("{x:?}")))
}

fn scale_for(total: f64, limit: f64) -> f64 {
    if total <= 0.0 {
        WEIGHT_RESOLUTION
    } else {
        WEIGHT_RESOLUTION.min(limit / total).max(f64::MIN_POSITIVE)
    }
}

/// Convert `g` for an integer-weighted solver.
///
/// Edge weights are symmetrized as the mean of both directions and clamped to
/// at least 1, since solvers expect a symmetric positive adjacency. Vertex
/// weights and sizes keep zero.
pub fn to_solver<I, G>(g: &G) -> Result<SolverArrays<I>, PartitionError>
where
    I: NumCast + num_traits::Bounded + num_traits::ToPrimitive + Copy,
    G: PartitionableGraph,
{
    let n = g.n_vertices();
    let limit = I::max_value().to_f64().unwrap_or(<f64 as From<i32>>::from(i32::MAX)) / 4.0;

    let mut xadj = Vec::with_capacity(n + 1);
    let mut adjncy = Vec::new();
    let mut adjwgt_f = Vec::new();
    xadj.push(cast::<I>(0usize)?);
    for v in 0..n {
        for (&u, &w) in g.neighbors(v).iter().zip(g.edge_weights(v)) {
            let back = g
                .neighbors(u)
                .iter()
                .position(|&x| x == v)
                .map(|k| g.edge_weights(u)[k])
                .ok_or_else(|| {
                    PartitionError::MalformedCsr(format!("edge {v} -> {u} has no reverse"))
                })?;
            adjncy.push(cast::<I>(u)?);
            adjwgt_f.push(0.5 * (w + back));
        }
        xadj.push(cast::<I>(adjncy.len())?);
    }

    let vw: Vec<f64> = (0..n).map(|v| g.vertex_weight(v)).collect();
    let vs: Vec<f64> = (0..n).map(|v| g.migration_weight(v)).collect();
    let to_ints = |ws: &[f64], min: f64| -> Result<Vec<I>, PartitionError> {
        let s = scale_for(ws.iter().sum(), limit);
        ws.iter().map(|&w| cast::<I>((w * s).round().max(min))).collect()
    };
    Ok(SolverArrays {
        xadj,
        adjncy,
        vwgt: to_ints(&vw, 0.0)?,
        vsize: to_ints(&vs, 0.0)?,
        adjwgt: to_ints(&adjwgt_f, 1.0)?,
    })
}
