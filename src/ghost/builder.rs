//! Ghost box construction.
//!
//! For an owned sub-domain `c` every sub-domain `d` reachable within the
//! ghost width (through at most `ceil(width / spacing)` cells per axis, with
//! periodic wrap `w` counted in domain lengths) contributes one box: the
//! overlap of `c` enlarged by the width with the image of `d` shifted by `w`.
//!
//! The sending side enumerates the same `(c, d, w)` triples from `d`'s point
//! of view and evaluates the same overlap, so both ends agree on which boxes
//! exist and on their extent. Sending boxes are stored unshifted, in the
//! owner's frame.

use itertools::Itertools;
use rayon::prelude::*;

use super::{GhostBox, GhostDirection, GhostLayout};
use crate::decomp_error::DecompError;
use crate::geometry::Aabb;
use crate::graph::CostGraph;
use crate::partitioning::Assignment;

type BoxKey<const D: usize> = (usize, usize, [i64; D], usize);

/// All offsets in `[-reach, reach]` per axis.
fn neighborhood<const D: usize>(reach: &[i64; D]) -> Vec<[i64; D]> {
    reach
        .iter()
        .map(|&r| -r..=r)
        .multi_cartesian_product()
        .map(|v| std::array::from_fn(|k| v[k]))
        .collect()
}

struct Halo<'a, const D: usize> {
    graph: &'a CostGraph<D>,
    width: [f64; D],
    period: [f64; D],
    offsets: Vec<[i64; D]>,
}

impl<'a, const D: usize> Halo<'a, D> {
    fn new(graph: &'a CostGraph<D>, width: [f64; D]) -> Self {
        let spacing = graph.spacing();
        let reach: [i64; D] = std::array::from_fn(|k| (width[k] / spacing[k]).ceil() as i64);
        Self {
            graph,
            width,
            period: graph.domain().extent(),
            offsets: neighborhood(&reach),
        }
    }

    /// `(sub-domain, wrap)` pairs around sub-domain `id`, self excluded.
    fn around(&self, id: usize) -> impl Iterator<Item = (usize, [i64; D])> + '_ {
        let grid = self.graph.grid();
        let bc = self.graph.boundary();
        let c = grid.coords(id);
        self.offsets.iter().filter_map(move |o| {
            if o.iter().all(|&x| x == 0) {
                return None;
            }
            let j: [i64; D] = std::array::from_fn(|k| c[k] as i64 + o[k]);
            let (wrapped, w) = grid.wrap(&j);
            if (0..D).any(|k| w[k] != 0 && !bc[k].is_periodic()) {
                return None;
            }
            Some((grid.lin_id(&wrapped), w))
        })
    }

    fn shift_of(&self, w: &[i64; D]) -> [f64; D] {
        std::array::from_fn(|k| w[k] as f64 * self.period[k])
    }

    /// Part of the image of `d` shifted by `w` within the width of `c`, in
    /// `c`'s frame.
    fn overlap(&self, c: usize, d: usize, w: &[i64; D]) -> Option<Aabb<D>> {
        let grid = self.graph.grid();
        let reach = self.graph.cell_box(&grid.coords(c)).enlarge(&self.width);
        let image = self.graph.cell_box(&grid.coords(d)).translate(&self.shift_of(w));
        reach.intersection(&image)
    }
}

fn sorted<const D: usize>(mut pieces: Vec<(BoxKey<D>, Aabb<D>)>) -> Vec<(BoxKey<D>, Aabb<D>)> {
    pieces.sort_unstable_by(|a, b| a.0.cmp(&b.0));
    pieces
}

/// Compute the ghost boxes of `rank` for `assignment`.
///
/// Pure and deterministic: the same inputs always give the same box lists
/// in the same order.
pub fn build_ghost_layout<const D: usize>(
    graph: &CostGraph<D>,
    assignment: &Assignment,
    rank: usize,
    width: &[f64; D],
    version: u64,
) -> Result<GhostLayout<D>, DecompError> {
    if let Some(k) = (0..D).find(|&k| !(width[k].is_finite() && width[k] >= 0.0)) {
        return Err(DecompError::InvalidConfig(format!(
            "ghost width {} on axis {k} must be finite and non-negative",
            width[k]
        )));
    }
    if assignment.len() != graph.len() {
        return Err(DecompError::InvalidConfig(format!(
            "assignment covers {} sub-domains, graph has {}",
            assignment.len(),
            graph.len()
        )));
    }
    if rank >= assignment.n_parts() {
        return Err(DecompError::PartCountMismatch {
            parts: assignment.n_parts(),
            processes: rank + 1,
        });
    }

    let halo = Halo::new(graph, *width);
    let owners = assignment.owners();
    let owned: Vec<usize> = assignment.members(rank).collect();

    let ext_pieces: Vec<(BoxKey<D>, Aabb<D>)> = owned
        .par_iter()
        .flat_map_iter(|&c| {
            let halo = &halo;
            halo.around(c).filter_map(move |(d, w)| {
                let q = owners[d];
                if q == rank && w.iter().all(|&x| x == 0) {
                    return None;
                }
                halo.overlap(c, d, &w).map(|r| ((q, d, w, c), r))
            })
        })
        .collect();

    let int_pieces: Vec<(BoxKey<D>, Aabb<D>)> = owned
        .par_iter()
        .flat_map_iter(|&d| {
            let halo = &halo;
            halo.around(d).filter_map(move |(c, back)| {
                let p = owners[c];
                let w: [i64; D] = back.map(|x| -x);
                if p == rank && w.iter().all(|&x| x == 0) {
                    return None;
                }
                halo.overlap(c, d, &w).map(|r| ((p, d, w, c), r))
            })
        })
        .collect();

    let external = sorted(ext_pieces)
        .into_iter()
        .map(|((q, d, w, c), region)| GhostBox {
            region,
            rank: q,
            direction: GhostDirection::External,
            sub_domain: d,
            shift: w,
            near: c,
        })
        .collect();
    let internal = sorted(int_pieces)
        .into_iter()
        .map(|((p, d, w, c), region)| {
            let back = halo.shift_of(&w.map(|x| -x));
            GhostBox {
                region: region.translate(&back),
                rank: p,
                direction: GhostDirection::Internal,
                sub_domain: d,
                shift: w,
                near: c,
            }
        })
        .collect();

    Ok(GhostLayout {
        version,
        rank,
        width: *width,
        external,
        internal,
    })
}
