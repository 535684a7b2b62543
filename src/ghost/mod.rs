//! Ghost regions: which boxes of space each rank receives and sends.
//!
//! A rank's *external* ghost boxes are regions owned by other ranks (or, with
//! periodic boundaries, wrapped images of its own sub-domains) lying within
//! the ghost width of its owned sub-domains; data flows in. Its *internal*
//! ghost boxes are the mirror regions inside its own sub-domains that other
//! ranks need; data flows out.
//!
//! Boxes are produced per `(remote rank, remote sub-domain, periodic shift,
//! receiving sub-domain)` and listed in that order on both sides of every
//! rank pair, so the i-th external box P holds for Q corresponds to the i-th
//! internal box Q holds for P. Boxes that differ only in the receiving
//! sub-domain may overlap; an element is shipped once per group, in the
//! first box of the group that contains it. A [`GhostLayout`] is tied to the
//! decomposition version it was built from and is discarded on every
//! rebalance.

pub mod builder;
pub mod delta;
pub mod exchange;
pub mod storage;

pub use builder::build_ghost_layout;
pub use delta::{AddDelta, CopyDelta, Delta};
pub use exchange::{GhostPlan, ghost_get, ghost_put};
pub use storage::{GhostStorage, ParticleSet};

use serde::{Deserialize, Serialize};

use crate::geometry::Aabb;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GhostDirection {
    /// Data flows in from `rank`.
    External,
    /// Data flows out to `rank`.
    Internal,
}

/// One transfer region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GhostBox<const D: usize> {
    /// Region in the frame of the rank holding the box: for external boxes
    /// the (possibly shifted) image where ghosts land, for internal boxes
    /// the unshifted region inside an owned sub-domain.
    pub region: Aabb<D>,
    /// The other endpoint of the transfer.
    pub rank: usize,
    pub direction: GhostDirection,
    /// Sub-domain the data lives in on its owner.
    pub sub_domain: usize,
    /// Periodic images of the domain to add on arrival, per axis.
    #[serde(with = "crate::geometry::array_serde")]
    pub shift: [i64; D],
    /// Sub-domain of the receiving rank whose halo this box covers.
    pub near: usize,
}

impl<const D: usize> GhostBox<D> {
    /// Order shared by both endpoints of a rank pair.
    pub(crate) fn sort_key(&self) -> (usize, usize, [i64; D], usize) {
        (self.rank, self.sub_domain, self.shift, self.near)
    }

    /// Boxes of one group carry the same elements at most once.
    pub(crate) fn group_key(&self) -> (usize, usize, [i64; D]) {
        (self.rank, self.sub_domain, self.shift)
    }

    /// Whether this box wraps around a periodic boundary.
    pub fn is_periodic_image(&self) -> bool {
        self.shift.iter().any(|&s| s != 0)
    }
}

/// Ghost boxes of one rank for one decomposition version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GhostLayout<const D: usize> {
    pub version: u64,
    pub rank: usize,
    #[serde(with = "crate::geometry::array_serde")]
    pub width: [f64; D],
    pub external: Vec<GhostBox<D>>,
    pub internal: Vec<GhostBox<D>>,
}

impl<const D: usize> GhostLayout<D> {
    /// Remote ranks this rank receives from, ascending, excluding itself.
    pub fn sources(&self) -> Vec<usize> {
        let mut r: Vec<usize> = self
            .external
            .iter()
            .map(|b| b.rank)
            .filter(|&q| q != self.rank)
            .collect();
        r.dedup();
        r
    }

    /// Remote ranks this rank sends to, ascending, excluding itself.
    pub fn destinations(&self) -> Vec<usize> {
        let mut r: Vec<usize> = self
            .internal
            .iter()
            .map(|b| b.rank)
            .filter(|&q| q != self.rank)
            .collect();
        r.dedup();
        r
    }

    /// External boxes from `rank`, in wire order.
    pub fn external_from(&self, rank: usize) -> impl Iterator<Item = (usize, &GhostBox<D>)> + '_ {
        self.external.iter().enumerate().filter(move |(_, b)| b.rank == rank)
    }

    /// Internal boxes to `rank`, in wire order.
    pub fn internal_to(&self, rank: usize) -> impl Iterator<Item = (usize, &GhostBox<D>)> + '_ {
        self.internal.iter().enumerate().filter(move |(_, b)| b.rank == rank)
    }
}
