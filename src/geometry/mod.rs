//! Geometry value types used by the decomposition.
//!
//! Boxes are axis-aligned and half-open: a point `p` is inside when
//! `lo[k] <= p[k] < hi[k]` on every axis.

pub mod aabb;
pub mod array_serde;

pub use aabb::Aabb;

use serde::{Deserialize, Serialize};

/// A point in `D`-dimensional physical space.
pub type Point<const D: usize> = [f64; D];

/// Boundary condition of one axis of the domain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Boundary {
    #[default]
    NonPeriodic,
    Periodic,
}

impl Boundary {
    #[inline]
    pub fn is_periodic(self) -> bool {
        matches!(self, Boundary::Periodic)
    }
}
