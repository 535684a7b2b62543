//! Axis-aligned boxes in `D` dimensions.

use serde::{Deserialize, Serialize};

use super::{Point, array_serde};

/// Half-open axis-aligned box `[lo, hi)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb<const D: usize> {
    #[serde(with = "array_serde")]
    pub lo: [f64; D],
    #[serde(with = "array_serde")]
    pub hi: [f64; D],
}

impl<const D: usize> Aabb<D> {
    pub fn new(lo: [f64; D], hi: [f64; D]) -> Self {
        Self { lo, hi }
    }

    /// Side lengths.
    pub fn extent(&self) -> [f64; D] {
        std::array::from_fn(|k| self.hi[k] - self.lo[k])
    }

    pub fn center(&self) -> Point<D> {
        std::array::from_fn(|k| 0.5 * (self.lo[k] + self.hi[k]))
    }

    pub fn volume(&self) -> f64 {
        self.extent().iter().product()
    }

    /// True when some axis has non-positive length.
    pub fn is_empty(&self) -> bool {
        (0..D).any(|k| self.hi[k] <= self.lo[k])
    }

    /// Half-open containment test.
    #[inline]
    pub fn contains(&self, p: &Point<D>) -> bool {
        (0..D).all(|k| self.lo[k] <= p[k] && p[k] < self.hi[k])
    }

    /// Closed containment test, used for the domain's upper faces.
    #[inline]
    pub fn contains_closed(&self, p: &Point<D>) -> bool {
        (0..D).all(|k| self.lo[k] <= p[k] && p[k] <= self.hi[k])
    }

    /// Intersection with positive volume, if any.
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let b = Self {
            lo: std::array::from_fn(|k| self.lo[k].max(other.lo[k])),
            hi: std::array::from_fn(|k| self.hi[k].min(other.hi[k])),
        };
        (!b.is_empty()).then_some(b)
    }

    /// Grow by `w[k]` on both sides of every axis.
    pub fn enlarge(&self, w: &[f64; D]) -> Self {
        Self {
            lo: std::array::from_fn(|k| self.lo[k] - w[k]),
            hi: std::array::from_fn(|k| self.hi[k] + w[k]),
        }
    }

    pub fn translate(&self, shift: &[f64; D]) -> Self {
        Self {
            lo: std::array::from_fn(|k| self.lo[k] + shift[k]),
            hi: std::array::from_fn(|k| self.hi[k] + shift[k]),
        }
    }
}
