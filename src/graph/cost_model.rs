//! Caller-supplied workload models.
//!
//! A model is evaluated once per sub-domain (and once per edge) whenever the
//! graph is re-weighted, typically right before a refine.

use super::SubDomain;
use crate::geometry::Point;

pub trait CostModel<const D: usize> {
    /// `(computation, migration)` cost of one sub-domain.
    fn compute_cost(&self, sd: &SubDomain<D>) -> (f64, f64);

    /// Communication cost of the `neighbor`-th edge of `sd`.
    fn compute_comm_cost(&self, _sd: &SubDomain<D>, _neighbor: usize) -> f64 {
        1.0
    }
}

/// Every sub-domain costs the same.
#[derive(Clone, Copy, Debug)]
pub struct UniformCost {
    pub computation: f64,
    pub migration: f64,
    pub communication: f64,
}

impl Default for UniformCost {
    fn default() -> Self {
        Self {
            computation: 1.0,
            migration: 1.0,
            communication: 1.0,
        }
    }
}

impl<const D: usize> CostModel<D> for UniformCost {
    fn compute_cost(&self, _sd: &SubDomain<D>) -> (f64, f64) {
        (self.computation, self.migration)
    }

    fn compute_comm_cost(&self, _sd: &SubDomain<D>, _neighbor: usize) -> f64 {
        self.communication
    }
}

/// High cost inside a ball, low cost elsewhere.
///
/// Migration is twice the computation cost; communication is unit.
#[derive(Clone, Copy, Debug)]
pub struct SphereCost<const D: usize> {
    pub center: Point<D>,
    pub radius: f64,
    pub inside: f64,
    pub outside: f64,
}

impl<const D: usize> SphereCost<D> {
    pub fn new(center: Point<D>, radius: f64, inside: f64, outside: f64) -> Self {
        Self {
            center,
            radius,
            inside,
            outside,
        }
    }

    pub fn contains(&self, p: &Point<D>) -> bool {
        let d2: f64 = (0..D).map(|k| (p[k] - self.center[k]).powi(2)).sum();
        d2 <= self.radius * self.radius
    }

    /// Move the ball by `shift`.
    pub fn shift(&mut self, shift: &[f64; D]) {
        for k in 0..D {
            self.center[k] += shift[k];
        }
    }
}

impl<const D: usize> CostModel<D> for SphereCost<D> {
    fn compute_cost(&self, sd: &SubDomain<D>) -> (f64, f64) {
        let c = if self.contains(&sd.center) {
            self.inside
        } else {
            self.outside
        };
        (c, 2.0 * c)
    }
}
