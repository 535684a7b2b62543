//! Coarse Cartesian tessellation: sub-domain id <-> grid coordinates.
//!
//! Ids are linearised with axis 0 varying fastest, so the id of a cell is a
//! pure function of its coordinates and identical on every rank.

use serde::{Deserialize, Serialize};

use crate::decomp_error::DecompError;
use crate::geometry::array_serde;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CartGrid<const D: usize> {
    #[serde(with = "array_serde")]
    divisions: [usize; D],
}

impl<const D: usize> CartGrid<D> {
    pub fn new(divisions: [usize; D]) -> Result<Self, DecompError> {
        if D == 0 {
            return Err(DecompError::InvalidConfig("zero-dimensional grid".into()));
        }
        if let Some(k) = divisions.iter().position(|&n| n == 0) {
            return Err(DecompError::InvalidConfig(format!(
                "grid axis {k} has zero divisions"
            )));
        }
        Ok(Self { divisions })
    }

    #[inline]
    pub fn divisions(&self) -> [usize; D] {
        self.divisions
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.divisions.iter().product()
    }

    #[inline]
    pub fn lin_id(&self, coords: &[usize; D]) -> usize {
        let mut id = 0;
        let mut stride = 1;
        for k in 0..D {
            debug_assert!(coords[k] < self.divisions[k]);
            id += coords[k] * stride;
            stride *= self.divisions[k];
        }
        id
    }

    #[inline]
    pub fn coords(&self, mut id: usize) -> [usize; D] {
        let mut c = [0usize; D];
        for k in 0..D {
            c[k] = id % self.divisions[k];
            id /= self.divisions[k];
        }
        c
    }

    /// Wrap signed coordinates into the grid.
    ///
    /// Returns the wrapped coordinates and, per axis, how many times the grid
    /// length was crossed (`-1`, `0`, `+1`, ...). Callers decide whether a
    /// non-zero crossing is allowed (periodic axis) or not.
    pub fn wrap(&self, coords: &[i64; D]) -> ([usize; D], [i64; D]) {
        let mut c = [0usize; D];
        let mut w = [0i64; D];
        for k in 0..D {
            let n = self.divisions[k] as i64;
            w[k] = coords[k].div_euclid(n);
            c[k] = coords[k].rem_euclid(n) as usize;
        }
        (c, w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lin_id_axis_zero_fastest() {
        let g = CartGrid::new([4, 3, 2]).unwrap();
        assert_eq!(g.size(), 24);
        assert_eq!(g.lin_id(&[1, 0, 0]), 1);
        assert_eq!(g.lin_id(&[0, 1, 0]), 4);
        assert_eq!(g.lin_id(&[0, 0, 1]), 12);
        for id in 0..g.size() {
            assert_eq!(g.lin_id(&g.coords(id)), id);
        }
    }

    #[test]
    fn wrap_counts_crossings() {
        let g = CartGrid::new([4, 4]).unwrap();
        let (c, w) = g.wrap(&[-1, 5]);
        assert_eq!(c, [3, 1]);
        assert_eq!(w, [-1, 1]);
    }

    #[test]
    fn zero_division_rejected() {
        assert!(CartGrid::new([3, 0]).is_err());
    }
}
