//! Element storage the ghost exchange reads from and appends to.

use bytemuck::Pod;

use crate::geometry::Point;

/// Container of located elements with one `Pod` property each.
///
/// Owned elements come first (`0..n_local()`); ghosts received by
/// `ghost_get` are kept separately and replaced on every exchange.
pub trait GhostStorage<const D: usize> {
    type Value: Pod + Send + Sync;

    fn n_local(&self) -> usize;
    fn position(&self, i: usize) -> &Point<D>;
    fn value(&self, i: usize) -> &Self::Value;
    fn value_mut(&mut self, i: usize) -> &mut Self::Value;

    fn n_ghost(&self) -> usize;
    fn ghost_position(&self, i: usize) -> &Point<D>;
    fn ghost_value(&self, i: usize) -> &Self::Value;
    fn ghost_value_mut(&mut self, i: usize) -> &mut Self::Value;
    fn clear_ghosts(&mut self);
    fn push_ghost(&mut self, position: Point<D>, value: Self::Value);
}

/// Plain particle container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticleSet<const D: usize, V> {
    pub positions: Vec<Point<D>>,
    pub values: Vec<V>,
    pub ghost_positions: Vec<Point<D>>,
    pub ghost_values: Vec<V>,
}

impl<const D: usize, V> ParticleSet<D, V> {
    pub fn new() -> Self {
        Self {
            positions: Vec::new(),
            values: Vec::new(),
            ghost_positions: Vec::new(),
            ghost_values: Vec::new(),
        }
    }

    pub fn push(&mut self, position: Point<D>, value: V) {
        self.positions.push(position);
        self.values.push(value);
    }

    /// Keep only the owned elements for which `keep` holds.
    pub fn retain(&mut self, mut keep: impl FnMut(&Point<D>) -> bool) {
        let mut i = 0;
        while i < self.positions.len() {
            if keep(&self.positions[i]) {
                i += 1;
            } else {
                self.positions.swap_remove(i);
                self.values.swap_remove(i);
            }
        }
    }
}

impl<const D: usize, V: Pod + Send + Sync> GhostStorage<D> for ParticleSet<D, V> {
    type Value = V;

    fn n_local(&self) -> usize {
        self.positions.len()
    }
    fn position(&self, i: usize) -> &Point<D> {
        &self.positions[i]
    }
    fn value(&self, i: usize) -> &V {
        &self.values[i]
    }
    fn value_mut(&mut self, i: usize) -> &mut V {
        &mut self.values[i]
    }
    fn n_ghost(&self) -> usize {
        self.ghost_positions.len()
    }
    fn ghost_position(&self, i: usize) -> &Point<D> {
        &self.ghost_positions[i]
    }
    fn ghost_value(&self, i: usize) -> &V {
        &self.ghost_values[i]
    }
    fn ghost_value_mut(&mut self, i: usize) -> &mut V {
        &mut self.ghost_values[i]
    }
    fn clear_ghosts(&mut self) {
        self.ghost_positions.clear();
        self.ghost_values.clear();
    }
    fn push_ghost(&mut self, position: Point<D>, value: V) {
        self.ghost_positions.push(position);
        self.ghost_values.push(value);
    }
}
