//! Diagnostic export of a decomposition.
//!
//! [`SubDomainRecord`] is the per-sub-domain snapshot (id, owner, cost,
//! bounds). It serializes with serde and is what the VTK writer consumes.

pub mod vtk;

pub use vtk::{VtkReader, VtkWriter};

use serde::{Deserialize, Serialize};

use crate::geometry::Aabb;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubDomainRecord<const D: usize> {
    pub id: usize,
    pub owner: usize,
    pub computation: f64,
    pub bounds: Aabb<D>,
}
