#![cfg_attr(docsrs, feature(doc_cfg))]
//! # cart-decomp
//!
//! cart-decomp partitions a Cartesian simulation domain across cooperating
//! processes, keeps the partition load-balanced as costs drift, and tracks
//! the ghost regions each process must exchange with its neighbors.
//!
//! ## Features
//! - Cost graph over a coarse Cartesian tessellation, with periodic wrap
//! - Graph partitioning through METIS, either with every rank holding the
//!   whole graph or with each rank contributing its own shard
//! - Hilbert and Morton space-filling-curve partitioning
//! - Incremental rebalancing that trades edge cut against data migration
//! - Ghost boxes per neighbor rank, including periodic images, and the
//!   `ghost_get` / `ghost_put` exchange driven by them
//! - Pluggable communication backends (in-process ranks, MPI)
//! - Legacy VTK export for visual inspection
//!
//! ## Determinism
//!
//! Solver seeds come from the configuration, so every rank computes the
//! same partition. [`DecompositionConfig::on_test`](decomposition::DecompositionConfig::on_test)
//! pins the seed for reproducible runs. Ghost box lists are ordered by
//! `(rank, sub-domain, periodic shift)` and are bit-identical across rebuilds.
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! cart-decomp = "0.3"
//! # features = ["mpi-support"]
//! ```
//!
//! ```
//! use cart_decomp::prelude::*;
//!
//! let cfg = DecompositionConfig::new(Aabb::new([0.0; 3], [1.0; 3]), [4, 4, 4])
//!     .with_ghost_width([0.1; 3])
//!     .on_test();
//! let mut dec = CartDecomposition::new(cfg, NoComm).unwrap();
//! dec.distribute().unwrap();
//! dec.build_ghosts().unwrap();
//! assert!(dec.unbalance().unwrap() < 0.05);
//! ```

pub mod algs;
pub mod decomp_error;
pub mod decomposition;
pub mod geometry;
pub mod ghost;
pub mod graph;
pub mod io;
pub mod partitioning;

pub use decomp_error::DecompError;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::communicator::{Communicator, LocalComm, NoComm};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::decomp_error::DecompError;
    pub use crate::decomposition::{ActiveDecomposition, CartDecomposition, DecompositionConfig};
    pub use crate::geometry::{Aabb, Boundary, Point};
    pub use crate::ghost::{
        AddDelta, CopyDelta, Delta, GhostBox, GhostDirection, GhostLayout, GhostStorage,
        ParticleSet,
    };
    pub use crate::graph::{CostGraph, CostModel, SphereCost, UniformCost};
    pub use crate::partitioning::{Assignment, Partitioner, StrategyKind};
}
