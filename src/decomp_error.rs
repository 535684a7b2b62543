//! DecompError: Unified error type for cart-decomp public APIs
//!
//! Every fallible operation in the crate reports through this type. An
//! operation that returns an error has not installed any partial state: the
//! previous assignment and ghost layout stay in effect.

use thiserror::Error;

use crate::partitioning::error::PartitionError;

/// Unified error type for decomposition, rebalancing and ghost operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecompError {
    /// A cost or query referenced a sub-domain id outside the graph.
    #[error("sub-domain {id} does not exist (graph has {len} sub-domains)")]
    UnknownSubDomain { id: usize, len: usize },
    /// `neighbor` is not a valid neighbor slot of sub-domain `id`.
    #[error("sub-domain {id} has {count} neighbors, index {neighbor} is out of range")]
    NeighborIndexOutOfRange {
        id: usize,
        neighbor: usize,
        count: usize,
    },
    /// Costs must be finite and non-negative.
    #[error("invalid cost {value} for sub-domain {id}")]
    InvalidCost { id: usize, value: f64 },
    /// The configured partition count does not match the participating processes.
    #[error("partition count {parts} does not match process count {processes}")]
    PartCountMismatch { parts: usize, processes: usize },
    /// A partition came back without any sub-domain.
    #[error("partition {0} received no sub-domains")]
    EmptyPartition(usize),
    /// A rank owns no vertex in the distributed vertex table.
    #[error("rank {0} has an empty local vertex range")]
    EmptyLocalRange(usize),
    /// Graph cannot be meaningfully partitioned.
    #[error("degenerate graph: {0}")]
    DegenerateGraph(String),
    /// External solver reported failure.
    #[error("partitioner failed: {0}")]
    SolverFailure(String),
    /// The operation needs an installed decomposition and none exists yet.
    #[error("no decomposition has been installed; call distribute() first")]
    NotDecomposed,
    /// A ghost plan or layout was built for an older decomposition.
    #[error("stale decomposition: built for version {built}, current is {current}")]
    StaleDecomposition { built: u64, current: u64 },
    /// Ghost exchange requested before the ghost layout was computed.
    #[error("ghost boxes have not been built for decomposition version {0}")]
    GhostNotBuilt(u64),
    /// `ghost_put` has no `ghost_get` of the current layout to return values along.
    #[error("no ghost_get has run on the ghost layout of decomposition version {0}")]
    NoGhostExchange(u64),
    /// A ghost message, or the local element set, no longer matches the plan.
    #[error("ghost exchange with rank {rank} does not match the plan: {reason}")]
    GhostPlanMismatch { rank: usize, reason: String },
    /// Rejected configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Point-to-point or collective communication failed.
    #[error("communication with rank {neighbor} failed: {message}")]
    CommError { neighbor: usize, message: String },
    /// Diagnostic output could not be written.
    #[error("I/O error: {0}")]
    Io(String),
    /// Error raised inside a partitioning strategy.
    #[error(transparent)]
    Partition(#[from] PartitionError),
}

impl From<std::io::Error> for DecompError {
    fn from(e: std::io::Error) -> Self {
        DecompError::Io(e.to_string())
    }
}
