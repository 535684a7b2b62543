//! Partitioning errors for cart-decomp

use thiserror::Error;

/// Errors from the partitioning strategies and their solver boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PartitionError {
    /// A weight or index does not fit the solver's integer type.
    #[error("value {0} does not fit the solver index type")]
    IndexOverflow(String),
    /// The CSR arrays handed to the solver are inconsistent.
    #[error("malformed CSR graph: {0}")]
    MalformedCsr(String),
    /// A gathered shard did not decode.
    #[error("corrupt graph shard from rank {0}")]
    CorruptShard(usize),
    /// Refinement was asked to start from an assignment of the wrong size.
    #[error("previous assignment covers {got} sub-domains, graph has {expected}")]
    PreviousMismatch { expected: usize, got: usize },
}
