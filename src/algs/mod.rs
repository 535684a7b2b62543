//! Message passing and the collectives built on it.

pub mod collective;
pub mod communicator;
pub mod wire;

pub use collective::{all_gather_bytes, all_reduce_max, all_reduce_sum, sparse_exchange};
pub use communicator::{CommTag, Communicator, LocalComm, NoComm, Wait};
#[cfg(feature = "mpi-support")]
pub use communicator::MpiComm;
